//! Reasoning backends.
//!
//! A [`ReasoningBackend`] receives the conversation so far plus the tools
//! it may call, and answers with either a final reply or tool requests.

pub mod anthropic;
pub mod sse;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use crate::tools::types::ToolDefinition;

pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use types::{ConversationHistory, ReasoningResponse, Role, Turn, TurnContent};

/// A conversational reasoning service.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Answer the conversation.
    ///
    /// `tools` is empty when tool routing is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::ReasoningBackend`](crate::SpeechError::ReasoningBackend)
    /// on network, auth, rate-limit or protocol failures.
    async fn respond(&self, turns: &[Turn], tools: &[ToolDefinition]) -> Result<ReasoningResponse>;
}
