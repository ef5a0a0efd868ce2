//! Conversation routing state machine.
//!
//! Drives one user turn through the reasoning backend and any tools it
//! requests:
//!
//! ```text
//! AwaitingReasoning ──(no tool calls)──▶ Done → FinalReply
//!        ▲    │
//!        │    └─(tool calls)──▶ ExecutingTools ──┐
//!        └───────────────────────────────────────┘
//! ```
//!
//! # Safety Guards
//!
//! - **Round limit**: at most `max_tool_rounds` backend calls per user turn
//! - **Truncation**: every turn sent to the backend is cut to `max_turn_chars`
//! - **History cap**: optional, evicts whole exchanges from the front

use std::sync::Arc;

use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::RouterConfig;
use crate::llm::ReasoningBackend;
use crate::llm::types::{ConversationHistory, ReasoningResponse, Turn};
use crate::pipeline::messages::Transcript;
use crate::tools::invoker::{ToolInvoker, UNKNOWN_TOOL};
use crate::tools::types::{ToolDefinition, ToolResult};

/// Reason reported when the round limit is hit.
pub const TOOL_LIMIT_EXCEEDED: &str = "tool-call limit exceeded";

/// Router state within one user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingState {
    /// Waiting for the backend to answer.
    AwaitingReasoning,
    /// Running requested tools.
    ExecutingTools,
    /// The turn finished (reply or abort).
    Done,
}

/// Result of routing one user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingOutcome {
    /// Text to speak.
    FinalReply(String),
    /// Nothing to speak; the reason is logged.
    Aborted(String),
}

/// Owns the conversation history and routes user turns.
pub struct ConversationRouter {
    backend: Arc<dyn ReasoningBackend>,
    invoker: Option<ToolInvoker>,
    history: ConversationHistory,
    config: RouterConfig,
    state: RoutingState,
    /// History length at the start of a turn that has not finished yet.
    open_turn: Option<usize>,
}

impl ConversationRouter {
    /// Create a router. Pass `None` for `invoker` to run without tools.
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        invoker: Option<ToolInvoker>,
        config: RouterConfig,
    ) -> Self {
        Self {
            backend,
            invoker,
            history: ConversationHistory::with_cap(config.max_history_turns),
            config,
            state: RoutingState::Done,
            open_turn: None,
        }
    }

    /// Conversation so far.
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Current state.
    pub fn state(&self) -> RoutingState {
        self.state
    }

    /// Drop whatever an interrupted turn left in history.
    ///
    /// A turn is interrupted when its future is dropped or unwinds before it
    /// finishes. Returns whether anything was rolled back.
    pub fn discard_open_turn(&mut self) -> bool {
        let Some(entry_len) = self.open_turn.take() else {
            return false;
        };
        let dropped = self.history.len().saturating_sub(entry_len);
        self.history.rollback(entry_len);
        self.state = RoutingState::Done;
        warn!(dropped, "discarded interrupted turn");
        true
    }

    fn tools_offered(&self) -> Vec<ToolDefinition> {
        match &self.invoker {
            Some(invoker) if self.config.tools_enabled => invoker.definitions(),
            _ => Vec::new(),
        }
    }

    /// History as sent to the backend, every turn truncated.
    fn outgoing_view(&self) -> Vec<Turn> {
        let max_chars = self.config.max_turn_chars;
        self.history
            .turns()
            .iter()
            .map(|turn| turn.truncated(max_chars))
            .collect()
    }

    /// Route one finalized transcript to a reply.
    ///
    /// On [`RoutingOutcome::FinalReply`] the history has grown by the user
    /// turn, any tool exchanges, and the assistant reply. On
    /// [`RoutingOutcome::Aborted`] the history is left as it was before the
    /// call. A previous turn that never finished is discarded first.
    pub async fn route(&mut self, transcript: &Transcript) -> RoutingOutcome {
        self.discard_open_turn();
        let entry_len = self.history.len();
        self.open_turn = Some(entry_len);
        self.history.push(Turn::user(transcript.text.trim()));
        let tools = self.tools_offered();
        let max_rounds = self.config.max_tool_rounds.max(1);

        for round in 1..=max_rounds {
            self.state = RoutingState::AwaitingReasoning;
            let span = info_span!("routing_round", round, backend = self.backend.name());
            let view = self.outgoing_view();

            let response = match self.backend.respond(&view, &tools).instrument(span.clone()).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(parent: &span, error = %e, "reasoning backend failed");
                    return self.abort(entry_len, e.to_string());
                }
            };

            if response.is_final() {
                return self.finish(entry_len, response);
            }

            self.state = RoutingState::ExecutingTools;
            self.execute_tools(response).instrument(span).await;
        }

        warn!(max_rounds, "tool round limit reached");
        self.abort(entry_len, TOOL_LIMIT_EXCEEDED.to_string())
    }

    async fn execute_tools(&mut self, response: ReasoningResponse) {
        let ReasoningResponse {
            reply_text,
            pending_tool_calls,
        } = response;
        debug!(calls = pending_tool_calls.len(), "executing tool calls");
        self.history
            .push(Turn::tool_request(reply_text, pending_tool_calls.clone()));

        for call in &pending_tool_calls {
            let result = match &self.invoker {
                Some(invoker) if self.config.tools_enabled => invoker.invoke(call).await,
                _ => ToolResult::failure(call, UNKNOWN_TOOL),
            };
            self.history.push(Turn::tool_result(result));
        }
    }

    fn finish(&mut self, entry_len: usize, response: ReasoningResponse) -> RoutingOutcome {
        let reply = response.reply_text.trim().to_owned();
        self.history.push(Turn::assistant(reply.clone()));
        self.open_turn = None;
        let evicted = self.history.enforce_cap(entry_len);
        if evicted > 0 {
            debug!(evicted, "history cap enforced");
        }
        self.state = RoutingState::Done;
        info!(reply_chars = reply.chars().count(), "final reply");
        RoutingOutcome::FinalReply(reply)
    }

    fn abort(&mut self, entry_len: usize, reason: String) -> RoutingOutcome {
        self.history.rollback(entry_len);
        self.open_turn = None;
        self.state = RoutingState::Done;
        RoutingOutcome::Aborted(reason)
    }
}
