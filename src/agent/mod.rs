//! Conversation routing between the reasoning backend and tools.

pub mod router;

pub use router::{ConversationRouter, RoutingOutcome, RoutingState, TOOL_LIMIT_EXCEEDED};
