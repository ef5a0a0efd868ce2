//! Conversation types shared by the router and reasoning backends.

use serde::{Deserialize, Serialize};

use crate::tools::types::{ToolCall, ToolOutput, ToolResult};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person speaking.
    User,
    /// The reasoning backend.
    Assistant,
    /// A tool result.
    Tool,
}

/// Payload of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Assistant text accompanied by tool requests.
    ToolRequest {
        /// Text emitted alongside the requests, possibly empty.
        text: String,
        /// Requested calls, in order.
        calls: Vec<ToolCall>,
    },
    /// Result of one tool call.
    ToolResult {
        /// The result.
        result: ToolResult,
    },
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Producer of the turn.
    pub role: Role,
    /// Payload.
    pub content: TurnContent,
}

impl Turn {
    /// A user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Text { text: text.into() },
        }
    }

    /// A final assistant reply.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Text { text: text.into() },
        }
    }

    /// An assistant turn requesting tools.
    pub fn tool_request(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::ToolRequest {
                text: text.into(),
                calls,
            },
        }
    }

    /// A tool result turn.
    pub fn tool_result(result: ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: TurnContent::ToolResult { result },
        }
    }

    /// Text carried by the turn.
    pub fn text(&self) -> String {
        match &self.content {
            TurnContent::Text { text } | TurnContent::ToolRequest { text, .. } => text.clone(),
            TurnContent::ToolResult { result } => result.output.to_text(),
        }
    }

    /// Copy of the turn with its text cut to at most `max_chars` characters.
    ///
    /// Tool call arguments are left intact; structured tool output is only
    /// flattened to text when it actually needs cutting.
    pub fn truncated(&self, max_chars: usize) -> Self {
        let content = match &self.content {
            TurnContent::Text { text } => TurnContent::Text {
                text: truncate_chars(text, max_chars),
            },
            TurnContent::ToolRequest { text, calls } => TurnContent::ToolRequest {
                text: truncate_chars(text, max_chars),
                calls: calls.clone(),
            },
            TurnContent::ToolResult { result } => {
                let rendered = result.output.to_text();
                let output = if rendered.chars().count() > max_chars {
                    ToolOutput::Text(truncate_chars(&rendered, max_chars))
                } else {
                    result.output.clone()
                };
                TurnContent::ToolResult {
                    result: ToolResult {
                        output,
                        ..result.clone()
                    },
                }
            }
        };
        Self {
            role: self.role,
            content,
        }
    }
}

/// Cut `text` to its first `max_chars` Unicode scalar values.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_owned(),
        None => text.to_owned(),
    }
}

/// What the backend answered for one request.
///
/// When `pending_tool_calls` is non-empty, `reply_text` is not the final answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningResponse {
    /// Assistant text.
    pub reply_text: String,
    /// Tool calls to execute before asking again.
    pub pending_tool_calls: Vec<ToolCall>,
}

impl ReasoningResponse {
    /// A final reply.
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply_text: text.into(),
            pending_tool_calls: Vec::new(),
        }
    }

    /// A request to run tools.
    pub fn tool_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            reply_text: text.into(),
            pending_tool_calls: calls,
        }
    }

    /// Whether this is the final answer.
    pub fn is_final(&self) -> bool {
        self.pending_tool_calls.is_empty()
    }
}

/// Ordered conversation history with an optional turn cap.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    max_turns: Option<usize>,
}

impl ConversationHistory {
    /// Unbounded history.
    pub fn new() -> Self {
        Self::default()
    }

    /// History that keeps at most `max_turns` turns once an exchange completes.
    pub fn with_cap(max_turns: Option<usize>) -> Self {
        Self {
            turns: Vec::new(),
            max_turns,
        }
    }

    /// Append a turn.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop every turn after the first `len`.
    pub fn rollback(&mut self, len: usize) {
        self.turns.truncate(len);
    }

    /// Evict whole exchanges from the front until the cap is met.
    ///
    /// An exchange is a user turn plus every assistant and tool turn that
    /// follows it, so a tool request is never separated from its results.
    /// Turns at or after `protect_from` are never evicted. Returns the
    /// number of evicted turns.
    pub fn enforce_cap(&mut self, protect_from: usize) -> usize {
        let Some(cap) = self.max_turns else {
            return 0;
        };
        let protect_from = protect_from.min(self.turns.len());
        let mut evicted = 0;

        while self.turns.len() > cap && evicted < protect_from {
            let limit = protect_from - evicted;
            let mut end = 1;
            while end < limit && self.turns[end].role != Role::User {
                end += 1;
            }
            self.turns.drain(..end);
            evicted += end;
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn tool_result(text: &str) -> ToolResult {
        ToolResult {
            call_id: "c1".into(),
            name: "web_search".into(),
            output: ToolOutput::Text(text.into()),
            failed: false,
        }
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exact", 5), "exact");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn truncated_applies_to_every_role() {
        let user = Turn::user("abcdefgh").truncated(3);
        assert_eq!(user.text(), "abc");

        let call = ToolCall::new("c1", "web_search", Map::new());
        let request = Turn::tool_request("abcdefgh", vec![call.clone()]).truncated(3);
        assert_eq!(request.text(), "abc");
        assert!(matches!(request.content, TurnContent::ToolRequest { ref calls, .. } if calls == &vec![call]));

        let tool = Turn::tool_result(tool_result("abcdefgh")).truncated(3);
        assert_eq!(tool.text(), "abc");
        assert_eq!(tool.role, Role::Tool);
    }

    #[test]
    fn short_structured_output_is_kept() {
        let result = ToolResult {
            output: ToolOutput::Structured(serde_json::json!({"a": 1})),
            ..tool_result("")
        };
        let turn = Turn::tool_result(result.clone()).truncated(100);
        assert_eq!(turn, Turn::tool_result(result));
    }

    #[test]
    fn uncapped_history_never_evicts() {
        let mut history = ConversationHistory::new();
        for i in 0..50 {
            history.push(Turn::user(format!("q{i}")));
            history.push(Turn::assistant(format!("a{i}")));
        }
        assert_eq!(history.enforce_cap(100), 0);
        assert_eq!(history.len(), 100);
    }

    #[test]
    fn cap_evicts_whole_exchanges() {
        let mut history = ConversationHistory::with_cap(Some(3));
        history.push(Turn::user("q1"));
        history.push(Turn::tool_request("", vec![ToolCall::new("c1", "t", Map::new())]));
        history.push(Turn::tool_result(tool_result("r1")));
        history.push(Turn::assistant("a1"));
        history.push(Turn::user("q2"));
        history.push(Turn::assistant("a2"));

        let evicted = history.enforce_cap(4);
        assert_eq!(evicted, 4);
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0], Turn::user("q2"));
    }

    #[test]
    fn cap_never_evicts_protected_exchange() {
        let mut history = ConversationHistory::with_cap(Some(1));
        history.push(Turn::user("q1"));
        history.push(Turn::assistant("a1"));
        history.push(Turn::user("q2"));
        history.push(Turn::assistant("a2"));

        history.enforce_cap(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0], Turn::user("q2"));
    }

    #[test]
    fn rollback_restores_length() {
        let mut history = ConversationHistory::new();
        history.push(Turn::user("q1"));
        history.push(Turn::assistant("a1"));
        history.push(Turn::user("q2"));
        history.rollback(2);
        assert_eq!(history.len(), 2);
    }
}
