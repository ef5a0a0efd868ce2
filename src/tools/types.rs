//! Core tool types.
//!
//! Defines the [`Tool`] trait that all tools implement, the [`ToolCall`]
//! requested by the reasoning backend and the [`ToolResult`] fed back to it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Default maximum tool output size (8 KB).
pub const DEFAULT_MAX_BYTES: usize = 8 * 1024;

/// A tool invocation requested by the reasoning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Backend-assigned identifier pairing the call with its result.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Tool arguments.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Create a tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Output of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    /// Plain text.
    Text(String),
    /// Structured JSON.
    Structured(Value),
}

impl ToolOutput {
    /// Render the output as text for the backend.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

/// Result of executing one [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Identifier of the originating call.
    pub call_id: String,
    /// Tool name as requested.
    pub name: String,
    /// Output, or a failure description when `failed` is set.
    pub output: ToolOutput,
    /// Whether the tool failed.
    pub failed: bool,
}

impl ToolResult {
    /// A successful result for `call`.
    pub fn success(call: &ToolCall, output: ToolOutput) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            output,
            failed: false,
        }
    }

    /// A failed result for `call`.
    pub fn failure(call: &ToolCall, reason: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            output: ToolOutput::Text(reason.into()),
            failed: true,
        }
    }
}

/// Tool description offered to the reasoning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON Schema of the arguments.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Truncate a string to at most `max_bytes`, respecting UTF-8 boundaries.
///
/// Returns `(truncated_string, was_truncated)`.
pub fn truncate_output(s: &str, max_bytes: usize) -> (String, bool) {
    if s.len() <= max_bytes {
        return (s.to_string(), false);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    (
        format!("{}\n\n[output truncated at {max_bytes} bytes]", &s[..end]),
        true,
    )
}

/// A capability the reasoning backend can invoke.
///
/// Tools run on the blocking thread pool, so `execute` may do blocking I/O.
pub trait Tool: Send + Sync {
    /// Returns the tool name (e.g. "web_search").
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// Returns the JSON Schema for the tool's arguments.
    fn schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::ToolExecution`](crate::SpeechError::ToolExecution)
    /// for invalid arguments or failed execution.
    fn execute(&self, args: Map<String, Value>) -> Result<ToolOutput>;

    /// Definition offered to the reasoning backend.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> ToolCall {
        ToolCall::new("toolu_1", "web_search", Map::new())
    }

    #[test]
    fn failure_carries_call_identity() {
        let result = ToolResult::failure(&call(), "unknown tool");
        assert!(result.failed);
        assert_eq!(result.call_id, "toolu_1");
        assert_eq!(result.name, "web_search");
        assert_eq!(result.output, ToolOutput::Text("unknown tool".into()));
    }

    #[test]
    fn structured_output_renders_as_json() {
        let output = ToolOutput::Structured(serde_json::json!({"temp_c": 21}));
        assert_eq!(output.to_text(), r#"{"temp_c":21}"#);
    }

    #[test]
    fn truncate_output_short_string() {
        let (output, truncated) = truncate_output("hello", 100);
        assert_eq!(output, "hello");
        assert!(!truncated);
    }

    #[test]
    fn truncate_output_respects_char_boundary() {
        let (output, truncated) = truncate_output("héllo", 2);
        assert!(truncated);
        assert!(output.starts_with('h'));
        assert!(!output.starts_with("hé"));
    }
}
