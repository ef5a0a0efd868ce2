//! Tool invocation with timeout and panic isolation.
//!
//! [`ToolInvoker::invoke`] never returns an error: unknown names, tool
//! errors, panics and timeouts all become a failed [`ToolResult`] so the
//! reasoning backend can see what went wrong. Nothing is retried here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::registry::ToolRegistry;
use super::types::{ToolCall, ToolDefinition, ToolResult};

/// Failure text for calls to unregistered tools.
pub const UNKNOWN_TOOL: &str = "unknown tool";

/// Executes tool calls against an immutable registry.
#[derive(Clone)]
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolInvoker {
    /// Create an invoker with a per-tool execution timeout.
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Definitions of all registered tools.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Execute one tool call.
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.registry.get(&call.name) else {
            warn!(tool_name = %call.name, "tool not found in registry");
            return ToolResult::failure(call, UNKNOWN_TOOL);
        };

        debug!(tool_name = %call.name, call_id = %call.id, "executing tool");
        let start = Instant::now();
        let args = call.arguments.clone();

        let outcome =
            tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(move || tool.execute(args)))
                .await;

        let result = match outcome {
            Ok(Ok(Ok(output))) => ToolResult::success(call, output),
            Ok(Ok(Err(e))) => {
                warn!(tool_name = %call.name, error = %e, "tool execution failed");
                ToolResult::failure(call, e.to_string())
            }
            Ok(Err(join_err)) => {
                error!(tool_name = %call.name, error = %join_err, "tool execution panicked");
                ToolResult::failure(call, format!("tool '{}': execution panicked", call.name))
            }
            Err(_elapsed) => {
                error!(
                    tool_name = %call.name,
                    timeout_secs = self.timeout.as_secs(),
                    "tool execution timed out"
                );
                ToolResult::failure(
                    call,
                    format!(
                        "tool '{}': execution timed out after {}s",
                        call.name,
                        self.timeout.as_secs()
                    ),
                )
            }
        };

        info!(
            tool_name = %call.name,
            failed = result.failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "tool call finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::error::{Result, SpeechError};
    use crate::tools::types::{Tool, ToolOutput};
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoTool {
        calls: AtomicUsize,
    }

    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the text argument"
        }
        fn schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        fn execute(&self, args: Map<String, Value>) -> Result<ToolOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match args.get("text").and_then(Value::as_str) {
                Some(text) => Ok(ToolOutput::from(text)),
                None => Err(SpeechError::ToolExecution("missing text".into())),
            }
        }
    }

    struct PanickingTool;

    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "explode"
        }
        fn description(&self) -> &str {
            "Always panics"
        }
        fn schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        fn execute(&self, _args: Map<String, Value>) -> Result<ToolOutput> {
            panic!("tool blew up");
        }
    }

    struct SlowTool;

    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps past the timeout"
        }
        fn schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        fn execute(&self, _args: Map<String, Value>) -> Result<ToolOutput> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(ToolOutput::from("late"))
        }
    }

    fn invoker_with(tools: Vec<Arc<dyn Tool>>, timeout: Duration) -> ToolInvoker {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        ToolInvoker::new(Arc::new(registry), timeout)
    }

    fn args(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[tokio::test]
    async fn successful_call_returns_output() {
        let echo = Arc::new(EchoTool {
            calls: AtomicUsize::new(0),
        });
        let invoker = invoker_with(vec![echo.clone() as Arc<dyn Tool>], Duration::from_secs(5));
        let call = ToolCall::new("c1", "echo", args(&[("text", "hi")]));

        let result = invoker.invoke(&call).await;
        assert!(!result.failed);
        assert_eq!(result.output, ToolOutput::Text("hi".into()));
        assert_eq!(result.call_id, "c1");
        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_idempotent_failure() {
        let invoker = invoker_with(vec![], Duration::from_secs(5));
        let first = invoker
            .invoke(&ToolCall::new("c1", "teleport", args(&[("to", "mars")])))
            .await;
        let second = invoker
            .invoke(&ToolCall::new("c1", "teleport", args(&[("to", "venus"), ("x", "y")])))
            .await;

        assert!(first.failed);
        assert_eq!(first.output, ToolOutput::Text(UNKNOWN_TOOL.into()));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn tool_error_becomes_failed_result() {
        let echo = Arc::new(EchoTool {
            calls: AtomicUsize::new(0),
        });
        let invoker = invoker_with(vec![echo.clone() as Arc<dyn Tool>], Duration::from_secs(5));
        let result = invoker.invoke(&ToolCall::new("c2", "echo", Map::new())).await;

        assert!(result.failed);
        assert!(result.output.to_text().contains("missing text"));
        // No retry.
        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panic_becomes_failed_result() {
        let invoker = invoker_with(vec![Arc::new(PanickingTool) as Arc<dyn Tool>], Duration::from_secs(5));
        let result = invoker.invoke(&ToolCall::new("c3", "explode", Map::new())).await;
        assert!(result.failed);
        assert!(result.output.to_text().contains("panicked"));
    }

    #[tokio::test]
    async fn timeout_becomes_failed_result() {
        let invoker = invoker_with(vec![Arc::new(SlowTool) as Arc<dyn Tool>], Duration::from_millis(50));
        let result = invoker.invoke(&ToolCall::new("c4", "slow", Map::new())).await;
        assert!(result.failed);
        assert!(result.output.to_text().contains("timed out"));
    }
}
