//! Tools the reasoning backend can call.

pub mod clock;
pub mod invoker;
pub mod registry;
pub mod types;
pub mod web_search;

use std::sync::Arc;

pub use clock::CurrentTimeTool;
pub use invoker::ToolInvoker;
pub use registry::ToolRegistry;
pub use types::{Tool, ToolCall, ToolDefinition, ToolOutput, ToolResult};
pub use web_search::WebSearchTool;

/// Registry with the built-in tools.
pub fn builtin_registry() -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(Arc::new(WebSearchTool::new()))
        .with_tool(Arc::new(CurrentTimeTool::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = builtin_registry();
        assert_eq!(registry.names(), vec!["current_time", "web_search"]);
    }
}
