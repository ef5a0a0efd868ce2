//! Tool registry.
//!
//! Built once at startup and shared read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{Tool, ToolDefinition};

/// Registry of available tools, looked up by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Names of all registered tools, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Definitions of all registered tools, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::tools::types::ToolOutput;
    use serde_json::{Map, Value};

    struct NamedTool(&'static str);

    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        fn execute(&self, _args: Map<String, Value>) -> Result<ToolOutput> {
            Ok(ToolOutput::from(self.0))
        }
    }

    #[test]
    fn lookup_by_name() {
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(NamedTool("web_search")))
            .with_tool(Arc::new(NamedTool("current_time")));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("web_search").is_some());
        assert!(registry.get("WEB_SEARCH").is_none());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn definitions_are_sorted() {
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(NamedTool("web_search")))
            .with_tool(Arc::new(NamedTool("current_time")));

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["current_time", "web_search"]);
        assert_eq!(registry.names(), vec!["current_time", "web_search"]);
    }

    #[test]
    fn re_registering_replaces() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NamedTool("clock")));
        registry.register(Arc::new(NamedTool("clock")));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }
}
