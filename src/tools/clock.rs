//! Local date and time tool.

use serde_json::{Map, Value};

use super::types::{Tool, ToolOutput};
use crate::error::{Result, SpeechError};

const DEFAULT_FORMAT: &str = "%A, %B %-d %Y, %H:%M %Z";

/// Reports the current local date and time.
#[derive(Debug, Default)]
pub struct CurrentTimeTool;

impl CurrentTimeTool {
    /// Create the tool.
    pub fn new() -> Self {
        Self
    }
}

fn render(now: chrono::DateTime<chrono::Local>, format: &str) -> Result<String> {
    use std::fmt::Write;

    let mut out = String::new();
    write!(out, "{}", now.format(format))
        .map_err(|_| SpeechError::ToolExecution(format!("current_time: invalid format '{format}'")))?;
    Ok(out)
}

impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current local date and time."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "description": "Optional strftime format string"
                }
            }
        })
    }

    fn execute(&self, args: Map<String, Value>) -> Result<ToolOutput> {
        let format = args
            .get("format")
            .and_then(Value::as_str)
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(DEFAULT_FORMAT);
        let now = chrono::Local::now();
        Ok(ToolOutput::Structured(serde_json::json!({
            "local": render(now, format)?,
            "iso8601": now.to_rfc3339(),
        })))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_custom_format() {
        let now = chrono::Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(render(now, "%Y-%m-%d %H:%M").unwrap(), "2024-03-09 14:05");
    }

    #[test]
    fn invalid_format_is_an_error() {
        let now = chrono::Local::now();
        assert!(render(now, "%Q").is_err());
    }

    #[test]
    fn execute_returns_structured_time() {
        let output = CurrentTimeTool::new().execute(Map::new()).unwrap();
        match output {
            ToolOutput::Structured(value) => {
                assert!(value["local"].is_string());
                assert!(value["iso8601"].as_str().unwrap().contains('T'));
            }
            ToolOutput::Text(text) => panic!("expected structured output, got {text}"),
        }
    }
}
