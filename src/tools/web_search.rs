//! Web search tool backed by the DuckDuckGo Instant Answer API.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::types::{DEFAULT_MAX_BYTES, Tool, ToolOutput, truncate_output};
use crate::error::{Result, SpeechError};

/// Default Instant Answer endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.duckduckgo.com/";

/// Tool that looks a query up on the web.
///
/// # Arguments (JSON)
///
/// - `query` (string, required): the search query
/// - `max_results` (integer, optional): maximum results to return (default 5)
pub struct WebSearchTool {
    endpoint: String,
    agent: ureq::Agent,
    max_bytes: usize,
}

impl WebSearchTool {
    /// Create a search tool against the public endpoint.
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Create a search tool against a custom endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(5))
                .timeout_read(Duration::from_secs(10))
                .build(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstantAnswer {
    #[serde(rename = "Heading")]
    heading: String,
    #[serde(rename = "AbstractText")]
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    #[serde(rename = "Answer")]
    answer: String,
    #[serde(rename = "RelatedTopics")]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelatedTopic {
    #[serde(rename = "Text")]
    text: String,
    #[serde(rename = "FirstURL")]
    first_url: String,
    /// Grouped topics nest further topics instead of carrying text.
    #[serde(rename = "Topics")]
    topics: Vec<RelatedTopic>,
}

/// Render an Instant Answer payload as numbered results.
fn format_answer(body: &str, query: &str, max_results: usize) -> Result<String> {
    let answer: InstantAnswer = serde_json::from_str(body)
        .map_err(|e| SpeechError::ToolExecution(format!("web_search: malformed response: {e}")))?;

    let mut lines = Vec::new();
    if !answer.answer.is_empty() {
        lines.push(format!("Answer: {}", answer.answer));
    }
    if !answer.abstract_text.is_empty() {
        let heading = if answer.heading.is_empty() {
            query
        } else {
            answer.heading.as_str()
        };
        lines.push(format!("{heading}: {}", answer.abstract_text));
        if !answer.abstract_url.is_empty() {
            lines.push(format!("Source: {}", answer.abstract_url));
        }
    }

    let topics = answer
        .related_topics
        .iter()
        .flat_map(|t| std::iter::once(t).chain(t.topics.iter()))
        .filter(|t| !t.text.is_empty())
        .take(max_results);
    for (i, topic) in topics.enumerate() {
        lines.push(format!("{}. {} ({})", i + 1, topic.text, topic.first_url));
    }

    if lines.is_empty() {
        return Ok(format!("No results found for \"{query}\"."));
    }
    Ok(lines.join("\n"))
}

impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for facts, definitions and current topics. Returns a short answer and related results."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default 5)"
                }
            },
            "required": ["query"]
        })
    }

    fn execute(&self, args: Map<String, Value>) -> Result<ToolOutput> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .ok_or_else(|| SpeechError::ToolExecution("missing required argument: query".into()))?;
        if query.is_empty() {
            return Err(SpeechError::ToolExecution("query must not be empty".into()));
        }

        let max_results = args
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|n| n.clamp(1, 20) as usize)
            .unwrap_or(5);

        let body = self
            .agent
            .get(&self.endpoint)
            .query("q", query)
            .query("format", "json")
            .query("no_html", "1")
            .query("skip_disambig", "1")
            .call()
            .map_err(|e| SpeechError::ToolExecution(format!("web_search: request failed: {e}")))?
            .into_string()
            .map_err(|e| SpeechError::ToolExecution(format!("web_search: read failed: {e}")))?;

        let text = format_answer(&body, query, max_results)?;
        let (text, _truncated) = truncate_output(&text, self.max_bytes);
        Ok(ToolOutput::Text(text))
    }
}
