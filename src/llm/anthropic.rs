//! Anthropic Messages API backend.
//!
//! Requests are always streamed. The SSE events of one response are folded
//! into a single [`ReasoningResponse`] before returning, since the router
//! only acts on complete replies.
//!
//! # Anthropic SSE Event Flow
//!
//! ```text
//! message_start → content_block_start → content_block_delta* → content_block_stop
//!              → ... (more content blocks) ...
//!              → message_delta → message_stop
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info};

use super::sse::SseParser;
use super::types::{ReasoningResponse, Role, Turn, TurnContent};
use super::ReasoningBackend;
use crate::config::LlmConfig;
use crate::error::{Result, SpeechError};
use crate::tools::types::{ToolCall, ToolDefinition};

/// Configuration for the Anthropic backend.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// Anthropic API key.
    pub api_key: String,
    /// Base URL for the API (defaults to `https://api.anthropic.com`).
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// API version header value.
    pub api_version: String,
    /// Max tokens per reply.
    pub max_tokens: usize,
    /// System prompt, if any.
    pub system_prompt: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl AnthropicConfig {
    /// Create a config with default endpoint and limits.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".to_string(),
            model: model.into(),
            api_version: "2023-06-01".to_string(),
            max_tokens: 1024,
            system_prompt: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Build from agent settings and a resolved API key.
    pub fn from_settings(settings: &LlmConfig, api_key: impl Into<String>) -> Self {
        let system_prompt = Some(settings.system_prompt.clone()).filter(|p| !p.trim().is_empty());
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_tokens: settings.max_tokens,
            system_prompt,
            timeout: Duration::from_secs(settings.request_timeout_secs.max(1)),
            ..Self::new(api_key, settings.model.clone())
        }
    }

    /// Set the base URL (useful for testing with mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

// ── Request Building ───────────────────────────────────────────

/// Build a streaming Messages API request body.
pub fn build_messages_request(
    config: &AnthropicConfig,
    turns: &[Turn],
    tools: &[ToolDefinition],
) -> Value {
    let mut body = json!({
        "model": config.model,
        "max_tokens": config.max_tokens,
        "messages": convert_turns(turns),
        "stream": true,
    });

    if let Some(system) = &config.system_prompt {
        body["system"] = Value::String(system.clone());
    }

    if !tools.is_empty() {
        let tool_defs: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();
        body["tools"] = Value::Array(tool_defs);
    }

    body
}

/// Convert history turns to Anthropic messages.
///
/// Tool results go back as `tool_result` blocks in a user message;
/// consecutive results are merged so they answer the preceding
/// `tool_use` blocks together. Turns with blank text are skipped and
/// consecutive messages of one role are merged.
pub fn convert_turns(turns: &[Turn]) -> Vec<Value> {
    let mut messages: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    for turn in turns {
        if turn.role != Role::Tool && !pending_results.is_empty() {
            push_message(&mut messages, "user", std::mem::take(&mut pending_results));
        }

        match (&turn.role, &turn.content) {
            (Role::Tool, TurnContent::ToolResult { result }) => {
                pending_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": result.call_id,
                    "content": result.output.to_text(),
                    "is_error": result.failed,
                }));
            }
            (Role::Assistant, TurnContent::ToolRequest { text, calls }) => {
                let mut blocks = Vec::with_capacity(calls.len() + 1);
                if !text.trim().is_empty() {
                    blocks.push(json!({"type": "text", "text": text}));
                }
                for call in calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": Value::Object(call.arguments.clone()),
                    }));
                }
                push_message(&mut messages, "assistant", blocks);
            }
            (role, _) => {
                let text = turn.text();
                if text.trim().is_empty() {
                    continue;
                }
                let role = if *role == Role::Assistant { "assistant" } else { "user" };
                push_message(&mut messages, role, vec![json!({"type": "text", "text": text})]);
            }
        }
    }

    if !pending_results.is_empty() {
        push_message(&mut messages, "user", pending_results);
    }

    messages
}

/// Append content blocks, merging into the previous message when the role
/// repeats. Empty text blocks are rejected by the API, so they never get here.
fn push_message(messages: &mut Vec<Value>, role: &str, blocks: Vec<Value>) {
    if let Some(last) = messages.last_mut()
        && last["role"] == role
        && let Some(content) = last["content"].as_array_mut()
    {
        content.extend(blocks);
        return;
    }
    messages.push(json!({"role": role, "content": blocks}));
}

// ── Response Assembly ──────────────────────────────────────────

#[derive(Debug)]
enum OpenBlock {
    Text,
    ToolUse {
        id: String,
        name: String,
        json: String,
    },
}

/// Folds Anthropic stream events into a [`ReasoningResponse`].
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    text: String,
    /// Open content blocks keyed by the server's block index.
    blocks: HashMap<u64, OpenBlock>,
    calls: Vec<ToolCall>,
    stop_reason: Option<String>,
    complete: bool,
}

impl ResponseAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one SSE event.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::ReasoningBackend`] for `error` events and
    /// malformed payloads.
    pub fn apply(&mut self, event_type: &str, data: &str) -> Result<()> {
        let json: Value = serde_json::from_str(data).map_err(|e| {
            SpeechError::ReasoningBackend(format!("malformed {event_type} event: {e}"))
        })?;
        let index = json.get("index").and_then(Value::as_u64).unwrap_or(0);

        match event_type {
            "message_start" => {
                let model = json
                    .pointer("/message/model")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                debug!(model, "stream started");
            }
            "content_block_start" => {
                let block = &json["content_block"];
                let open = match block.get("type").and_then(Value::as_str) {
                    Some("tool_use") => OpenBlock::ToolUse {
                        id: str_field(block, "id"),
                        name: str_field(block, "name"),
                        json: String::new(),
                    },
                    _ => OpenBlock::Text,
                };
                self.blocks.insert(index, open);
            }
            "content_block_delta" => {
                let delta = &json["delta"];
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            self.text.push_str(text);
                        }
                    }
                    Some("input_json_delta") => {
                        if let (Some(OpenBlock::ToolUse { json, .. }), Some(partial)) = (
                            self.blocks.get_mut(&index),
                            delta.get("partial_json").and_then(Value::as_str),
                        ) {
                            json.push_str(partial);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some(OpenBlock::ToolUse { id, name, json }) = self.blocks.remove(&index)
                {
                    let arguments = parse_arguments(&name, &json)?;
                    self.calls.push(ToolCall {
                        id,
                        name,
                        arguments,
                    });
                }
            }
            "message_delta" => {
                if let Some(reason) = json.pointer("/delta/stop_reason").and_then(Value::as_str) {
                    self.stop_reason = Some(reason.to_owned());
                }
            }
            "message_stop" => self.complete = true,
            "error" => {
                let message = json
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(SpeechError::ReasoningBackend(format!("stream error: {message}")));
            }
            _ => {}
        }
        Ok(())
    }

    /// Finish the response.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::ReasoningBackend`] if the stream ended before `message_stop`.
    pub fn finish(self) -> Result<ReasoningResponse> {
        if !self.complete {
            return Err(SpeechError::ReasoningBackend(
                "stream ended before message_stop".into(),
            ));
        }
        debug!(
            stop_reason = self.stop_reason.as_deref().unwrap_or("none"),
            tool_calls = self.calls.len(),
            "response assembled"
        );
        Ok(ReasoningResponse {
            reply_text: self.text,
            pending_tool_calls: self.calls,
        })
    }
}

fn str_field(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn parse_arguments(tool: &str, raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(SpeechError::ReasoningBackend(format!(
            "tool '{tool}' arguments are not an object: {other}"
        ))),
        Err(e) => Err(SpeechError::ReasoningBackend(format!(
            "tool '{tool}' arguments are not valid JSON: {e}"
        ))),
    }
}

// ── Error Mapping ──────────────────────────────────────────────

/// Map HTTP error responses to backend errors.
pub fn map_http_error(status: reqwest::StatusCode, body: &str) -> SpeechError {
    let detail = extract_error_message(body);

    let message = match status.as_u16() {
        401 | 403 => format!("authentication failed: {detail}"),
        429 => format!("rate limit exceeded: {detail}"),
        529 => format!("API overloaded: {detail}"),
        s if s >= 500 => format!("provider error ({status}): {detail}"),
        _ => format!("HTTP {status}: {detail}"),
    };
    SpeechError::ReasoningBackend(message)
}

/// Extract a human-readable error message from an Anthropic error response.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(500).collect()
            }
        })
}

// ── Backend ────────────────────────────────────────────────────

/// Anthropic Messages API reasoning backend.
pub struct AnthropicBackend {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicBackend {
    /// Create a backend.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Config`] if the HTTP client cannot be built.
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SpeechError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Returns a reference to the backend configuration.
    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }
}

#[async_trait]
impl ReasoningBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn respond(&self, turns: &[Turn], tools: &[ToolDefinition]) -> Result<ReasoningResponse> {
        let body = build_messages_request(&self.config, turns, tools);
        let url = format!("{}/v1/messages", self.config.base_url);

        debug!(model = %self.config.model, turns = turns.len(), tools = tools.len(), "sending request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "request failed");
                SpeechError::ReasoningBackend(format!("connection error: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read body".into());
            error!(status = %status, "request returned error");
            return Err(map_http_error(status, &body));
        }

        let mut bytes = response.bytes_stream();
        let mut parser = SseParser::new();
        let mut accumulator = ResponseAccumulator::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk
                .map_err(|e| SpeechError::ReasoningBackend(format!("stream read error: {e}")))?;
            for event in parser.push(&chunk) {
                accumulator.apply(event.event_type.as_deref().unwrap_or(""), &event.data)?;
            }
        }
        if let Some(event) = parser.finish() {
            accumulator.apply(event.event_type.as_deref().unwrap_or(""), &event.data)?;
        }

        let response = accumulator.finish()?;
        info!(
            reply_chars = response.reply_text.chars().count(),
            tool_calls = response.pending_tool_calls.len(),
            "reasoning response received"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::tools::types::{ToolOutput, ToolResult};

    fn apply_all(events: &[(&str, &str)]) -> Result<ReasoningResponse> {
        let mut acc = ResponseAccumulator::new();
        for (event_type, data) in events {
            acc.apply(event_type, data)?;
        }
        acc.finish()
    }

    #[test]
    fn config_from_settings() {
        let settings = LlmConfig {
            base_url: "http://localhost:9999/".into(),
            ..LlmConfig::default()
        };
        let config = AnthropicConfig::from_settings(&settings, "sk-test");
        assert_eq!(config.base_url, "http://localhost:9999");
        assert_eq!(config.model, "claude-3-5-sonnet-20241022");
        assert_eq!(config.max_tokens, 1024);
        assert!(config.system_prompt.unwrap().starts_with("You are a seasoned"));
    }

    #[test]
    fn request_includes_system_tools_and_stream() {
        let config = AnthropicConfig::new("k", "m").with_system_prompt("Be brief.");
        let tools = vec![ToolDefinition::new(
            "web_search",
            "Search",
            json!({"type": "object"}),
        )];
        let body = build_messages_request(&config, &[Turn::user("hi")], &tools);

        assert_eq!(body["system"], "Be brief.");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["tools"][0]["name"], "web_search");
        assert!(body["tools"][0].get("input_schema").is_some());
    }

    #[test]
    fn request_without_tools_omits_field() {
        let config = AnthropicConfig::new("k", "m");
        let body = build_messages_request(&config, &[Turn::user("hi")], &[]);
        assert!(body.get("tools").is_none());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn tool_exchange_converts_to_blocks() {
        let mut args = Map::new();
        args.insert("query".into(), json!("weather"));
        let call = ToolCall::new("toolu_1", "web_search", args);
        let second = ToolCall::new("toolu_2", "current_time", Map::new());
        let turns = vec![
            Turn::user("what's the weather"),
            Turn::tool_request("Let me check.", vec![call.clone(), second.clone()]),
            Turn::tool_result(ToolResult::success(&call, ToolOutput::from("sunny"))),
            Turn::tool_result(ToolResult::failure(&second, "unknown tool")),
            Turn::assistant("It is sunny."),
        ];

        let messages = convert_turns(&turns);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][0]["type"], "text");
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[1]["content"][1]["input"]["query"], "weather");

        assert_eq!(messages[2]["role"], "user");
        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["tool_use_id"], "toolu_1");
        assert_eq!(results[0]["is_error"], false);
        assert_eq!(results[1]["is_error"], true);

        assert_eq!(messages[3]["role"], "assistant");
        assert_eq!(messages[3]["content"][0]["text"], "It is sunny.");
    }

    #[test]
    fn blank_assistant_turn_is_not_sent() {
        let turns = vec![
            Turn::user("hello"),
            Turn::assistant(""),
            Turn::user("again"),
        ];

        let messages = convert_turns(&turns);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        let blocks = messages[0]["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["text"], "hello");
        assert_eq!(blocks[1]["text"], "again");
    }

    #[test]
    fn blank_text_before_tool_use_is_dropped() {
        let call = ToolCall::new("toolu_1", "current_time", Map::new());
        let turns = vec![Turn::user("time?"), Turn::tool_request("  ", vec![call])];

        let messages = convert_turns(&turns);
        let blocks = messages[1]["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["type"], "tool_use");
    }

    #[test]
    fn accumulates_text_reply() {
        let response = apply_all(&[
            ("message_start", r#"{"message":{"id":"msg_1","model":"claude"}}"#),
            ("content_block_start", r#"{"index":0,"content_block":{"type":"text","text":""}}"#),
            ("content_block_delta", r#"{"index":0,"delta":{"type":"text_delta","text":"Hello"}}"#),
            ("content_block_delta", r#"{"index":0,"delta":{"type":"text_delta","text":" there"}}"#),
            ("content_block_stop", r#"{"index":0}"#),
            ("message_delta", r#"{"delta":{"stop_reason":"end_turn"}}"#),
            ("message_stop", r#"{}"#),
        ])
        .unwrap();

        assert_eq!(response.reply_text, "Hello there");
        assert!(response.is_final());
    }

    #[test]
    fn accumulates_tool_call_arguments() {
        let response = apply_all(&[
            ("content_block_start", r#"{"index":0,"content_block":{"type":"text"}}"#),
            ("content_block_delta", r#"{"index":0,"delta":{"type":"text_delta","text":"Checking."}}"#),
            ("content_block_stop", r#"{"index":0}"#),
            (
                "content_block_start",
                r#"{"index":1,"content_block":{"type":"tool_use","id":"toolu_9","name":"web_search","input":{}}}"#,
            ),
            ("content_block_delta", r#"{"index":1,"delta":{"type":"input_json_delta","partial_json":"{\"query\":"}}"#),
            ("content_block_delta", r#"{"index":1,"delta":{"type":"input_json_delta","partial_json":"\"rust\"}"}}"#),
            ("content_block_stop", r#"{"index":1}"#),
            ("message_delta", r#"{"delta":{"stop_reason":"tool_use"}}"#),
            ("message_stop", r#"{}"#),
        ])
        .unwrap();

        assert_eq!(response.reply_text, "Checking.");
        assert_eq!(response.pending_tool_calls.len(), 1);
        let call = &response.pending_tool_calls[0];
        assert_eq!(call.id, "toolu_9");
        assert_eq!(call.name, "web_search");
        assert_eq!(call.arguments["query"], "rust");
    }

    #[test]
    fn huge_block_index_is_tracked_sparsely() {
        let response = apply_all(&[
            (
                "content_block_start",
                r#"{"index":18446744073709551615,"content_block":{"type":"tool_use","id":"t","name":"current_time"}}"#,
            ),
            (
                "content_block_delta",
                r#"{"index":18446744073709551615,"delta":{"type":"input_json_delta","partial_json":"{}"}}"#,
            ),
            ("content_block_stop", r#"{"index":18446744073709551615}"#),
            ("message_stop", r#"{}"#),
        ])
        .unwrap();
        assert_eq!(response.pending_tool_calls.len(), 1);
        assert_eq!(response.pending_tool_calls[0].name, "current_time");
    }

    #[test]
    fn tool_call_without_input_has_empty_arguments() {
        let response = apply_all(&[
            (
                "content_block_start",
                r#"{"index":0,"content_block":{"type":"tool_use","id":"t","name":"current_time"}}"#,
            ),
            ("content_block_stop", r#"{"index":0}"#),
            ("message_stop", r#"{}"#),
        ])
        .unwrap();
        assert!(response.pending_tool_calls[0].arguments.is_empty());
    }

    #[test]
    fn error_event_fails_response() {
        let result = apply_all(&[(
            "error",
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        )]);
        match result {
            Err(SpeechError::ReasoningBackend(msg)) => assert!(msg.contains("Overloaded")),
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[test]
    fn truncated_stream_fails_response() {
        let result = apply_all(&[(
            "content_block_delta",
            r#"{"index":0,"delta":{"type":"text_delta","text":"Hel"}}"#,
        )]);
        assert!(result.is_err());
    }

    #[test]
    fn map_http_error_classes() {
        let auth = map_http_error(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"invalid x-api-key"}}"#,
        );
        assert!(auth.to_string().contains("authentication failed: invalid x-api-key"));

        let limited = map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(limited.to_string().contains("rate limit exceeded: no response body"));

        let server = map_http_error(reqwest::StatusCode::BAD_GATEWAY, "upstream");
        assert!(server.to_string().contains("provider error"));
        assert!(matches!(server, SpeechError::ReasoningBackend(_)));
    }
}
