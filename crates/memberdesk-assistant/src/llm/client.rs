//! HTTP client for OpenAI-compatible Chat Completions endpoints.
//!
//! One client serves every candidate model behind the same endpoint (a
//! router such as OpenRouter, or a self-hosted vLLM / Ollama gateway); the
//! model id is chosen per request by [`crate::gateway::ModelGateway`].

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{AssistantError, Result};
use crate::llm::backend::{BackendError, ModelBackend, TextSink};
use crate::llm::streaming::StreamAccumulator;
use crate::llm::types::{
    Completion, CompletionRequest, Message, Role, ToolArguments, ToolCall, ToolDefinition,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default endpoint base URL.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Hard upper bound on a single HTTP exchange.  The gateway applies its own,
/// usually shorter, per-attempt deadline on top.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Bodies longer than this are cut in error messages.
const MAX_ERROR_BODY: usize = 512;

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Connection settings for one completion endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bearer token.
    pub api_key: String,
    /// Base URL, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Sent as `X-Title` so router dashboards can attribute traffic.
    pub app_name: Option<String>,
}

impl ClientConfig {
    /// Settings for the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            app_name: None,
        }
    }

    /// Settings for any OpenAI-compatible endpoint.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            app_name: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A [`ModelBackend`] speaking the Chat Completions wire format over HTTP.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl OpenAiCompatibleClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AssistantError::MissingApiKey {
                base_url: config.base_url,
            });
        }

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AssistantError::Config {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { config, http })
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Build the JSON body for a request to `model`.
    fn build_request_body(&self, model: &str, request: &CompletionRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": model,
            "messages": messages_to_wire(&request.messages),
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = tools_to_wire(&request.tools);
        }
        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    fn headers(&self) -> std::result::Result<HeaderMap, BackendError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", self.config.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|e| BackendError::Transport(format!("invalid authorization header: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(app) = &self.config.app_name {
            if let Ok(value) = HeaderValue::from_str(app) {
                headers.insert("x-title", value);
            }
        }
        Ok(headers)
    }

    /// POST the body and turn non-success statuses into [`BackendError::Status`].
    async fn send(&self, body: &Value) -> std::result::Result<reqwest::Response, BackendError> {
        let url = format!("{}/chat/completions", self.config.base_url);

        tracing::debug!(url = %url, model = %body["model"], "sending completion request");

        let resp = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }

        Ok(resp)
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatibleClient {
    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, BackendError> {
        let body = self.build_request_body(model, request, false);
        let resp = self.send(&body).await?;

        let text = resp
            .text()
            .await
            .map_err(|e| BackendError::Transport(format!("failed to read response body: {e}")))?;
        let v: Value = serde_json::from_str(&text)
            .map_err(|e| BackendError::Parse(format!("invalid JSON response: {e}")))?;

        parse_response(&v)
    }

    async fn complete_stream(
        &self,
        model: &str,
        request: &CompletionRequest,
        on_text: TextSink<'_>,
    ) -> std::result::Result<Completion, BackendError> {
        let body = self.build_request_body(model, request, true);
        let resp = self.send(&body).await?;

        let mut accumulator = StreamAccumulator::new();
        let mut byte_stream = resp.bytes_stream();
        let mut line_buffer: Vec<u8> = Vec::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = chunk_result
                .map_err(|e| BackendError::Transport(format!("stream read error: {e}")))?;
            line_buffer.extend_from_slice(&chunk);

            // Decode whole lines only: a character may straddle two chunks.
            while let Some(newline_pos) = line_buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = line_buffer.drain(..=newline_pos).collect();
                let line = std::str::from_utf8(&raw)
                    .map_err(|e| BackendError::Parse(format!("invalid UTF-8 in stream: {e}")))?;

                if let Some(delta) = accumulator.feed_line(line)? {
                    on_text(&delta);
                }
                if accumulator.is_done() {
                    return finish_stream(model, accumulator);
                }
            }
        }

        finish_stream(model, accumulator)
    }
}

fn finish_stream(
    model: &str,
    accumulator: StreamAccumulator,
) -> std::result::Result<Completion, BackendError> {
    let usage = accumulator.usage();
    tracing::debug!(
        model,
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        "stream finished"
    );
    accumulator.into_completion()
}

// ===========================================================================
// Wire format conversion (free functions)
// ===========================================================================

/// Convert internal messages to the Chat Completions wire format.
///
/// System messages stay in the `messages` array, tool calls go into
/// `assistant.tool_calls` and tool results use `role: "tool"` with a
/// `tool_call_id`.
pub fn messages_to_wire(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| match msg.role {
            Role::System => json!({ "role": "system", "content": msg.content }),
            Role::User => json!({ "role": "user", "content": msg.content }),
            Role::Assistant if msg.tool_calls.is_empty() => {
                json!({ "role": "assistant", "content": msg.content })
            }
            Role::Assistant => {
                let tool_calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": Value::Object(tc.arguments.clone()).to_string(),
                            }
                        })
                    })
                    .collect();

                let content = if msg.content.is_empty() {
                    Value::Null
                } else {
                    json!(msg.content)
                };
                json!({ "role": "assistant", "content": content, "tool_calls": tool_calls })
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": msg.tool_call_id,
                "content": msg.content,
            }),
        })
        .collect()
}

/// Convert tool definitions into the `{"type": "function", ...}` wrapper.
pub fn tools_to_wire(tools: &[ToolDefinition]) -> Value {
    let tool_values: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })
        })
        .collect();
    json!(tool_values)
}

/// Parse a non-streaming response body into a [`Completion`].
///
/// A body without a `choices[0].message` is an [`BackendError::EmptyChoices`]
/// failure, which the gateway treats like a transport error.
pub fn parse_response(v: &Value) -> std::result::Result<Completion, BackendError> {
    let message = &v["choices"][0]["message"];
    if message.is_null() {
        return Err(BackendError::EmptyChoices);
    }

    let tool_calls = match message["tool_calls"].as_array() {
        Some(calls) => calls
            .iter()
            .map(|tc| {
                let func = &tc["function"];
                let name = func["name"].as_str().unwrap_or_default().to_owned();
                let raw = match &func["arguments"] {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                Ok(ToolCall {
                    id: tc["id"].as_str().unwrap_or_default().to_owned(),
                    arguments: parse_arguments(&name, &raw)?,
                    name,
                })
            })
            .collect::<std::result::Result<Vec<_>, BackendError>>()?,
        None => Vec::new(),
    };

    Ok(Completion {
        content: message["content"].as_str().unwrap_or_default().to_owned(),
        tool_calls,
    })
}

/// Parse the JSON-encoded argument string of a tool call.
///
/// An empty string means "no arguments"; anything that is not a JSON object
/// is rejected.
pub(crate) fn parse_arguments(
    tool_name: &str,
    raw: &str,
) -> std::result::Result<ToolArguments, BackendError> {
    if raw.trim().is_empty() {
        return Ok(ToolArguments::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(BackendError::Parse(format!(
            "arguments of tool call `{tool_name}` are not an object: {other}"
        ))),
        Err(e) => Err(BackendError::Parse(format!(
            "invalid JSON in tool call `{tool_name}` arguments: {e}"
        ))),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_owned();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
