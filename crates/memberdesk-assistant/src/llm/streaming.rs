//! SSE stream parser for the Chat Completions API.
//!
//! The streaming format sends `data:` lines with JSON payloads containing
//! `choices[].delta` objects and terminates with a `data: [DONE]` sentinel.
//! This module folds those lines into a [`Completion`].

use serde_json::Value;

use crate::llm::backend::BackendError;
use crate::llm::client::parse_arguments;
use crate::llm::types::{Completion, ToolCall, Usage};

// ---------------------------------------------------------------------------
// Stream accumulator
// ---------------------------------------------------------------------------

/// Accumulates fragments from an SSE stream into a complete response.
///
/// Text deltas are concatenated.  Tool call deltas arrive split across
/// chunks (the name first, argument fragments afterwards) and are correlated
/// by their `index`.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    /// Accumulated text content from `choices[].delta.content`.
    text: String,

    /// In-progress tool calls indexed by their position in `tool_calls`.
    tool_call_builders: Vec<ToolCallBuilder>,

    /// Whether any `choices` entry was seen at all.
    saw_choice: bool,

    /// Whether the `[DONE]` sentinel has been received.
    done: bool,

    /// Token usage, when the provider includes it in the final chunk.
    usage: Usage,
}

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

impl StreamAccumulator {
    /// Create a new empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the `[DONE]` sentinel has been received.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Token usage reported by the stream, if any.
    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    /// Feed a single SSE line.
    ///
    /// Returns `Ok(Some(delta))` when the line carried text, `Ok(None)` for
    /// anything else.
    pub fn feed_line(&mut self, line: &str) -> Result<Option<String>, BackendError> {
        let line = line.trim_end();

        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }

        let Some(data) = line.strip_prefix("data:") else {
            // `event:` / `id:` fields carry nothing we need.
            return Ok(None);
        };
        let data = data.trim();

        if data == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        let v: Value = serde_json::from_str(data)
            .map_err(|e| BackendError::Parse(format!("invalid JSON in SSE data: {e}")))?;

        if let Some(usage_obj) = v.get("usage").filter(|u| !u.is_null()) {
            if let Some(input) = usage_obj["prompt_tokens"].as_u64() {
                self.usage.input_tokens = input as u32;
            }
            if let Some(output) = usage_obj["completion_tokens"].as_u64() {
                self.usage.output_tokens = output as u32;
            }
        }

        let delta = &v["choices"][0]["delta"];
        if delta.is_null() {
            return Ok(None);
        }
        self.saw_choice = true;

        let mut text_delta = None;
        if let Some(content) = delta["content"].as_str().filter(|c| !c.is_empty()) {
            self.text.push_str(content);
            text_delta = Some(content.to_owned());
        }

        if let Some(tool_calls) = delta["tool_calls"].as_array() {
            for tc in tool_calls {
                let index = tc["index"].as_u64().unwrap_or(0) as usize;
                if self.tool_call_builders.len() <= index {
                    self.tool_call_builders
                        .resize_with(index + 1, ToolCallBuilder::default);
                }
                let builder = &mut self.tool_call_builders[index];

                if let Some(id) = tc["id"].as_str() {
                    builder.id = id.to_owned();
                }
                let func = &tc["function"];
                if let Some(name) = func["name"].as_str() {
                    builder.name.push_str(name);
                }
                if let Some(args) = func["arguments"].as_str() {
                    builder.arguments.push_str(args);
                }
            }
        }

        Ok(text_delta)
    }

    /// Consume the accumulator and produce the final [`Completion`].
    pub fn into_completion(self) -> Result<Completion, BackendError> {
        if !self.saw_choice {
            return Err(BackendError::EmptyChoices);
        }

        let tool_calls = self
            .tool_call_builders
            .into_iter()
            .map(|b| {
                Ok(ToolCall {
                    arguments: parse_arguments(&b.name, &b.arguments)?,
                    id: b.id,
                    name: b.name,
                })
            })
            .collect::<Result<Vec<_>, BackendError>>()?;

        Ok(Completion {
            content: self.text,
            tool_calls,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
