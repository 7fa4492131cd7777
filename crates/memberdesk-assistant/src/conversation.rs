//! Conversation model and history windowing.
//!
//! A [`ConversationContext`] holds the committed transcript of one session
//! plus the dashboard context map the UI keeps up to date.  It is only ever
//! appended to; working messages of an in-flight turn never enter it.
//!
//! [`ConversationContext::build_window`] turns the transcript into the
//! message list sent to the model.  History is cut into atomic units so an
//! assistant tool-call message always travels together with its tool
//! results, and the oldest units are dropped first when the window is full.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ErrorCategory, TurnError};
use crate::llm::types::{Message, Role, ToolCall, ToolResult};

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

/// Lifecycle of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Streaming,
    Completed,
    Error,
}

/// One entry of the durable transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    /// Tool calls the model made while producing this answer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Results of those calls, in the same order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            status,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            error_detail: None,
            error_category: None,
        }
    }

    /// A message typed by the dashboard user.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, MessageStatus::Completed)
    }

    /// A finalized assistant answer.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, MessageStatus::Completed)
    }

    /// The assistant message recorded in place of an answer when a turn fails.
    pub fn failed(error: &TurnError) -> Self {
        Self {
            error_detail: Some(error.source.to_string()),
            error_category: Some(error.category),
            ..Self::new(
                Role::Assistant,
                error.category.user_message(),
                MessageStatus::Error,
            )
        }
    }

    /// Attach the tool calls and results used for this answer.
    pub fn with_tools(mut self, calls: Vec<ToolCall>, results: Vec<ToolResult>) -> Self {
        self.tool_calls = calls;
        self.tool_results = results;
        self
    }

    /// Record a non-fatal problem on an otherwise completed message.
    pub fn with_error_detail(mut self, detail: Option<String>) -> Self {
        self.error_detail = detail;
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == MessageStatus::Error
    }
}

// ---------------------------------------------------------------------------
// Conversation context
// ---------------------------------------------------------------------------

/// The committed transcript and dashboard context of one session.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    messages: Vec<ChatMessage>,
    context: BTreeMap<String, Value>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed messages, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Append a committed message.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Drop the transcript.  The dashboard context map is kept.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// The dashboard context map.
    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    /// Merge `partial` into the context map.  A `null` value removes the key.
    pub fn set_context(&mut self, partial: Map<String, Value>) {
        for (key, value) in partial {
            if value.is_null() {
                self.context.remove(&key);
            } else {
                self.context.insert(key, value);
            }
        }
    }

    /// The system message describing the dashboard context, if any.
    pub fn context_note(&self) -> Option<String> {
        if self.context.is_empty() {
            return None;
        }
        let mut note = String::from("Current dashboard context:");
        for (key, value) in &self.context {
            note.push_str("\n- ");
            note.push_str(key);
            note.push_str(": ");
            match value {
                Value::String(s) => note.push_str(s),
                other => note.push_str(&other.to_string()),
            }
        }
        Some(note)
    }

    /// Expand the committed transcript into atomic units of model messages.
    fn units(&self) -> Vec<Vec<Message>> {
        let mut units = Vec::with_capacity(self.messages.len());
        for msg in self.messages.iter().filter(|m| !m.is_error()) {
            match msg.role {
                Role::User => units.push(vec![Message::user(&msg.content)]),
                Role::System => units.push(vec![Message::system(&msg.content)]),
                Role::Assistant if !msg.tool_calls.is_empty() => {
                    let mut exchange = Vec::with_capacity(msg.tool_results.len() + 1);
                    exchange.push(Message::assistant_tool_calls("", msg.tool_calls.clone()));
                    exchange.extend(
                        msg.tool_results
                            .iter()
                            .map(|r| Message::tool_result(&r.tool_call_id, r.to_content())),
                    );
                    units.push(exchange);
                    units.push(vec![Message::assistant(&msg.content)]);
                }
                Role::Assistant => units.push(vec![Message::assistant(&msg.content)]),
                // Tool output only exists inside an assistant exchange.
                Role::Tool => {}
            }
        }
        units
    }

    /// Build the message list for the next model call.
    ///
    /// Layout: system prompt, optional context note, as many older history
    /// units as fit, the newest committed unit, then `provisional` (the
    /// in-flight turn's working messages).
    ///
    /// The system prompt, the newest unit and `provisional` are mandatory.
    /// What is left of `window` goes first to the context note, then to
    /// older units, newest first.  The result stays within `window` whenever
    /// the mandatory part does; [`mandatory_len`](Self::mandatory_len) lets
    /// callers size `provisional` accordingly.
    pub fn build_window(&self, system_prompt: &str, provisional: &[Message], window: usize) -> Vec<Message> {
        let units = self.units();
        let (newest, older) = match units.split_last() {
            Some((newest, older)) => (newest.as_slice(), older),
            None => (&[][..], &[][..]),
        };

        let mut out = vec![Message::system(system_prompt)];
        let mut budget = window.saturating_sub(1 + newest.len() + provisional.len());

        if budget > 0 {
            if let Some(note) = self.context_note() {
                out.push(Message::system(note));
                budget -= 1;
            }
        }

        let mut kept: Vec<&[Message]> = Vec::new();
        for unit in older.iter().rev() {
            if unit.len() > budget {
                break;
            }
            budget -= unit.len();
            kept.push(unit);
        }

        for unit in kept.into_iter().rev() {
            out.extend_from_slice(unit);
        }
        out.extend_from_slice(newest);
        out.extend_from_slice(provisional);
        out
    }

    /// Messages [`build_window`](Self::build_window) always sends besides
    /// `provisional`: the system prompt and the newest committed unit.
    pub fn mandatory_len(&self) -> usize {
        1 + self.units().last().map_or(0, Vec::len)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
