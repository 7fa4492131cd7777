//! Model integration layer.
//!
//! - [`types`] -- Core data types (messages, tool calls, requests).
//! - [`backend`] -- The [`ModelBackend`] seam and per-attempt error classes.
//! - [`client`] -- HTTP client for OpenAI-compatible endpoints.
//! - [`streaming`] -- SSE stream parser for incremental responses.

pub mod backend;
pub mod client;
pub mod streaming;
pub mod types;

pub use backend::{AttemptOutcome, BackendError, ModelAttempt, ModelBackend, TextSink};
pub use client::{ClientConfig, OpenAiCompatibleClient};
pub use types::{
    Completion, CompletionRequest, Message, Role, ToolArguments, ToolCall, ToolDefinition,
    ToolOutput, ToolResult, Usage,
};
