//! Tool-calling orchestration core of the memberdesk dashboard assistant.
//!
//! This crate turns an administrator's natural-language question into calls
//! to an OpenAI-compatible completion endpoint, runs the dashboard tools the
//! model asks for, feeds their results back and produces one final answer,
//! while tolerating a rate-limited, multi-model backend.
//!
//! ## Architecture
//!
//! ```text
//! user text ─> Orchestrator ──select──> ToolCatalog
//!                  │
//!                  ├──complete──> ModelGateway ──> ModelBackend (HTTP / SSE)
//!                  │
//!                  ├──run──────> ToolExecutionCoordinator ──> ToolHandler x N
//!                  │
//!                  └──complete──> ModelGateway
//!                                      │
//!                        finalized ChatMessage <┘
//! ```
//!
//! ## Modules
//!
//! - [`catalog`] -- Tool registry and keyword-based tool selection.
//! - [`dashboard`] -- The membership dashboard's concrete tool table.
//! - [`gateway`] -- Pacing, model fallback and round retry.
//! - [`coordinator`] -- Concurrent tool execution with per-call deadlines.
//! - [`conversation`] -- Chat messages and history windowing.
//! - [`orchestrator`] -- The per-turn state machine.
//! - [`llm`] -- Wire types, the backend seam and the HTTP client.
//! - [`config`] -- TOML and environment configuration.
//! - [`error`] -- Error types.

pub mod catalog;
pub mod config;
pub mod conversation;
pub mod coordinator;
pub mod dashboard;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod orchestrator;

// Re-export the most commonly used types at the crate root.
pub use catalog::{
    ParameterField, ParameterKind, ParameterSchema, ToolCatalog, ToolCatalogBuilder,
    ToolDescriptor, ToolHandler, TopicCluster,
};
pub use config::AssistantConfig;
pub use conversation::{ChatMessage, ConversationContext, MessageStatus};
pub use coordinator::ToolExecutionCoordinator;
pub use dashboard::dashboard_catalog;
pub use error::{AssistantError, ErrorCategory, Result, ToolError, TurnError};
pub use gateway::{CompletionResult, GatewayConfig, ModelGateway, promote_candidate};
pub use llm::{
    AttemptOutcome, BackendError, ClientConfig, Completion, CompletionRequest, Message,
    ModelAttempt, ModelBackend, OpenAiCompatibleClient, Role, TextSink, ToolArguments, ToolCall,
    ToolDefinition, ToolOutput, ToolResult,
};
pub use orchestrator::{Orchestrator, OrchestratorConfig, TurnState};
