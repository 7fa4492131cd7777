//! Assistant error types.
//!
//! All assistant subsystems surface errors through [`AssistantError`].  Tool
//! handlers report failures with [`ToolError`], and the orchestrator wraps
//! anything that ends a turn early in a [`TurnError`] carrying the
//! user-facing [`ErrorCategory`].

use serde::{Deserialize, Serialize};

/// Unified error type for the assistant core.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    // -- Catalog errors ------------------------------------------------------
    /// A tool with the same name was already registered.  Fatal at startup.
    #[error("tool `{name}` is already registered")]
    DuplicateTool { name: String },

    /// A tool call referenced a name that is not in the catalog.
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// The catalog definition is inconsistent (empty core subset, cluster
    /// pointing at an unregistered tool, bad keyword table).
    #[error("invalid tool catalog: {reason}")]
    InvalidCatalog { reason: String },

    // -- Gateway errors ------------------------------------------------------
    /// Every round ended with the last candidate answering HTTP 429.
    #[error("all candidate models are rate limited after {rounds} rounds")]
    RateLimited { rounds: u32 },

    /// Every round failed and the last failure was not a rate limit.
    #[error("no candidate model available after {rounds} rounds: {last_error}")]
    AllModelsUnavailable { rounds: u32, last_error: String },

    /// A streaming completion broke after text had already been forwarded.
    #[error("stream from model `{model}` was interrupted mid-response")]
    StreamInterrupted { model: String },

    /// The model returned blank content twice in a row.
    #[error("model returned an empty response twice")]
    EmptyResponse,

    /// The API key is missing for the model endpoint.
    #[error("missing api key for model endpoint {base_url}")]
    MissingApiKey { base_url: String },

    // -- Configuration errors ------------------------------------------------
    /// Configuration validation or loading failed.
    #[error("config error: {reason}")]
    Config { reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.  Prefer a typed variant
    /// whenever possible.
    #[error("internal assistant error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the assistant crate.
pub type Result<T> = std::result::Result<T, AssistantError>;

// ---------------------------------------------------------------------------
// Tool handler errors
// ---------------------------------------------------------------------------

/// Failure reported by a tool handler.
///
/// Never aborts a turn: the coordinator turns it into an error
/// [`crate::ToolResult`] the model can react to.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    /// The arguments did not match the tool's parameter schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The handler ran and failed.
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    /// Shorthand for [`ToolError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

// ---------------------------------------------------------------------------
// Turn errors
// ---------------------------------------------------------------------------

/// Caller-facing classification of a failed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Every candidate model was throttled.
    RateLimited,
    /// No model could serve the request.
    Unavailable,
    /// The model kept answering with blank content.
    EmptyResponse,
    /// Anything else.
    Internal,
}

impl ErrorCategory {
    /// Classify an assistant error for display.
    pub fn of(error: &AssistantError) -> Self {
        match error {
            AssistantError::RateLimited { .. } => Self::RateLimited,
            AssistantError::AllModelsUnavailable { .. }
            | AssistantError::StreamInterrupted { .. } => Self::Unavailable,
            AssistantError::EmptyResponse => Self::EmptyResponse,
            _ => Self::Internal,
        }
    }

    /// The message shown to the dashboard user in place of an answer.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::RateLimited => {
                "The assistant is receiving too many requests right now. \
                 Please wait a few seconds and try again."
            }
            Self::Unavailable => {
                "The assistant is temporarily unavailable. Please try again later."
            }
            Self::EmptyResponse => {
                "The assistant could not produce an answer. Please rephrase your question."
            }
            Self::Internal => "Something went wrong while answering. Please try again.",
        }
    }
}

/// An unrecovered failure at the orchestrator boundary.
#[derive(Debug, thiserror::Error)]
#[error("turn failed ({category:?}): {source}")]
pub struct TurnError {
    /// User-facing classification.
    pub category: ErrorCategory,
    /// The underlying failure.
    #[source]
    pub source: AssistantError,
}

impl From<AssistantError> for TurnError {
    fn from(source: AssistantError) -> Self {
        Self {
            category: ErrorCategory::of(&source),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_gateway_errors() {
        assert_eq!(
            ErrorCategory::of(&AssistantError::RateLimited { rounds: 3 }),
            ErrorCategory::RateLimited
        );
        assert_eq!(
            ErrorCategory::of(&AssistantError::AllModelsUnavailable {
                rounds: 3,
                last_error: "HTTP 503".into(),
            }),
            ErrorCategory::Unavailable
        );
        assert_eq!(
            ErrorCategory::of(&AssistantError::Internal("boom".into())),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn rate_limit_message_asks_to_retry() {
        let msg = ErrorCategory::RateLimited.user_message();
        assert!(msg.contains("try again"));
        assert_ne!(msg, ErrorCategory::Unavailable.user_message());
    }

    #[test]
    fn turn_error_wraps_source() {
        let err = TurnError::from(AssistantError::RateLimited { rounds: 2 });
        assert_eq!(err.category, ErrorCategory::RateLimited);
        assert!(err.to_string().contains("rate limited"));
    }
}
