//! The seam between the gateway and a concrete model endpoint.
//!
//! [`ModelBackend`] sends one request to one named model.  It knows nothing
//! about fallback, pacing or retries; those belong to
//! [`crate::gateway::ModelGateway`], which only looks at the
//! [`AttemptOutcome`] each [`BackendError`] classifies into.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm::types::{Completion, CompletionRequest};

/// Sink for incremental text during a streaming completion.
pub type TextSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// A model endpoint that can answer completion requests for several models.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Send `request` to `model` and wait for the whole answer.
    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<Completion, BackendError>;

    /// Send `request` to `model` in streaming mode, forwarding each text
    /// delta to `on_text`, and return the aggregated answer.
    async fn complete_stream(
        &self,
        model: &str,
        request: &CompletionRequest,
        on_text: TextSink<'_>,
    ) -> Result<Completion, BackendError>;
}

// ---------------------------------------------------------------------------
// Attempt classification
// ---------------------------------------------------------------------------

/// How a single attempt against one model ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The model answered with at least one choice.
    Success,
    /// HTTP 429.
    RateLimited,
    /// HTTP 400 or 404: malformed request or model not served.
    BadRequest,
    /// Anything else: network failure, deadline, 5xx, unreadable body.
    TransportError,
}

/// One model tried during a gateway call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAttempt {
    /// The model identifier.
    pub model: String,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
}

/// Why a single backend call failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The endpoint answered with a non-success status.
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The per-request deadline elapsed.
    #[error("request timed out")]
    Timeout,

    /// The response had no usable `choices` entry.
    #[error("response contained no choices")]
    EmptyChoices,

    /// The response body could not be parsed.
    #[error("unparsable response: {0}")]
    Parse(String),
}

impl BackendError {
    /// Map the failure onto the gateway's fallback classes.
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            Self::Status { status: 429, .. } => AttemptOutcome::RateLimited,
            Self::Status {
                status: 400 | 404, ..
            } => AttemptOutcome::BadRequest,
            _ => AttemptOutcome::TransportError,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}
