//! Model gateway: pacing, fallback ordering and round retry.
//!
//! One [`ModelGateway`] is built per process and shared by every
//! orchestrator through an `Arc`.  Its mutex guards the only mutable state
//! shared between sessions: the pacing clock and the candidate order.
//!
//! A call walks the candidate list once per round.  A rate-limited, rejected
//! or failed candidate hands over to the next one immediately.  When every
//! candidate of a round failed the gateway waits `round_backoff * round` and
//! starts over from the (possibly new) preferred model, up to `max_rounds`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{AssistantError, Result};
use crate::llm::backend::{AttemptOutcome, BackendError, ModelAttempt, ModelBackend, TextSink};
use crate::llm::types::{Completion, CompletionRequest, Message, ToolCall, ToolDefinition};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Free models tried by default, most capable first.
pub const DEFAULT_MODELS: &[&str] = &[
    "meta-llama/llama-3.3-70b-instruct:free",
    "google/gemini-2.0-flash-exp:free",
    "mistralai/mistral-small-3.1-24b-instruct:free",
    "qwen/qwen-2.5-72b-instruct:free",
];

/// Tunables of the gateway's resilience policy.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Candidate models in configured order.  Index 0 starts as preferred.
    pub models: Vec<String>,
    /// Minimum spacing between the starts of two rounds, process-wide.
    pub min_request_delay: Duration,
    /// Total number of walks through the candidate list.
    pub max_rounds: u32,
    /// Base of the linear backoff between rounds.
    pub round_backoff: Duration,
    /// Deadline for a single attempt against one model.
    pub request_timeout: Duration,
    /// Sampling temperature sent with every request.
    pub temperature: Option<f32>,
    /// Generation cap sent with every request.
    pub max_tokens: Option<u32>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            models: DEFAULT_MODELS.iter().map(|m| (*m).to_owned()).collect(),
            min_request_delay: Duration::from_secs(1),
            max_rounds: 3,
            round_backoff: Duration::from_secs(2),
            request_timeout: Duration::from_secs(60),
            temperature: Some(0.3),
            max_tokens: Some(2048),
        }
    }
}

impl GatewayConfig {
    fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(AssistantError::Config {
                reason: "gateway needs at least one candidate model".into(),
            });
        }
        if self.models.iter().any(|m| m.trim().is_empty()) {
            return Err(AssistantError::Config {
                reason: "candidate model names must not be blank".into(),
            });
        }
        if self.max_rounds == 0 {
            return Err(AssistantError::Config {
                reason: "max_rounds must be at least 1".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// What a successful gateway call produced.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    /// Text of the answer (may be empty when only tool calls were returned).
    pub content: String,
    /// Tool invocations requested by the model.
    pub tool_calls: Vec<ToolCall>,
    /// The model that answered.
    pub model: String,
    /// Every attempt made during this call, in order.
    pub attempts: Vec<ModelAttempt>,
}

impl CompletionResult {
    fn new(completion: Completion, model: &str, attempts: Vec<ModelAttempt>) -> Self {
        Self {
            content: completion.content,
            tool_calls: completion.tool_calls,
            model: model.to_owned(),
            attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// Promotion rule
// ---------------------------------------------------------------------------

/// Reorder `candidates` so the one at `attempt_index` becomes preferred.
///
/// The list is rotated, so the models after the winner keep following it
/// and the ones before it move to the back in their configured order.  An
/// index of 0 or out of range leaves the order unchanged.
pub fn promote_candidate(candidates: &[String], attempt_index: usize) -> Vec<String> {
    let mut order = candidates.to_vec();
    if attempt_index > 0 && attempt_index < order.len() {
        order.rotate_left(attempt_index);
    }
    order
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct GatewayState {
    /// Start slot of the most recent round, reserved under the lock.
    last_request_start: Option<Instant>,
    /// Current candidate order, index 0 = preferred.
    candidates: Vec<String>,
}

/// Process-wide entry point for model completions.
pub struct ModelGateway {
    backend: Arc<dyn ModelBackend>,
    config: GatewayConfig,
    state: Mutex<GatewayState>,
}

impl std::fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ModelGateway {
    /// Create a gateway over `backend`.
    ///
    /// # Errors
    ///
    /// [`AssistantError::Config`] if the model list is empty or
    /// `max_rounds` is zero.
    pub fn new(backend: Arc<dyn ModelBackend>, config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        info!(
            models = config.models.len(),
            preferred = %config.models[0],
            max_rounds = config.max_rounds,
            "model gateway initialised"
        );
        let state = GatewayState {
            last_request_start: None,
            candidates: config.models.clone(),
        };
        Ok(Self {
            backend,
            config,
            state: Mutex::new(state),
        })
    }

    /// The gateway configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Current candidate order, preferred model first.
    pub async fn candidate_order(&self) -> Vec<String> {
        self.state.lock().await.candidates.clone()
    }

    /// The model tried first on the next call.
    pub async fn preferred_model(&self) -> String {
        let state = self.state.lock().await;
        state.candidates.first().cloned().unwrap_or_default()
    }

    /// Ask the candidate models for a completion, advertising `tools`.
    ///
    /// # Errors
    ///
    /// [`AssistantError::RateLimited`] or
    /// [`AssistantError::AllModelsUnavailable`] once every round failed.
    pub async fn complete(
        &self,
        messages: Vec<Message>,
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult> {
        let request = self.request(messages, tools.to_vec());
        self.run(&request, None).await
    }

    /// Streaming variant of [`complete`](Self::complete) without tools.
    ///
    /// Text deltas are forwarded to `on_text` as they arrive.  A failure
    /// after the first forwarded delta ends the call with
    /// [`AssistantError::StreamInterrupted`], since falling back would
    /// repeat text the caller has already shown.
    pub async fn complete_stream(
        &self,
        messages: Vec<Message>,
        on_text: TextSink<'_>,
    ) -> Result<CompletionResult> {
        let request = self.request(messages, Vec::new());
        self.run(&request, Some(on_text)).await
    }

    fn request(&self, messages: Vec<Message>, tools: Vec<ToolDefinition>) -> CompletionRequest {
        CompletionRequest {
            messages,
            tools,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    async fn run(
        &self,
        request: &CompletionRequest,
        mut on_text: Option<TextSink<'_>>,
    ) -> Result<CompletionResult> {
        let mut attempts = Vec::new();
        let mut last_failure: Option<(AttemptOutcome, String)> = None;
        let max_rounds = self.config.max_rounds;

        for round in 1..=max_rounds {
            self.pace().await;
            let order = self.candidate_order().await;

            for (index, model) in order.iter().enumerate() {
                debug!(
                    model = %model,
                    round,
                    messages = request.messages.len(),
                    tools = request.tools.len(),
                    "sending completion request"
                );

                let mut emitted = false;
                let outcome = match on_text.as_deref_mut() {
                    None => self.attempt(self.backend.complete(model, request)).await,
                    Some(sink) => {
                        let mut forward = |delta: &str| {
                            emitted = true;
                            sink(delta);
                        };
                        self.attempt(self.backend.complete_stream(model, request, &mut forward))
                            .await
                    }
                };

                match outcome {
                    Ok(completion) => {
                        attempts.push(ModelAttempt {
                            model: model.clone(),
                            outcome: AttemptOutcome::Success,
                        });
                        if index > 0 {
                            self.promote(model).await;
                        }
                        if attempts.len() > 1 {
                            info!(model = %model, round, attempts = attempts.len(), "fallback model answered");
                        }
                        return Ok(CompletionResult::new(completion, model, attempts));
                    }
                    Err(err) if emitted => {
                        warn!(model = %model, error = %err, "stream failed after partial output");
                        return Err(AssistantError::StreamInterrupted {
                            model: model.clone(),
                        });
                    }
                    Err(err) => {
                        let class = err.outcome();
                        warn!(model = %model, round, outcome = ?class, error = %err, "model attempt failed");
                        attempts.push(ModelAttempt {
                            model: model.clone(),
                            outcome: class,
                        });
                        last_failure = Some((class, err.to_string()));
                    }
                }
            }

            if round < max_rounds {
                let backoff = self.config.round_backoff * round;
                info!(round, backoff_ms = backoff.as_millis() as u64, "every candidate failed, backing off");
                tokio::time::sleep(backoff).await;
            }
        }

        Err(match last_failure {
            Some((AttemptOutcome::RateLimited, _)) => AssistantError::RateLimited { rounds: max_rounds },
            Some((_, last_error)) => AssistantError::AllModelsUnavailable {
                rounds: max_rounds,
                last_error,
            },
            None => AssistantError::AllModelsUnavailable {
                rounds: max_rounds,
                last_error: "no model was attempted".into(),
            },
        })
    }

    /// Await one backend call under the per-attempt deadline.
    async fn attempt<F>(&self, call: F) -> std::result::Result<Completion, BackendError>
    where
        F: std::future::Future<Output = std::result::Result<Completion, BackendError>>,
    {
        tokio::time::timeout(self.config.request_timeout, call)
            .await
            .unwrap_or(Err(BackendError::Timeout))
    }

    /// Reserve the next start slot and wait for it.
    ///
    /// The slot is claimed under the lock and the sleep happens outside it,
    /// so concurrent callers queue up `min_request_delay` apart.
    async fn pace(&self) {
        let slot = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let slot = match state.last_request_start {
                Some(last) => (last + self.config.min_request_delay).max(now),
                None => now,
            };
            state.last_request_start = Some(slot);
            slot
        };

        let now = Instant::now();
        if slot > now {
            debug!(wait_ms = (slot - now).as_millis() as u64, "pacing model request");
            tokio::time::sleep_until(slot).await;
        }
    }

    async fn promote(&self, model: &str) {
        let mut state = self.state.lock().await;
        if let Some(position) = state.candidates.iter().position(|m| m == model) {
            if position > 0 {
                state.candidates = promote_candidate(&state.candidates, position);
                info!(model = %model, "preferred model changed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn promotion_rotates_winner_to_front() {
        let order = names(&["a", "b", "c", "d"]);
        assert_eq!(promote_candidate(&order, 2), names(&["c", "d", "a", "b"]));
        assert_eq!(promote_candidate(&order, 1), names(&["b", "c", "d", "a"]));
    }

    #[test]
    fn promotion_of_first_or_out_of_range_is_noop() {
        let order = names(&["a", "b"]);
        assert_eq!(promote_candidate(&order, 0), order);
        assert_eq!(promote_candidate(&order, 7), order);
        assert!(promote_candidate(&[], 1).is_empty());
    }

    #[test]
    fn default_config_is_valid() {
        let config = GatewayConfig::default();
        assert_eq!(config.models.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let empty = GatewayConfig {
            models: Vec::new(),
            ..GatewayConfig::default()
        };
        assert!(matches!(empty.validate(), Err(AssistantError::Config { .. })));

        let no_rounds = GatewayConfig {
            max_rounds: 0,
            ..GatewayConfig::default()
        };
        assert!(matches!(no_rounds.validate(), Err(AssistantError::Config { .. })));
    }
}
