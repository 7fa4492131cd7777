//! Integration tests for the model gateway's pacing, fallback and retry
//! policy.
//!
//! All tests run on a paused tokio clock, so every timestamp recorded by the
//! scripted backend is exact.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Reply, ScriptedBackend, status, text};
use memberdesk_assistant::{
    AssistantError, AttemptOutcome, BackendError, GatewayConfig, Message, ModelGateway,
};
use tokio::time::Instant;

const M1: &str = "vendor/model-one:free";
const M2: &str = "vendor/model-two:free";
const M3: &str = "vendor/model-three:free";
const M4: &str = "vendor/model-four:free";

fn config() -> GatewayConfig {
    GatewayConfig {
        models: [M1, M2, M3, M4].map(String::from).to_vec(),
        min_request_delay: Duration::from_secs(1),
        max_rounds: 3,
        round_backoff: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
        temperature: Some(0.3),
        max_tokens: Some(2048),
    }
}

fn gateway(backend: &ScriptedBackend, config: GatewayConfig) -> ModelGateway {
    ModelGateway::new(Arc::new(backend.clone()), config).unwrap()
}

fn ask() -> Vec<Message> {
    vec![Message::system("SYSTEM"), Message::user("hello")]
}

fn outcomes(attempts: &[memberdesk_assistant::ModelAttempt]) -> Vec<(&str, AttemptOutcome)> {
    attempts.iter().map(|a| (a.model.as_str(), a.outcome)).collect()
}

// ── fallback ──────────────────────────────────────────────────────────────────

/// A 429 on the preferred model moves straight to the next candidate, and
/// the model that answered becomes preferred for the next call.
#[tokio::test(start_paused = true)]
async fn rate_limited_model_falls_through_without_delay() {
    let backend = ScriptedBackend::new();
    backend.on(M1, status(429)).on(M2, text("from two"));
    let gateway = gateway(&backend, config());

    let start = Instant::now();
    let result = gateway.complete(ask(), &[]).await.unwrap();

    assert_eq!(result.model, M2);
    assert_eq!(result.content, "from two");
    assert_eq!(
        outcomes(&result.attempts),
        [(M1, AttemptOutcome::RateLimited), (M2, AttemptOutcome::Success)]
    );
    let calls = backend.calls();
    assert_eq!(calls[0].at, start);
    assert_eq!(calls[1].at, start, "no wait between candidates");

    assert_eq!(gateway.preferred_model().await, M2);
    assert_eq!(gateway.candidate_order().await, [M2, M3, M4, M1]);

    backend.on(M2, text("again"));
    let next = gateway.complete(ask(), &[]).await.unwrap();
    assert_eq!(next.model, M2);
    assert_eq!(next.attempts.len(), 1);
    let calls = backend.calls();
    assert_eq!(calls[2].model, M2);
    assert_eq!(calls[2].at - start, Duration::from_secs(1));
}

/// Every candidate fails in round one; round two succeeds on the third
/// model after the linear backoff.
#[tokio::test(start_paused = true)]
async fn second_round_succeeds_on_third_model() {
    let backend = ScriptedBackend::new();
    backend
        .on(M1, status(500))
        .on(M2, status(429))
        .on(M3, status(404))
        .on(M4, Reply::Fail(BackendError::Transport("connection reset".into())))
        .on(M1, status(503))
        .on(M2, status(429))
        .on(M3, text("from three"));
    let gateway = gateway(&backend, config());

    let start = Instant::now();
    let result = gateway.complete(ask(), &[]).await.unwrap();

    assert_eq!(result.model, M3);
    assert_eq!(result.content, "from three");
    assert_eq!(backend.models(), [M1, M2, M3, M4, M1, M2, M3]);
    assert_eq!(
        outcomes(&result.attempts)[..4],
        [
            (M1, AttemptOutcome::TransportError),
            (M2, AttemptOutcome::RateLimited),
            (M3, AttemptOutcome::BadRequest),
            (M4, AttemptOutcome::TransportError),
        ]
    );

    let calls = backend.calls();
    assert_eq!(calls[3].at, start);
    assert_eq!(calls[4].at - start, Duration::from_secs(2), "round_backoff * 1");
    assert_eq!(gateway.candidate_order().await, [M3, M4, M1, M2]);
}

/// After a promotion the round walk starts at the new preferred model and
/// follows the configured order from there.
#[tokio::test(start_paused = true)]
async fn round_walk_starts_at_preferred_model() {
    let backend = ScriptedBackend::new();
    backend
        .on(M1, status(429))
        .on(M2, status(429))
        .on(M3, text("three"));
    let gateway = gateway(&backend, config());
    gateway.complete(ask(), &[]).await.unwrap();

    backend
        .on(M3, status(429))
        .on(M4, status(400))
        .on(M1, text("one"));
    let result = gateway.complete(ask(), &[]).await.unwrap();

    assert_eq!(result.model, M1);
    assert_eq!(backend.models()[3..], [M3, M4, M1]);
    assert_eq!(gateway.candidate_order().await, [M1, M2, M3, M4]);
}

/// A hanging model is cut off at the request deadline and treated as a
/// transport error.
#[tokio::test(start_paused = true)]
async fn timed_out_attempt_counts_as_transport_error() {
    let backend = ScriptedBackend::new();
    backend
        .on(M1, Reply::Delayed(Duration::from_secs(600), Box::new(text("late"))))
        .on(M2, text("on time"));
    let gateway = gateway(&backend, config());

    let result = gateway.complete(ask(), &[]).await.unwrap();

    assert_eq!(result.model, M2);
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::TransportError);
    let calls = backend.calls();
    assert_eq!(calls[1].at - calls[0].at, Duration::from_secs(5));
}

// ── exhaustion ────────────────────────────────────────────────────────────────

/// When the final failure of the final round is a 429 the error says so.
#[tokio::test(start_paused = true)]
async fn exhausted_rounds_ending_in_429_are_rate_limited() {
    let backend = ScriptedBackend::new();
    for _ in 0..3 {
        for model in [M1, M2, M3, M4] {
            backend.on(model, status(429));
        }
    }
    let gateway = gateway(&backend, config());

    let start = Instant::now();
    let err = gateway.complete(ask(), &[]).await.unwrap_err();

    assert!(matches!(err, AssistantError::RateLimited { rounds: 3 }), "{err}");
    let calls = backend.calls();
    assert_eq!(calls.len(), 12);
    assert_eq!(calls[4].at - start, Duration::from_secs(2));
    assert_eq!(calls[8].at - start, Duration::from_secs(6), "2s + 4s backoff");
}

/// Any other final failure means no model is available.
#[tokio::test(start_paused = true)]
async fn exhausted_rounds_ending_elsewhere_are_unavailable() {
    let backend = ScriptedBackend::new();
    for _ in 0..2 {
        for model in [M1, M2, M3] {
            backend.on(model, status(429));
        }
        // M4 falls back to the script default, HTTP 503.
    }
    let gateway = gateway(
        &backend,
        GatewayConfig {
            max_rounds: 2,
            ..config()
        },
    );

    let err = gateway.complete(ask(), &[]).await.unwrap_err();

    match err {
        AssistantError::AllModelsUnavailable { rounds, last_error } => {
            assert_eq!(rounds, 2);
            assert!(last_error.contains("503"), "{last_error}");
        }
        other => panic!("expected AllModelsUnavailable, got {other}"),
    }
    assert_eq!(backend.calls().len(), 8);
}

// ── pacing ────────────────────────────────────────────────────────────────────

/// Sequential calls are started at least `min_request_delay` apart.
#[tokio::test(start_paused = true)]
async fn consecutive_calls_are_paced() {
    let backend = ScriptedBackend::new();
    for _ in 0..3 {
        backend.then(text("ok"));
    }
    let gateway = gateway(&backend, config());

    for _ in 0..3 {
        gateway.complete(ask(), &[]).await.unwrap();
    }

    let calls = backend.calls();
    for pair in calls.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_secs(1));
    }
}

/// Concurrent callers share one pacing clock.
#[tokio::test(start_paused = true)]
async fn concurrent_calls_share_the_pacing_clock() {
    let backend = ScriptedBackend::new();
    backend.then(text("a")).then(text("b"));
    let gateway = gateway(&backend, config());

    let (a, b) = tokio::join!(gateway.complete(ask(), &[]), gateway.complete(ask(), &[]));
    a.unwrap();
    b.unwrap();

    let mut starts: Vec<Instant> = backend.calls().iter().map(|c| c.at).collect();
    starts.sort();
    assert_eq!(starts[1] - starts[0], Duration::from_secs(1));
}

/// A gap longer than the delay needs no extra wait.
#[tokio::test(start_paused = true)]
async fn idle_gateway_does_not_wait() {
    let backend = ScriptedBackend::new();
    backend.then(text("a")).then(text("b"));
    let gateway = gateway(&backend, config());

    gateway.complete(ask(), &[]).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    let before = Instant::now();
    gateway.complete(ask(), &[]).await.unwrap();

    assert_eq!(backend.calls()[1].at, before);
}

// ── request shape ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn request_carries_sampling_settings() {
    let backend = ScriptedBackend::new();
    backend.then(text("ok"));
    let gateway = gateway(&backend, config());

    gateway.complete(ask(), &[]).await.unwrap();

    let calls = backend.calls();
    let request = &calls[0].request;
    assert_eq!(request.temperature, Some(0.3));
    assert_eq!(request.max_tokens, Some(2048));
    assert_eq!(request.messages.len(), 2);
    assert!(request.tools.is_empty());
}

// ── streaming ─────────────────────────────────────────────────────────────────

/// Failures before the first delta fall back like a normal call.
#[tokio::test(start_paused = true)]
async fn stream_falls_back_before_first_delta() {
    let backend = ScriptedBackend::new();
    backend.on(M1, status(429)).on(M2, text("hello there world"));
    let gateway = gateway(&backend, config());

    let mut shown = String::new();
    let mut sink = |delta: &str| shown.push_str(delta);
    let result = gateway.complete_stream(ask(), &mut sink).await.unwrap();

    assert_eq!(result.model, M2);
    assert_eq!(shown, "hello there world");
}

/// A failure after text was forwarded is not replayed from another model.
#[tokio::test(start_paused = true)]
async fn stream_failure_after_delta_is_interrupted() {
    let backend = ScriptedBackend::new();
    backend.on(
        M1,
        Reply::PartialThenFail("Forty".into(), BackendError::Transport("reset".into())),
    );
    let gateway = gateway(&backend, config());

    let mut shown = String::new();
    let mut sink = |delta: &str| shown.push_str(delta);
    let err = gateway.complete_stream(ask(), &mut sink).await.unwrap_err();

    assert!(matches!(&err, AssistantError::StreamInterrupted { model } if model == M1));
    assert_eq!(shown, "Forty");
    assert_eq!(backend.models(), [M1]);
}
