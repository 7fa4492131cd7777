//! Concurrent tool execution.
//!
//! [`ToolExecutionCoordinator::run`] spawns one task per requested call,
//! waits for all of them and returns exactly one [`ToolResult`] per call, in
//! the order the calls were given.  Nothing a handler does can abort the
//! batch: unknown names, missing arguments, handler errors, timeouts and
//! panics all come back as error results the model can read.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::catalog::ToolCatalog;
use crate::llm::types::{ToolCall, ToolResult};

/// Default deadline for a single tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(15);

/// Fans tool calls out to their handlers and collects the results.
#[derive(Debug, Clone)]
pub struct ToolExecutionCoordinator {
    catalog: Arc<ToolCatalog>,
    tool_timeout: Duration,
}

impl ToolExecutionCoordinator {
    /// Create a coordinator over a shared catalog.
    pub fn new(catalog: Arc<ToolCatalog>, tool_timeout: Duration) -> Self {
        Self {
            catalog,
            tool_timeout,
        }
    }

    /// Execute every call concurrently.
    ///
    /// Returns `calls.len()` results; `results[i].tool_call_id == calls[i].id`.
    pub async fn run(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        if calls.is_empty() {
            return Vec::new();
        }

        let started = Instant::now();
        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        info!(count = calls.len(), tools = ?names, "executing tool calls");

        let handles: Vec<_> = calls
            .iter()
            .map(|call| {
                let catalog = Arc::clone(&self.catalog);
                let call = call.clone();
                let timeout = self.tool_timeout;
                tokio::spawn(async move { execute_one(&catalog, &call, timeout).await })
            })
            .collect();

        let results: Vec<ToolResult> = join_all(handles)
            .await
            .into_iter()
            .zip(calls)
            .map(|(joined, call)| {
                joined.unwrap_or_else(|e| {
                    warn!(tool = %call.name, error = %e, "tool task aborted");
                    ToolResult::failure(call, format!("tool `{}` crashed: {e}", call.name))
                })
            })
            .collect();

        let failed = results.iter().filter(|r| r.is_error()).count();
        info!(
            count = results.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool calls finished"
        );
        results
    }
}

async fn execute_one(catalog: &ToolCatalog, call: &ToolCall, timeout: Duration) -> ToolResult {
    let descriptor = match catalog.lookup(&call.name) {
        Ok(d) => d,
        Err(e) => {
            warn!(tool = %call.name, "model requested an unknown tool");
            return ToolResult::failure(call, e.to_string());
        }
    };

    if let Err(e) = descriptor.parameters.check_required(&call.arguments) {
        warn!(tool = %call.name, error = %e, "tool call rejected");
        return ToolResult::failure(call, e.to_string());
    }

    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, descriptor.handler.execute(call.arguments.clone())).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(value)) => {
            debug!(tool = %call.name, id = %call.id, elapsed_ms, "tool succeeded");
            ToolResult::success(call, value)
        }
        Ok(Err(e)) => {
            warn!(tool = %call.name, id = %call.id, elapsed_ms, error = %e, "tool failed");
            ToolResult::failure(call, e.to_string())
        }
        Err(_) => {
            warn!(tool = %call.name, id = %call.id, timeout_ms = timeout.as_millis() as u64, "tool timed out");
            ToolResult::failure(
                call,
                format!("tool `{}` timed out after {}s", call.name, timeout.as_secs_f32()),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::catalog::{ParameterKind, ParameterSchema, ToolCatalogBuilder, ToolDescriptor, ToolHandler};
    use crate::error::ToolError;
    use crate::llm::types::{ToolArguments, ToolOutput};

    /// Sleeps for `delay_ms` then echoes its arguments.
    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn execute(&self, arguments: ToolArguments) -> Result<Value, ToolError> {
            let delay = arguments.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(Value::Object(arguments))
        }
    }

    struct Broken;

    #[async_trait]
    impl ToolHandler for Broken {
        async fn execute(&self, _arguments: ToolArguments) -> Result<Value, ToolError> {
            Err(ToolError::failed("database offline"))
        }
    }

    struct Panics;

    #[async_trait]
    impl ToolHandler for Panics {
        async fn execute(&self, _arguments: ToolArguments) -> Result<Value, ToolError> {
            panic!("handler bug");
        }
    }

    fn catalog() -> Arc<ToolCatalog> {
        let mut b = ToolCatalogBuilder::new();
        b.register(ToolDescriptor::new("echo", "", ParameterSchema::empty(), Arc::new(Echo)))
            .unwrap();
        b.register(ToolDescriptor::new("broken", "", ParameterSchema::empty(), Arc::new(Broken)))
            .unwrap();
        b.register(ToolDescriptor::new("panics", "", ParameterSchema::empty(), Arc::new(Panics)))
            .unwrap();
        b.register(ToolDescriptor::new(
            "get_user_details",
            "",
            ParameterSchema::empty().required("user_id", ParameterKind::String, ""),
            Arc::new(Echo),
        ))
        .unwrap();
        b.core(["echo"]);
        Arc::new(b.build().unwrap())
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn results_keep_input_order_regardless_of_latency() {
        let coordinator = ToolExecutionCoordinator::new(catalog(), Duration::from_secs(5));
        let calls = vec![
            call("c1", "echo", json!({"delay_ms": 60})),
            call("c2", "echo", json!({"delay_ms": 0})),
            call("c3", "echo", json!({"delay_ms": 30})),
        ];
        let results = coordinator.run(&calls).await;
        assert_eq!(results.len(), 3);
        for (result, call) in results.iter().zip(&calls) {
            assert_eq!(result.tool_call_id, call.id);
            assert!(!result.is_error());
        }
    }

    #[tokio::test]
    async fn failures_become_error_results() {
        let coordinator = ToolExecutionCoordinator::new(catalog(), Duration::from_secs(5));
        let calls = vec![
            call("c1", "broken", json!({})),
            call("c2", "no_such_tool", json!({})),
            call("c3", "get_user_details", json!({})),
            call("c4", "panics", json!({})),
            call("c5", "echo", json!({"x": 1})),
        ];
        let results = coordinator.run(&calls).await;
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].output, ToolOutput::Error("database offline".into()));
        assert!(matches!(&results[1].output, ToolOutput::Error(m) if m.contains("no_such_tool")));
        assert!(matches!(&results[2].output, ToolOutput::Error(m) if m.contains("user_id")));
        assert!(matches!(&results[3].output, ToolOutput::Error(m) if m.contains("crashed")));
        assert_eq!(results[4].output, ToolOutput::Value(json!({"x": 1})));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out_without_blocking_others() {
        let coordinator = ToolExecutionCoordinator::new(catalog(), Duration::from_millis(100));
        let calls = vec![
            call("slow", "echo", json!({"delay_ms": 10_000})),
            call("fast", "echo", json!({})),
        ];
        let results = coordinator.run(&calls).await;
        assert!(matches!(&results[0].output, ToolOutput::Error(m) if m.contains("timed out")));
        assert!(!results[1].is_error());
    }

    #[tokio::test]
    async fn empty_batch_returns_nothing() {
        let coordinator = ToolExecutionCoordinator::new(catalog(), DEFAULT_TOOL_TIMEOUT);
        assert!(coordinator.run(&[]).await.is_empty());
    }
}
