//! Shared test doubles for the integration tests.
//!
//! [`ScriptedBackend`] replays canned replies per model and records every
//! request it receives, together with the (tokio) instant it arrived.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use memberdesk_assistant::{
    BackendError, Completion, CompletionRequest, ModelBackend, TextSink, ToolArguments, ToolCall,
};
use serde_json::Value;
use tokio::time::Instant;

/// One canned reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with this completion.
    Answer(Completion),
    /// Fail with this error.
    Fail(BackendError),
    /// Stream this text, then fail with the error.
    PartialThenFail(String, BackendError),
    /// Wait, then behave like the inner reply.
    Delayed(Duration, Box<Reply>),
}

pub fn text(content: &str) -> Reply {
    Reply::Answer(Completion {
        content: content.to_owned(),
        tool_calls: Vec::new(),
    })
}

pub fn tool_calls(calls: Vec<ToolCall>) -> Reply {
    Reply::Answer(Completion {
        content: String::new(),
        tool_calls: calls,
    })
}

pub fn status(code: u16) -> Reply {
    Reply::Fail(BackendError::Status {
        status: code,
        body: format!("HTTP {code}"),
    })
}

pub fn call(id: &str, name: &str, args: Value) -> ToolCall {
    ToolCall {
        id: id.to_owned(),
        name: name.to_owned(),
        arguments: args.as_object().cloned().unwrap_or_else(ToolArguments::new),
    }
}

/// A request the backend received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub model: String,
    pub at: Instant,
    pub request: CompletionRequest,
}

#[derive(Default)]
struct Script {
    per_model: HashMap<String, VecDeque<Reply>>,
    shared: VecDeque<Reply>,
    calls: Vec<Recorded>,
}

/// A [`ModelBackend`] that replays a script.
///
/// Replies queued for a specific model are used first, then the shared
/// queue.  An exhausted script answers with HTTP 503.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `model`.
    pub fn on(&self, model: &str, reply: Reply) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .per_model
            .entry(model.to_owned())
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue a reply for whichever model asks next.
    pub fn then(&self, reply: Reply) -> &Self {
        self.inner.lock().unwrap().shared.push_back(reply);
        self
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Models attempted so far, in order.
    pub fn models(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.model).collect()
    }

    fn next(&self, model: &str, request: &CompletionRequest) -> Reply {
        let mut script = self.inner.lock().unwrap();
        script.calls.push(Recorded {
            model: model.to_owned(),
            at: Instant::now(),
            request: request.clone(),
        });
        let queued = script.per_model.get_mut(model).and_then(VecDeque::pop_front);
        queued
            .or_else(|| script.shared.pop_front())
            .unwrap_or_else(|| status(503))
    }
}

async fn resolve(mut reply: Reply) -> Reply {
    while let Reply::Delayed(delay, inner) = reply {
        tokio::time::sleep(delay).await;
        reply = *inner;
    }
    reply
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<Completion, BackendError> {
        let reply = self.next(model, request);
        match resolve(reply).await {
            Reply::Answer(completion) => Ok(completion),
            Reply::Fail(err) | Reply::PartialThenFail(_, err) => Err(err),
            Reply::Delayed(..) => unreachable!("resolved above"),
        }
    }

    async fn complete_stream(
        &self,
        model: &str,
        request: &CompletionRequest,
        on_text: TextSink<'_>,
    ) -> Result<Completion, BackendError> {
        let reply = self.next(model, request);
        match resolve(reply).await {
            Reply::Answer(completion) => {
                for chunk in completion.content.split_inclusive(' ') {
                    on_text(chunk);
                }
                Ok(completion)
            }
            Reply::Fail(err) => Err(err),
            Reply::PartialThenFail(partial, err) => {
                on_text(&partial);
                Err(err)
            }
            Reply::Delayed(..) => unreachable!("resolved above"),
        }
    }
}
