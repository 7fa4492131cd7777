//! Turn orchestration.
//!
//! The [`Orchestrator`] drives one user turn from message to finalized
//! answer:
//!
//! ```text
//! AwaitingUserInput -> ToolsSelected -> AwaitingModelFirstPass
//!     -> [ExecutingTools -> AwaitingModelSecondPass] -> Finalized | Errored
//! ```
//!
//! Working messages of a turn (the assistant's tool-call message, the tool
//! results and any corrective instruction) stay local to the turn.  Only the
//! user message and the single finalized (or errored) assistant message are
//! committed to the [`ConversationContext`], so a failed turn never leaves
//! half-written state behind.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::catalog::ToolCatalog;
use crate::conversation::{ChatMessage, ConversationContext};
use crate::coordinator::{DEFAULT_TOOL_TIMEOUT, ToolExecutionCoordinator};
use crate::error::{AssistantError, TurnError};
use crate::gateway::ModelGateway;
use crate::llm::backend::TextSink;
use crate::llm::types::{Message, ToolDefinition};

/// Sent once when the model answers with blank content.
pub const CORRECTIVE_INSTRUCTION: &str = "Your previous reply was empty. Use the information above, \
     including any tool results, to answer my last question in full.";

/// Shown when the model stays blank after the corrective request.
pub const FALLBACK_APOLOGY: &str = "Sorry, I wasn't able to put an answer together for that. \
     Could you rephrase the question?";

/// Smallest `history_window` that fits a turn with one tool call: system
/// prompt, user message, tool-call message, one result, corrective
/// instruction.
pub const MIN_HISTORY_WINDOW: usize = 5;

/// Default system prompt of the dashboard assistant.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the assistant of a membership organization's \
     admin dashboard. Answer questions about members, subscriptions, contributions and \
     crowdfunding campaigns using the provided tools. Never invent figures: call a tool when \
     data is needed. For destructive actions, only prepare them for the administrator to confirm.";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-session orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// First message of every request.
    pub system_prompt: String,
    /// Maximum number of messages sent to the model per request.
    pub history_window: usize,
    /// Deadline for each tool handler invocation.
    pub tool_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            history_window: 20,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Turn state
// ---------------------------------------------------------------------------

/// Where the orchestrator is within the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingUserInput,
    ToolsSelected,
    AwaitingModelFirstPass,
    ExecutingTools,
    AwaitingModelSecondPass,
    Finalized,
    Errored,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingUserInput => "awaiting_user_input",
            Self::ToolsSelected => "tools_selected",
            Self::AwaitingModelFirstPass => "awaiting_model_first_pass",
            Self::ExecutingTools => "executing_tools",
            Self::AwaitingModelSecondPass => "awaiting_model_second_pass",
            Self::Finalized => "finalized",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives the turns of one conversation.
///
/// Every mutating method takes `&mut self`, so turns of a session run one at
/// a time.  Independent sessions each own an orchestrator and share the
/// gateway and catalog.
#[derive(Debug)]
pub struct Orchestrator {
    gateway: Arc<ModelGateway>,
    catalog: Arc<ToolCatalog>,
    coordinator: ToolExecutionCoordinator,
    config: OrchestratorConfig,
    conversation: ConversationContext,
    state: TurnState,
}

impl Orchestrator {
    /// Create an orchestrator for a new session.
    pub fn new(gateway: Arc<ModelGateway>, catalog: Arc<ToolCatalog>, config: OrchestratorConfig) -> Self {
        let coordinator = ToolExecutionCoordinator::new(Arc::clone(&catalog), config.tool_timeout);
        Self {
            gateway,
            catalog,
            coordinator,
            config,
            conversation: ConversationContext::new(),
            state: TurnState::AwaitingUserInput,
        }
    }

    /// Current turn state.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// The committed transcript.
    pub fn history(&self) -> &[ChatMessage] {
        self.conversation.messages()
    }

    /// Forget the transcript.  The dashboard context is kept.
    pub fn clear_history(&mut self) {
        info!(dropped = self.conversation.messages().len(), "conversation history cleared");
        self.conversation.clear();
    }

    /// Merge dashboard context; `null` values remove keys.
    pub fn set_context(&mut self, partial: Map<String, Value>) {
        self.conversation.set_context(partial);
        debug!(keys = self.conversation.context().len(), "dashboard context updated");
    }

    /// The dashboard context map.
    pub fn context(&self) -> &std::collections::BTreeMap<String, Value> {
        self.conversation.context()
    }

    /// Run one full turn and return the committed assistant message.
    ///
    /// Never fails: an unrecovered error is recorded as an assistant message
    /// with `status = error` and returned as such.
    pub async fn chat(&mut self, text: &str) -> ChatMessage {
        self.conversation.push(ChatMessage::user(text));
        info!(chars = text.len(), "turn started");

        let outcome = self.run_turn(text).await;
        self.finish(outcome)
    }

    /// Streaming variant of [`chat`](Self::chat) for turns without tools.
    ///
    /// Text is forwarded to `on_chunk` as the model produces it.  When the
    /// fallback apology replaces a blank answer it is forwarded too.
    pub async fn chat_stream(&mut self, text: &str, on_chunk: TextSink<'_>) -> ChatMessage {
        self.conversation.push(ChatMessage::user(text));
        info!(chars = text.len(), streaming = true, "turn started");

        let outcome = self.run_stream_turn(on_chunk).await;
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: Result<ChatMessage, TurnError>) -> ChatMessage {
        let message = match outcome {
            Ok(message) => {
                self.transition(TurnState::Finalized);
                info!(tool_calls = message.tool_calls.len(), "turn finalized");
                message
            }
            Err(err) => {
                self.transition(TurnState::Errored);
                warn!(category = ?err.category, error = %err.source, "turn failed");
                ChatMessage::failed(&err)
            }
        };
        self.conversation.push(message.clone());
        self.transition(TurnState::AwaitingUserInput);
        message
    }

    async fn run_turn(&mut self, text: &str) -> Result<ChatMessage, TurnError> {
        let tools = self.catalog.select(text);
        let definitions = ToolCatalog::definitions(&tools);
        self.transition(TurnState::ToolsSelected);

        let mut provisional: Vec<Message> = Vec::new();

        self.transition(TurnState::AwaitingModelFirstPass);
        let first = self
            .gateway
            .complete(self.window(&provisional), &definitions)
            .await?;

        let mut calls = first.tool_calls;
        let capacity = self.tool_call_capacity();
        if calls.len() > capacity {
            warn!(
                requested = calls.len(),
                capacity,
                "tool calls exceed the history window, dropping the rest"
            );
            calls.truncate(capacity);
        }

        if calls.is_empty() {
            let (content, detail) = self
                .ensure_content(first.content, &mut provisional, &definitions)
                .await?;
            return Ok(ChatMessage::assistant(content).with_error_detail(detail));
        }

        self.transition(TurnState::ExecutingTools);
        let results = self.coordinator.run(&calls).await;

        provisional.push(Message::assistant_tool_calls(first.content, calls.clone()));
        provisional.extend(
            results
                .iter()
                .map(|r| Message::tool_result(&r.tool_call_id, r.to_content())),
        );

        self.transition(TurnState::AwaitingModelSecondPass);
        let second = self
            .gateway
            .complete(self.window(&provisional), &definitions)
            .await?;
        if !second.tool_calls.is_empty() {
            debug!(
                ignored = second.tool_calls.len(),
                "second pass requested more tools, using its text only"
            );
        }

        let (content, detail) = self
            .ensure_content(second.content, &mut provisional, &definitions)
            .await?;
        Ok(ChatMessage::assistant(content)
            .with_tools(calls, results)
            .with_error_detail(detail))
    }

    async fn run_stream_turn(&mut self, on_chunk: TextSink<'_>) -> Result<ChatMessage, TurnError> {
        self.transition(TurnState::AwaitingModelFirstPass);
        let mut provisional: Vec<Message> = Vec::new();

        let first = self
            .gateway
            .complete_stream(self.window(&provisional), &mut *on_chunk)
            .await?;
        if !first.content.trim().is_empty() {
            return Ok(ChatMessage::assistant(first.content));
        }

        warn!(model = %first.model, "empty streamed answer, sending corrective instruction");
        provisional.push(Message::user(CORRECTIVE_INSTRUCTION));
        let retry = self
            .gateway
            .complete_stream(self.window(&provisional), &mut *on_chunk)
            .await?;
        if !retry.content.trim().is_empty() {
            return Ok(ChatMessage::assistant(retry.content));
        }

        warn!(model = %retry.model, "model stayed empty, substituting apology");
        on_chunk(FALLBACK_APOLOGY);
        Ok(ChatMessage::assistant(FALLBACK_APOLOGY)
            .with_error_detail(Some(AssistantError::EmptyResponse.to_string())))
    }

    /// Apply the blank-answer policy: one corrective request, then the
    /// fixed apology.  Returns the content and, when the apology was used,
    /// the error detail to record.
    async fn ensure_content(
        &self,
        content: String,
        provisional: &mut Vec<Message>,
        definitions: &[ToolDefinition],
    ) -> Result<(String, Option<String>), TurnError> {
        if !content.trim().is_empty() {
            return Ok((content, None));
        }

        warn!("empty answer, sending corrective instruction");
        provisional.push(Message::user(CORRECTIVE_INSTRUCTION));
        let retry = self
            .gateway
            .complete(self.window(provisional), definitions)
            .await?;
        if !retry.content.trim().is_empty() {
            return Ok((retry.content, None));
        }

        warn!(model = %retry.model, "model stayed empty, substituting apology");
        Ok((
            FALLBACK_APOLOGY.to_owned(),
            Some(AssistantError::EmptyResponse.to_string()),
        ))
    }

    /// How many tool results fit next to the mandatory messages, the
    /// tool-call message and a possible corrective instruction.
    fn tool_call_capacity(&self) -> usize {
        self.config
            .history_window
            .saturating_sub(self.conversation.mandatory_len() + 2)
    }

    fn window(&self, provisional: &[Message]) -> Vec<Message> {
        let window = self.conversation.build_window(
            &self.config.system_prompt,
            provisional,
            self.config.history_window,
        );
        debug!(
            messages = window.len(),
            limit = self.config.history_window,
            "history window built"
        );
        window
    }

    fn transition(&mut self, next: TurnState) {
        debug!(from = %self.state, to = %next, "turn state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.history_window, 20);
        assert_eq!(config.tool_timeout, Duration::from_secs(15));
        assert!(!config.system_prompt.is_empty());
    }

    #[test]
    fn fixed_texts_are_not_blank() {
        assert!(!CORRECTIVE_INSTRUCTION.trim().is_empty());
        assert!(!FALLBACK_APOLOGY.trim().is_empty());
    }

    #[test]
    fn state_names() {
        assert_eq!(TurnState::AwaitingModelSecondPass.to_string(), "awaiting_model_second_pass");
        assert_eq!(TurnState::Errored.to_string(), "errored");
    }
}
