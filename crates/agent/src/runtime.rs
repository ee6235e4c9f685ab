//! Streaming agent-run driver.
//!
//! One call to [`AgentRunner::run`] owns the outbound frame channel for the whole run and
//! guarantees the stream ends with exactly one `done` frame, including when the run future
//! is dropped part-way.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use entops_core::config::AgentConfig;
use entops_core::domain::conversation::{ConversationId, ConversationMessage, MessageRole};
use entops_core::domain::deal::{DealId, OrgId};
use entops_core::errors::{ApplicationError, StoreError};
use entops_core::store::{ConversationStore, DealStore};

use crate::catalog::{AgentCatalog, COORDINATOR_NAME};
use crate::coordinator::create_intent_aware_coordinator;
use crate::guardrails::classify_run_error;
use crate::intent::QueryIntent;
use crate::llm::{ModelError, ModelRequest, ModelRuntime, ModelStreamEvent};
use crate::request::{
    inject_preamble, system_preamble, translate_history, AgentInputMessage, Prompt, ValidatedRun,
};
use crate::sse::{RunStatus, SseFrame};

/// Caller identity and routing for one run, resolved by the HTTP layer.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub org_id: OrgId,
    pub user_id: String,
    pub correlation_id: String,
    pub intent: QueryIntent,
}

/// Summary handed to post-run hooks.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedRun {
    pub run_id: String,
    pub conversation_id: Option<ConversationId>,
    pub org_id: OrgId,
    pub user_id: String,
    pub deal_id: Option<DealId>,
    pub agent_name: String,
    pub user_text: Option<String>,
    pub output: String,
}

/// Side work after a successful run. Hooks run detached; their failures are logged only.
#[async_trait]
pub trait RunCompletionHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_run_completed(&self, run: &CompletedRun) -> Result<(), ApplicationError>;
}

#[derive(Debug, Error)]
enum RunFailure {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("model stream ended before the run completed")]
    Incomplete,
}

struct FrameSink {
    sender: mpsc::Sender<SseFrame>,
    run_id: String,
    correlation_id: String,
    conversation_id: Option<String>,
    done_sent: bool,
}

impl FrameSink {
    fn new(sender: mpsc::Sender<SseFrame>, run_id: String, correlation_id: String) -> Self {
        Self { sender, run_id, correlation_id, conversation_id: None, done_sent: false }
    }

    async fn send(&mut self, frame: SseFrame) {
        if self.done_sent {
            return;
        }
        self.done_sent = frame.is_done();
        // A closed receiver means the client disconnected; the run still finishes.
        let _ = self.sender.send(frame).await;
    }

    async fn finish(&mut self, status: RunStatus, agent_name: Option<String>) {
        let frame = self.done_frame(status, agent_name);
        self.send(frame).await;
    }

    fn done_frame(&self, status: RunStatus, agent_name: Option<String>) -> SseFrame {
        SseFrame::Done {
            conversation_id: self.conversation_id.clone(),
            run_id: self.run_id.clone(),
            status,
            agent_name,
            correlation_id: Some(self.correlation_id.clone()),
        }
    }
}

impl Drop for FrameSink {
    fn drop(&mut self) {
        if !self.done_sent {
            let frame = self.done_frame(RunStatus::Failed, None);
            let _ = self.sender.try_send(frame);
        }
    }
}

#[derive(Default)]
struct RunState {
    conversation_id: Option<ConversationId>,
    last_agent: Option<String>,
    text: String,
}

impl RunState {
    fn agent_name(&self) -> String {
        self.last_agent.clone().unwrap_or_else(|| COORDINATOR_NAME.to_string())
    }
}

pub struct AgentRunner {
    conversations: Arc<dyn ConversationStore>,
    deals: Arc<dyn DealStore>,
    model: Arc<dyn ModelRuntime>,
    catalog: AgentCatalog,
    config: AgentConfig,
    hooks: Vec<Arc<dyn RunCompletionHook>>,
}

impl AgentRunner {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        deals: Arc<dyn DealStore>,
        model: Arc<dyn ModelRuntime>,
        catalog: AgentCatalog,
        config: AgentConfig,
    ) -> Self {
        Self { conversations, deals, model, catalog, config, hooks: Vec::new() }
    }

    pub fn with_hook(mut self, hook: Arc<dyn RunCompletionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Drives one run to completion, writing frames to `frames`. Returns the terminal status.
    pub async fn run(
        &self,
        run: ValidatedRun,
        context: RunContext,
        frames: mpsc::Sender<SseFrame>,
    ) -> RunStatus {
        let run_id = Uuid::new_v4().to_string();
        let mut sink = FrameSink::new(frames, run_id.clone(), context.correlation_id.clone());
        let mut state = RunState::default();
        let deal_id = run.deal_id.as_ref().map(|id| id.0.as_str()).unwrap_or_default();

        tracing::info!(
            event_name = "agent.run.started",
            correlation_id = %context.correlation_id,
            run_id = %run_id,
            deal_id,
            intent = context.intent.as_str(),
            max_turns = run.max_turns,
            "agent run started"
        );

        match self.drive(&run, &context, &mut sink, &mut state).await {
            Ok(()) => {
                let agent_name = state.agent_name();
                sink.finish(RunStatus::Succeeded, Some(agent_name.clone())).await;
                tracing::info!(
                    event_name = "agent.run.completed",
                    correlation_id = %context.correlation_id,
                    run_id = %run_id,
                    deal_id,
                    agent_name = %agent_name,
                    output_chars = state.text.len(),
                    "agent run completed"
                );
                self.spawn_hooks(CompletedRun {
                    run_id,
                    conversation_id: state.conversation_id,
                    org_id: context.org_id,
                    user_id: context.user_id,
                    deal_id: run.deal_id.clone(),
                    agent_name,
                    user_text: run.prompt.latest_user_text(),
                    output: state.text,
                });
                RunStatus::Succeeded
            }
            Err(failure) => {
                let raw = failure.to_string();
                tracing::warn!(
                    event_name = "agent.run.failed",
                    correlation_id = %context.correlation_id,
                    run_id = %run_id,
                    deal_id,
                    error = %raw,
                    "agent run failed"
                );
                let classified = classify_run_error(&raw, &context.correlation_id);
                sink.send(SseFrame::Error {
                    message: classified.message,
                    code: classified.code,
                    correlation_id: Some(context.correlation_id.clone()),
                })
                .await;
                self.persist_partial(&state, &context).await;
                sink.finish(RunStatus::Failed, state.last_agent.clone()).await;
                RunStatus::Failed
            }
        }
    }

    async fn drive(
        &self,
        run: &ValidatedRun,
        context: &RunContext,
        sink: &mut FrameSink,
        state: &mut RunState,
    ) -> Result<(), RunFailure> {
        sink.send(SseFrame::agent_switch(COORDINATOR_NAME)).await;

        if run.persist_conversation {
            let conversation = self
                .conversations
                .resolve(
                    run.conversation_id.as_ref(),
                    &context.org_id,
                    &context.user_id,
                    run.deal_id.as_ref(),
                )
                .await?;
            sink.conversation_id = Some(conversation.id.0.clone());
            state.conversation_id = Some(conversation.id);
        }

        if let (Some(conversation_id), Some(text)) =
            (&state.conversation_id, run.prompt.latest_user_text())
        {
            self.conversations
                .append_message(message(conversation_id, MessageRole::User, text, None))
                .await?;
        }

        let mut input = match (&run.prompt, &state.conversation_id) {
            (Prompt::Input(turns), _) => turns.clone(),
            (Prompt::Message(_), Some(conversation_id)) => {
                let history = self
                    .conversations
                    .recent_messages(conversation_id, self.config.history_limit)
                    .await?;
                translate_history(&history)
            }
            (Prompt::Message(text), None) => vec![AgentInputMessage::user(text.clone())],
        };

        if run.inject_system_context {
            let deal_summary = match &run.deal_id {
                Some(deal_id) => self
                    .deals
                    .find_scoped(deal_id, &context.org_id, None)
                    .await?
                    .map(|deal| deal.summary()),
                None => None,
            };
            let preamble =
                system_preamble(&context.org_id, &context.user_id, deal_summary.as_deref());
            inject_preamble(&mut input, &preamble);
        }

        let agent = create_intent_aware_coordinator(&self.catalog, context.intent);
        let mut stream = self
            .model
            .run_streamed(ModelRequest { agent, input, max_turns: run.max_turns })
            .await?;

        let mut saw_delta = false;
        let mut completed = false;
        while let Some(event) = stream.next_event().await {
            match event? {
                ModelStreamEvent::TextDelta(chunk) => {
                    saw_delta = true;
                    state.text.push_str(&chunk);
                    sink.send(SseFrame::text_delta(chunk)).await;
                }
                ModelStreamEvent::AgentUpdated { agent_name } => {
                    sink.send(SseFrame::agent_switch(agent_name.clone())).await;
                    state.last_agent = Some(agent_name);
                }
                ModelStreamEvent::Completed { final_output } => {
                    if !saw_delta && !final_output.is_empty() {
                        state.text = final_output.clone();
                        sink.send(SseFrame::text_delta(final_output)).await;
                    }
                    completed = true;
                    break;
                }
            }
        }
        if !completed {
            return Err(RunFailure::Incomplete);
        }

        if let Some(conversation_id) = &state.conversation_id {
            if !state.text.trim().is_empty() {
                self.conversations
                    .append_message(message(
                        conversation_id,
                        MessageRole::Assistant,
                        state.text.clone(),
                        Some(state.agent_name()),
                    ))
                    .await?;
            }
        }

        Ok(())
    }

    async fn persist_partial(&self, state: &RunState, context: &RunContext) {
        let Some(conversation_id) = &state.conversation_id else {
            return;
        };
        if state.text.trim().is_empty() {
            return;
        }
        let partial =
            message(conversation_id, MessageRole::Assistant, state.text.clone(), Some(state.agent_name()));
        if let Err(error) = self.conversations.append_message(partial).await {
            tracing::warn!(
                event_name = "agent.run.partial_persist_failed",
                correlation_id = %context.correlation_id,
                error = %error,
                "could not persist partial assistant text"
            );
        }
    }

    fn spawn_hooks(&self, completed: CompletedRun) {
        if self.hooks.is_empty() {
            return;
        }
        let completed = Arc::new(completed);
        for hook in &self.hooks {
            let hook = Arc::clone(hook);
            let completed = Arc::clone(&completed);
            tokio::spawn(async move {
                if let Err(error) = hook.on_run_completed(&completed).await {
                    tracing::warn!(
                        event_name = "agent.run.hook_failed",
                        hook = hook.name(),
                        run_id = %completed.run_id,
                        error = %error,
                        "post-run hook failed"
                    );
                }
            });
        }
    }
}

fn message(
    conversation_id: &ConversationId,
    role: MessageRole,
    content: String,
    agent_name: Option<String>,
) -> ConversationMessage {
    ConversationMessage {
        conversation_id: conversation_id.clone(),
        role,
        content,
        agent_name,
        created_at: Utc::now(),
    }
}
