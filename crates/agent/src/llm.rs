//! Model runtime boundary. The run driver only sees a stream of [`ModelStreamEvent`]s; how a
//! runtime produces them (remote completion, scripted test double) stays behind the trait.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use entops_core::config::LlmConfig;
use entops_core::retry::{with_timeout_and_retry, RetryError, RetryPolicy};

use crate::catalog::AgentDefinition;
use crate::request::AgentInputMessage;

const STREAM_BUFFER: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelStreamEvent {
    TextDelta(String),
    /// Control passed to another agent through a handoff.
    AgentUpdated { agent_name: String },
    Completed { final_output: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model endpoint is not configured")]
    NotConfigured,
    #[error("model transport failure: {0}")]
    Transport(String),
    #[error("model endpoint returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("model response could not be parsed: {0}")]
    InvalidResponse(String),
    #[error("model stream failed: {0}")]
    Stream(String),
    #[error("model call timed out after {attempts} attempt(s)")]
    TimedOut { attempts: u32 },
}

#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub agent: AgentDefinition,
    pub input: Vec<AgentInputMessage>,
    pub max_turns: u32,
}

/// Receiving half of one streamed run.
#[derive(Debug)]
pub struct ModelRun {
    events: mpsc::Receiver<Result<ModelStreamEvent, ModelError>>,
}

impl ModelRun {
    pub fn channel() -> (mpsc::Sender<Result<ModelStreamEvent, ModelError>>, Self) {
        let (sender, events) = mpsc::channel(STREAM_BUFFER);
        (sender, Self { events })
    }

    pub async fn next_event(&mut self) -> Option<Result<ModelStreamEvent, ModelError>> {
        self.events.recv().await
    }
}

#[async_trait]
pub trait ModelRuntime: Send + Sync {
    async fn run_streamed(&self, request: ModelRequest) -> Result<ModelRun, ModelError>;
}

/// Stand-in when no endpoint resolves; every run fails as a configuration error.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredModelRuntime;

#[async_trait]
impl ModelRuntime for UnconfiguredModelRuntime {
    async fn run_streamed(&self, _request: ModelRequest) -> Result<ModelRun, ModelError> {
        Err(ModelError::NotConfigured)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` runtime. One completion per run, reported as a
/// single `Completed` event.
#[derive(Clone)]
pub struct HttpModelRuntime {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    policy: RetryPolicy,
}

impl HttpModelRuntime {
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        let endpoint = config.resolve_endpoint()?;
        let timeout = Duration::from_secs(endpoint.timeout_secs);
        let client = Client::builder().timeout(timeout).build().ok()?;
        Some(Self {
            client,
            base_url: endpoint.base_url,
            api_key: endpoint.api_key,
            policy: RetryPolicy::new(timeout, config.max_retries),
        })
    }

    async fn complete(&self, body: &ChatRequest<'_>) -> Result<String, ModelError> {
        let mut request = self.client.post(format!("{}/chat/completions", self.base_url)).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| ModelError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Http { status: status.as_u16(), body });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| ModelError::InvalidResponse(error.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::InvalidResponse("response has no message content".to_string()))
    }
}

#[async_trait]
impl ModelRuntime for HttpModelRuntime {
    async fn run_streamed(&self, request: ModelRequest) -> Result<ModelRun, ModelError> {
        let (sender, run) = ModelRun::channel();
        let runtime = self.clone();

        tokio::spawn(async move {
            let messages = chat_messages(&request);
            let body = ChatRequest { model: &request.agent.model, messages };
            let outcome = with_timeout_and_retry(runtime.policy, || runtime.complete(&body))
                .await
                .map(|final_output| ModelStreamEvent::Completed { final_output })
                .map_err(|error| match error {
                    RetryError::TimedOut { attempts } => ModelError::TimedOut { attempts },
                    RetryError::Failed { error, .. } => error,
                });
            // Receiver dropped means the client went away.
            let _ = sender.send(outcome).await;
        });

        Ok(run)
    }
}

fn chat_messages(request: &ModelRequest) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage { role: "system", content: system_prompt(&request.agent) }];
    messages.extend(request.input.iter().map(|turn| ChatMessage {
        role: match turn {
            AgentInputMessage::User { .. } => "user",
            AgentInputMessage::Assistant { .. } => "assistant",
        },
        content: turn.text(),
    }));
    messages
}

fn system_prompt(agent: &AgentDefinition) -> String {
    let mut prompt = agent.instructions.clone();
    if !agent.handoffs.is_empty() {
        prompt.push_str("\n\nSpecialists on this team:");
        for specialist in &agent.handoffs {
            let tools: Vec<&str> = specialist.tools.iter().map(|tool| tool.name).collect();
            prompt.push_str(&format!("\n- {} (tools: {})", specialist.name, tools.join(", ")));
        }
    }
    if !agent.tools.is_empty() {
        let tools: Vec<&str> = agent.tools.iter().map(|tool| tool.name).collect();
        prompt.push_str(&format!("\n\nYour tools: {}", tools.join(", ")));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{
        chat_messages, HttpModelRuntime, ModelError, ModelRequest, ModelRuntime,
        UnconfiguredModelRuntime,
    };
    use crate::catalog::AgentCatalog;
    use crate::coordinator::create_configured_coordinator;
    use crate::request::AgentInputMessage;
    use entops_core::config::{LlmConfig, LlmProvider};

    fn llm_config(api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: LlmProvider::OpenAi,
            api_key: api_key.map(|key| SecretString::from(key.to_string())),
            base_url: None,
            flagship_model: "gpt-5.2".to_string(),
            standard_model: "gpt-5.1".to_string(),
            timeout_secs: 30,
            max_retries: 2,
        }
    }

    fn request() -> ModelRequest {
        let catalog = AgentCatalog::new("gpt-5.2", "gpt-5.1");
        ModelRequest {
            agent: create_configured_coordinator(&catalog),
            input: vec![
                AgentInputMessage::user("hello"),
                AgentInputMessage::assistant("hi, which deal?"),
            ],
            max_turns: 15,
        }
    }

    #[test]
    fn http_runtime_requires_a_resolved_endpoint() {
        assert!(HttpModelRuntime::from_config(&llm_config(None)).is_none());
        assert!(HttpModelRuntime::from_config(&llm_config(Some("  "))).is_none());
        assert!(HttpModelRuntime::from_config(&llm_config(Some("sk-test"))).is_some());
    }

    #[test]
    fn chat_messages_lead_with_system_prompt_listing_the_team() {
        let messages = chat_messages(&request());
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("Entitlements & Permits"));
        assert!(messages[0].content.contains("route_to_agents"));
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[2].content, "hi, which deal?");
    }

    #[tokio::test]
    async fn unconfigured_runtime_fails_every_run() {
        let result = UnconfiguredModelRuntime.run_streamed(request()).await;
        assert_eq!(result.err(), Some(ModelError::NotConfigured));
    }
}
