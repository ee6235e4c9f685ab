//! Inbound agent-run payloads: validation and history translation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use entops_core::config::AgentConfig;
use entops_core::domain::conversation::{ConversationId, ConversationMessage, MessageRole};
use entops_core::domain::deal::{DealId, OrgId};

const MAX_DEAL_ID_LEN: usize = 128;
const MAX_TURNS_CEILING: u32 = 100;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRunRequest {
    pub message: Option<String>,
    /// Kept as raw JSON so one malformed element can be reported precisely.
    pub input: Option<Vec<Value>>,
    pub conversation_id: Option<String>,
    pub deal_id: Option<String>,
    pub jurisdiction_id: Option<String>,
    pub sku: Option<String>,
    pub run_type: Option<String>,
    pub max_turns: Option<u32>,
    pub persist_conversation: Option<bool>,
    pub inject_system_context: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputText {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Turn in the wire shape the model runtime consumes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum AgentInputMessage {
    User { content: String },
    Assistant { status: String, content: Vec<OutputText> },
}

impl AgentInputMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User { content: content.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            status: "completed".to_string(),
            content: vec![OutputText { kind: "output_text".to_string(), text: text.into() }],
        }
    }

    /// Plain text of the turn; assistant parts are joined.
    pub fn text(&self) -> String {
        match self {
            Self::User { content } => content.clone(),
            Self::Assistant { content, .. } => {
                content.iter().map(|part| part.text.as_str()).collect::<Vec<_>>().join("")
            }
        }
    }

    fn parse(index: usize, value: &Value) -> Result<Self, AgentRequestError> {
        let invalid = |reason: &str| AgentRequestError::InvalidInput { index, reason: reason.to_string() };
        let object = value.as_object().ok_or_else(|| invalid("expected an object"))?;

        match object.get("role").and_then(Value::as_str) {
            Some("user") => {
                let content = object
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("user content must be a string"))?;
                Ok(Self::user(content))
            }
            Some("assistant") => {
                if object.get("status").and_then(Value::as_str) != Some("completed") {
                    return Err(invalid("assistant status must be \"completed\""));
                }
                let parts = object
                    .get("content")
                    .and_then(Value::as_array)
                    .ok_or_else(|| invalid("assistant content must be an array"))?;
                let content = parts
                    .iter()
                    .map(|part| {
                        let part: OutputText = serde_json::from_value(part.clone())
                            .map_err(|_| invalid("assistant content part must be {type, text}"))?;
                        if part.kind != "output_text" {
                            return Err(invalid("assistant content part type must be output_text"));
                        }
                        Ok(part)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Assistant { status: "completed".to_string(), content })
            }
            _ => Err(invalid("role must be \"user\" or \"assistant\"")),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentRequestError {
    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),
    #[error("exactly one of message or input is required")]
    MissingPrompt,
    #[error("input[{index}] is invalid: {reason}")]
    InvalidInput { index: usize, reason: String },
    #[error("invalid deal id: {0}")]
    InvalidDealId(String),
    #[error("maxTurns must be between 1 and {MAX_TURNS_CEILING}")]
    InvalidMaxTurns,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prompt {
    Message(String),
    Input(Vec<AgentInputMessage>),
}

impl Prompt {
    /// Latest user-authored text, used for intent routing and persistence.
    pub fn latest_user_text(&self) -> Option<String> {
        match self {
            Self::Message(message) => Some(message.clone()),
            Self::Input(turns) => turns.iter().rev().find_map(|turn| match turn {
                AgentInputMessage::User { content } => Some(content.clone()),
                AgentInputMessage::Assistant { .. } => None,
            }),
        }
    }
}

/// A request that passed validation. Nothing has been persisted or dispatched yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedRun {
    pub prompt: Prompt,
    pub conversation_id: Option<ConversationId>,
    pub deal_id: Option<DealId>,
    pub jurisdiction_id: Option<String>,
    pub sku: Option<String>,
    pub run_type: Option<String>,
    pub max_turns: u32,
    pub persist_conversation: bool,
    pub inject_system_context: bool,
}

impl AgentRunRequest {
    pub fn from_json(body: &[u8]) -> Result<Self, AgentRequestError> {
        serde_json::from_slice(body).map_err(|error| AgentRequestError::MalformedJson(error.to_string()))
    }

    pub fn validate(self, config: &AgentConfig) -> Result<ValidatedRun, AgentRequestError> {
        let message = self.message.map(|message| message.trim().to_string()).filter(|m| !m.is_empty());
        let input = self.input.filter(|input| !input.is_empty());

        let prompt = match (message, input) {
            (Some(message), None) => Prompt::Message(message),
            (None, Some(input)) => Prompt::Input(
                input
                    .iter()
                    .enumerate()
                    .map(|(index, value)| AgentInputMessage::parse(index, value))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            _ => return Err(AgentRequestError::MissingPrompt),
        };

        let deal_id = match self.deal_id {
            Some(raw) => Some(parse_deal_id(&raw)?),
            None => None,
        };

        let max_turns = self.max_turns.unwrap_or(config.max_turns);
        if !(1..=MAX_TURNS_CEILING).contains(&max_turns) {
            return Err(AgentRequestError::InvalidMaxTurns);
        }

        Ok(ValidatedRun {
            prompt,
            conversation_id: self
                .conversation_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .map(ConversationId),
            deal_id,
            jurisdiction_id: self.jurisdiction_id,
            sku: self.sku,
            run_type: self.run_type,
            max_turns,
            persist_conversation: self.persist_conversation.unwrap_or(true),
            inject_system_context: self
                .inject_system_context
                .unwrap_or(config.inject_system_context),
        })
    }
}

fn parse_deal_id(raw: &str) -> Result<DealId, AgentRequestError> {
    let trimmed = raw.trim();
    let well_formed = !trimmed.is_empty()
        && trimmed.len() <= MAX_DEAL_ID_LEN
        && trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if well_formed {
        Ok(DealId(trimmed.to_string()))
    } else {
        Err(AgentRequestError::InvalidDealId(raw.to_string()))
    }
}

pub fn translate_history(messages: &[ConversationMessage]) -> Vec<AgentInputMessage> {
    messages
        .iter()
        .map(|message| match message.role {
            MessageRole::User => AgentInputMessage::user(message.content.clone()),
            MessageRole::Assistant => AgentInputMessage::assistant(message.content.clone()),
        })
        .collect()
}

pub fn system_preamble(org_id: &OrgId, user_id: &str, deal_summary: Option<&str>) -> String {
    let mut preamble = format!("[system context] org_id={} user_id={}", org_id.0, user_id);
    if let Some(summary) = deal_summary {
        preamble.push_str(&format!("\n[deal] {summary}"));
    }
    preamble
}

/// Prepends `preamble` to the first user turn only. Input without a user turn is unchanged.
pub fn inject_preamble(input: &mut [AgentInputMessage], preamble: &str) {
    if let Some(AgentInputMessage::User { content }) =
        input.iter_mut().find(|turn| matches!(turn, AgentInputMessage::User { .. }))
    {
        *content = format!("{preamble}\n\n{content}");
    }
}
