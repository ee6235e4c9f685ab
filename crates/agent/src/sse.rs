//! Server-sent event frames for agent runs. Each frame is one `data: <json>\n\n` block with
//! a `type` discriminator.

use serde::{Deserialize, Serialize};

pub const CONTENT_TYPE: &str = "text/event-stream";
pub const CACHE_CONTROL: &str = "no-cache";
pub const CONNECTION: &str = "keep-alive";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    GuardrailTripwire,
    SystemConfigurationError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SseFrame {
    #[serde(rename_all = "camelCase")]
    AgentSwitch { agent_name: String },
    TextDelta { content: String },
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        correlation_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
        run_id: String,
        status: RunStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        correlation_id: Option<String>,
    },
}

impl SseFrame {
    pub fn agent_switch(agent_name: impl Into<String>) -> Self {
        Self::AgentSwitch { agent_name: agent_name.into() }
    }

    pub fn text_delta(content: impl Into<String>) -> Self {
        Self::TextDelta { content: content.into() }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn to_json(&self) -> String {
        // Every variant is plain strings and unit enums.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{\"type\":\"error\"}"))
    }

    /// Wire encoding: `data: <json>\n\n`.
    pub fn encode(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}
