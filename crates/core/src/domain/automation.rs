use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::deal::DealId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AutomationEventId(pub String);

impl AutomationEventId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationEventStatus {
    Running,
    Completed,
    Failed,
}

impl AutomationEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Telemetry row for one handler invocation. Created `Running`, finished exactly once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationEvent {
    pub id: AutomationEventId,
    pub deal_id: Option<DealId>,
    pub handler_name: String,
    pub event_type: String,
    pub status: AutomationEventStatus,
    pub input_data: Option<Value>,
    pub output_data: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// Terminal write applied to a running event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationEventFinish {
    pub status: AutomationEventStatus,
    pub output_data: Option<Value>,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}
