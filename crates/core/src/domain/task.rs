use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::deal::{DealId, OrgId};

/// Title prefix for tasks generated by automation handlers.
pub const AUTO_TASK_MARKER: &str = "[AUTO]";
/// Title prefix for tasks materialized by the entitlement strategy autopilot.
pub const AUTOPILOT_TASK_MARKER: &str = "[AUTOPILOT]";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Waiting,
    Done,
    Canceled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "TODO",
            Self::InProgress => "IN_PROGRESS",
            Self::Blocked => "BLOCKED",
            Self::Waiting => "WAITING",
            Self::Done => "DONE",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TODO" => Some(Self::Todo),
            "IN_PROGRESS" => Some(Self::InProgress),
            "BLOCKED" => Some(Self::Blocked),
            "WAITING" => Some(Self::Waiting),
            "DONE" => Some(Self::Done),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Done | Self::Canceled)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub org_id: OrgId,
    pub deal_id: DealId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub pipeline_step: u8,
    pub created_at: DateTime<Utc>,
}

/// A task to be created; id and timestamps are assigned by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub org_id: OrgId,
    pub deal_id: DealId,
    pub title: String,
    pub description: Option<String>,
    pub pipeline_step: u8,
}

impl NewTask {
    pub fn into_task(self) -> Task {
        Task {
            id: TaskId::generate(),
            org_id: self.org_id,
            deal_id: self.deal_id,
            title: self.title,
            description: self.description,
            status: TaskStatus::Todo,
            pipeline_step: self.pipeline_step,
            created_at: Utc::now(),
        }
    }
}
