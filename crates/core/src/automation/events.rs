use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::deal::{DealId, DealStatus, OrgId};
use crate::domain::task::TaskId;
use crate::domain::upload::UploadId;
use crate::scoring::TriageDecision;

/// Event kinds carried on the automation bus, in `entity.action` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DomainEventType {
    #[serde(rename = "deal.statusChanged")]
    DealStatusChanged,
    #[serde(rename = "task.completed")]
    TaskCompleted,
    #[serde(rename = "task.created")]
    TaskCreated,
    #[serde(rename = "upload.created")]
    UploadCreated,
    #[serde(rename = "parcel.created")]
    ParcelCreated,
    #[serde(rename = "triage.completed")]
    TriageCompleted,
}

impl DomainEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DealStatusChanged => "deal.statusChanged",
            Self::TaskCompleted => "task.completed",
            Self::TaskCreated => "task.created",
            Self::UploadCreated => "upload.created",
            Self::ParcelCreated => "parcel.created",
            Self::TriageCompleted => "triage.completed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    #[serde(rename = "deal.statusChanged", rename_all = "camelCase")]
    DealStatusChanged { deal_id: DealId, from: DealStatus, to: DealStatus, org_id: OrgId },
    #[serde(rename = "task.completed", rename_all = "camelCase")]
    TaskCompleted { deal_id: DealId, task_id: TaskId, org_id: OrgId },
    #[serde(rename = "task.created", rename_all = "camelCase")]
    TaskCreated { deal_id: DealId, task_id: TaskId, org_id: OrgId },
    #[serde(rename = "upload.created", rename_all = "camelCase")]
    UploadCreated { deal_id: DealId, upload_id: UploadId, org_id: OrgId },
    #[serde(rename = "parcel.created", rename_all = "camelCase")]
    ParcelCreated { deal_id: DealId, parcel_id: String, org_id: OrgId },
    #[serde(rename = "triage.completed", rename_all = "camelCase")]
    TriageCompleted { deal_id: DealId, org_id: OrgId, decision: TriageDecision, score: f64 },
}

impl DomainEvent {
    pub fn event_type(&self) -> DomainEventType {
        match self {
            Self::DealStatusChanged { .. } => DomainEventType::DealStatusChanged,
            Self::TaskCompleted { .. } => DomainEventType::TaskCompleted,
            Self::TaskCreated { .. } => DomainEventType::TaskCreated,
            Self::UploadCreated { .. } => DomainEventType::UploadCreated,
            Self::ParcelCreated { .. } => DomainEventType::ParcelCreated,
            Self::TriageCompleted { .. } => DomainEventType::TriageCompleted,
        }
    }

    pub fn deal_id(&self) -> &DealId {
        match self {
            Self::DealStatusChanged { deal_id, .. }
            | Self::TaskCompleted { deal_id, .. }
            | Self::TaskCreated { deal_id, .. }
            | Self::UploadCreated { deal_id, .. }
            | Self::ParcelCreated { deal_id, .. }
            | Self::TriageCompleted { deal_id, .. } => deal_id,
        }
    }

    pub fn org_id(&self) -> &OrgId {
        match self {
            Self::DealStatusChanged { org_id, .. }
            | Self::TaskCompleted { org_id, .. }
            | Self::TaskCreated { org_id, .. }
            | Self::UploadCreated { org_id, .. }
            | Self::ParcelCreated { org_id, .. }
            | Self::TriageCompleted { org_id, .. } => org_id,
        }
    }

    /// Payload recorded as the automation event's input data.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
