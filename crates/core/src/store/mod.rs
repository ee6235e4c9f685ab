//! Persistence ports. `entops-db` implements these against SQLite; [`memory`] backs tests and
//! single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::automation::{AutomationEvent, AutomationEventFinish, AutomationEventId};
use crate::domain::conversation::{Conversation, ConversationId, ConversationMessage};
use crate::domain::deal::{Deal, DealId, DealStatus, OrgId};
use crate::domain::strategy::{AnalyticsQuery, KpiSnapshot, StrategyPrediction};
use crate::domain::task::{NewTask, Task, TaskId, TaskStatus};
use crate::domain::upload::{DocumentKind, Upload, UploadId};
use crate::errors::StoreError;

pub mod memory;

pub use memory::{
    InMemoryAutomationEventStore, InMemoryConversationStore, InMemoryDealStore,
    InMemoryEntitlementAnalytics, InMemoryTaskStore, InMemoryUploadStore,
};

#[async_trait]
pub trait AutomationEventStore: Send + Sync {
    async fn insert(&self, event: AutomationEvent) -> Result<(), StoreError>;

    async fn find(&self, id: &AutomationEventId) -> Result<Option<AutomationEvent>, StoreError>;

    /// Applies the terminal write. Fails with `NotFound` when the event was never started.
    async fn finish(
        &self,
        id: &AutomationEventId,
        finish: AutomationEventFinish,
    ) -> Result<(), StoreError>;

    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<AutomationEvent>, StoreError>;
}

#[async_trait]
pub trait DealStore: Send + Sync {
    async fn find(&self, id: &DealId) -> Result<Option<Deal>, StoreError>;

    /// Finds a deal only if it belongs to `org_id` and, when given, `jurisdiction_id`.
    async fn find_scoped(
        &self,
        id: &DealId,
        org_id: &OrgId,
        jurisdiction_id: Option<&str>,
    ) -> Result<Option<Deal>, StoreError>;

    async fn list_by_status(
        &self,
        org_id: Option<&OrgId>,
        statuses: &[DealStatus],
        limit: u32,
    ) -> Result<Vec<Deal>, StoreError>;

    async fn save(&self, deal: Deal) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list_for_step(&self, deal_id: &DealId, pipeline_step: u8)
        -> Result<Vec<Task>, StoreError>;

    async fn list_for_deal(&self, deal_id: &DealId) -> Result<Vec<Task>, StoreError>;

    async fn create(&self, task: NewTask) -> Result<Task, StoreError>;

    /// Creates `task` unless the deal already has an open task whose title contains
    /// `marker`. The check and the insert are one atomic step.
    async fn create_if_no_open_match(
        &self,
        deal_id: &DealId,
        marker: &str,
        task: NewTask,
    ) -> Result<Option<Task>, StoreError>;

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn find(&self, id: &UploadId) -> Result<Option<Upload>, StoreError>;

    async fn update_kind(&self, id: &UploadId, kind: DocumentKind) -> Result<(), StoreError>;

    async fn save(&self, upload: Upload) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the existing conversation for `id` within the org, or creates a new one when
    /// `id` is `None`. An unknown `id` is `NotFound`.
    async fn resolve(
        &self,
        id: Option<&ConversationId>,
        org_id: &OrgId,
        user_id: &str,
        deal_id: Option<&DealId>,
    ) -> Result<Conversation, StoreError>;

    async fn append_message(&self, message: ConversationMessage) -> Result<(), StoreError>;

    /// Most recent `limit` messages, oldest first.
    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, StoreError>;
}

#[async_trait]
pub trait EntitlementAnalytics: Send + Sync {
    async fn strategy_predictions(
        &self,
        query: &AnalyticsQuery,
    ) -> Result<Vec<StrategyPrediction>, StoreError>;

    async fn kpi_snapshot(&self, query: &AnalyticsQuery) -> Result<KpiSnapshot, StoreError>;
}
