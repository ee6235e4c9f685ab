use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::autopilot::analytics;
use crate::domain::automation::{AutomationEvent, AutomationEventFinish, AutomationEventId};
use crate::domain::conversation::{Conversation, ConversationId, ConversationMessage};
use crate::domain::deal::{Deal, DealId, DealStatus, OrgId};
use crate::domain::strategy::{
    AnalyticsQuery, KpiSnapshot, StrategyOutcomeRecord, StrategyPrediction,
};
use crate::domain::task::{NewTask, Task, TaskId, TaskStatus};
use crate::domain::upload::{DocumentKind, Upload, UploadId};
use crate::errors::StoreError;

use super::{
    AutomationEventStore, ConversationStore, DealStore, EntitlementAnalytics, TaskStore,
    UploadStore,
};

#[derive(Default)]
pub struct InMemoryAutomationEventStore {
    events: RwLock<HashMap<String, AutomationEvent>>,
}

#[async_trait]
impl AutomationEventStore for InMemoryAutomationEventStore {
    async fn insert(&self, event: AutomationEvent) -> Result<(), StoreError> {
        let mut events = self.events.write().await;
        events.insert(event.id.0.clone(), event);
        Ok(())
    }

    async fn find(&self, id: &AutomationEventId) -> Result<Option<AutomationEvent>, StoreError> {
        let events = self.events.read().await;
        Ok(events.get(&id.0).cloned())
    }

    async fn finish(
        &self,
        id: &AutomationEventId,
        finish: AutomationEventFinish,
    ) -> Result<(), StoreError> {
        let mut events = self.events.write().await;
        let event = events
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound(format!("automation event {}", id.0)))?;
        event.status = finish.status;
        event.output_data = finish.output_data;
        event.error = finish.error;
        event.completed_at = Some(finish.completed_at);
        event.duration_ms = Some(finish.duration_ms);
        Ok(())
    }

    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<AutomationEvent>, StoreError> {
        let events = self.events.read().await;
        let mut matching: Vec<AutomationEvent> =
            events.values().filter(|event| event.started_at >= since).cloned().collect();
        matching.sort_by(|left, right| left.started_at.cmp(&right.started_at));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryDealStore {
    deals: RwLock<HashMap<String, Deal>>,
}

#[async_trait]
impl DealStore for InMemoryDealStore {
    async fn find(&self, id: &DealId) -> Result<Option<Deal>, StoreError> {
        let deals = self.deals.read().await;
        Ok(deals.get(&id.0).cloned())
    }

    async fn find_scoped(
        &self,
        id: &DealId,
        org_id: &OrgId,
        jurisdiction_id: Option<&str>,
    ) -> Result<Option<Deal>, StoreError> {
        let deals = self.deals.read().await;
        Ok(deals
            .get(&id.0)
            .filter(|deal| &deal.org_id == org_id)
            .filter(|deal| match jurisdiction_id {
                Some(jurisdiction) => deal.jurisdiction_id.as_deref() == Some(jurisdiction),
                None => true,
            })
            .cloned())
    }

    async fn list_by_status(
        &self,
        org_id: Option<&OrgId>,
        statuses: &[DealStatus],
        limit: u32,
    ) -> Result<Vec<Deal>, StoreError> {
        let deals = self.deals.read().await;
        let mut matching: Vec<Deal> = deals
            .values()
            .filter(|deal| statuses.contains(&deal.status))
            .filter(|deal| org_id.map(|org| &deal.org_id == org).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|left, right| left.id.0.cmp(&right.id.0));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn save(&self, deal: Deal) -> Result<(), StoreError> {
        let mut deals = self.deals.write().await;
        deals.insert(deal.id.0.clone(), deal);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<Vec<Task>>,
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn list_for_step(
        &self,
        deal_id: &DealId,
        pipeline_step: u8,
    ) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .iter()
            .filter(|task| &task.deal_id == deal_id && task.pipeline_step == pipeline_step)
            .cloned()
            .collect())
    }

    async fn list_for_deal(&self, deal_id: &DealId) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().filter(|task| &task.deal_id == deal_id).cloned().collect())
    }

    async fn create(&self, task: NewTask) -> Result<Task, StoreError> {
        let task = task.into_task();
        let mut tasks = self.tasks.write().await;
        tasks.push(task.clone());
        Ok(task)
    }

    async fn create_if_no_open_match(
        &self,
        deal_id: &DealId,
        marker: &str,
        task: NewTask,
    ) -> Result<Option<Task>, StoreError> {
        let mut tasks = self.tasks.write().await;
        let exists = tasks.iter().any(|existing| {
            &existing.deal_id == deal_id
                && existing.status.is_open()
                && existing.title.contains(marker)
        });
        if exists {
            return Ok(None);
        }

        let task = task.into_task();
        tasks.push(task.clone());
        Ok(Some(task))
    }

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|task| &task.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("task {}", id.0)))?;
        task.status = status;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUploadStore {
    uploads: RwLock<HashMap<String, Upload>>,
}

#[async_trait]
impl UploadStore for InMemoryUploadStore {
    async fn find(&self, id: &UploadId) -> Result<Option<Upload>, StoreError> {
        let uploads = self.uploads.read().await;
        Ok(uploads.get(&id.0).cloned())
    }

    async fn update_kind(&self, id: &UploadId, kind: DocumentKind) -> Result<(), StoreError> {
        let mut uploads = self.uploads.write().await;
        let upload = uploads
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound(format!("upload {}", id.0)))?;
        upload.kind = kind;
        Ok(())
    }

    async fn save(&self, upload: Upload) -> Result<(), StoreError> {
        let mut uploads = self.uploads.write().await;
        uploads.insert(upload.id.0.clone(), upload);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    messages: RwLock<Vec<ConversationMessage>>,
}

impl InMemoryConversationStore {
    pub async fn messages_for(&self, id: &ConversationId) -> Vec<ConversationMessage> {
        let messages = self.messages.read().await;
        messages.iter().filter(|message| &message.conversation_id == id).cloned().collect()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn resolve(
        &self,
        id: Option<&ConversationId>,
        org_id: &OrgId,
        user_id: &str,
        deal_id: Option<&DealId>,
    ) -> Result<Conversation, StoreError> {
        let mut conversations = self.conversations.write().await;
        if let Some(id) = id {
            return conversations
                .get(&id.0)
                .filter(|conversation| &conversation.org_id == org_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("conversation {}", id.0)));
        }

        let conversation = Conversation {
            id: ConversationId::generate(),
            org_id: org_id.clone(),
            user_id: user_id.to_string(),
            deal_id: deal_id.cloned(),
            created_at: Utc::now(),
        };
        conversations.insert(conversation.id.0.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn append_message(&self, message: ConversationMessage) -> Result<(), StoreError> {
        let mut messages = self.messages.write().await;
        messages.push(message);
        Ok(())
    }

    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        let messages = self.messages_for(id).await;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }
}

/// Analytics over an in-process list of outcome records, using the same aggregation as the
/// SQL implementation.
#[derive(Default)]
pub struct InMemoryEntitlementAnalytics {
    records: RwLock<Vec<StrategyOutcomeRecord>>,
}

impl InMemoryEntitlementAnalytics {
    pub async fn record(&self, record: StrategyOutcomeRecord) {
        let mut records = self.records.write().await;
        records.push(record);
    }

    async fn scoped(&self, query: &AnalyticsQuery) -> Vec<StrategyOutcomeRecord> {
        let records = self.records.read().await;
        analytics::scope_records(records.iter(), query, Utc::now())
    }
}

#[async_trait]
impl EntitlementAnalytics for InMemoryEntitlementAnalytics {
    async fn strategy_predictions(
        &self,
        query: &AnalyticsQuery,
    ) -> Result<Vec<StrategyPrediction>, StoreError> {
        Ok(analytics::predict_strategies(&self.scoped(query).await))
    }

    async fn kpi_snapshot(&self, query: &AnalyticsQuery) -> Result<KpiSnapshot, StoreError> {
        Ok(analytics::kpi_snapshot(&self.scoped(query).await))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::domain::deal::{DealId, OrgId};
    use crate::domain::task::{NewTask, TaskStatus};
    use crate::store::{InMemoryTaskStore, TaskStore};

    fn new_task(title: &str) -> NewTask {
        NewTask {
            org_id: OrgId("org-1".to_string()),
            deal_id: DealId("deal-1".to_string()),
            title: title.to_string(),
            description: None,
            pipeline_step: 3,
        }
    }

    #[tokio::test]
    async fn conditional_create_skips_when_open_match_exists() {
        let store = InMemoryTaskStore::default();
        let deal_id = DealId("deal-1".to_string());

        let first = store
            .create_if_no_open_match(&deal_id, "[AUTO] Advance", new_task("[AUTO] Advance to X"))
            .await
            .expect("create");
        assert!(first.is_some());

        let second = store
            .create_if_no_open_match(&deal_id, "[AUTO] Advance", new_task("[AUTO] Advance to X"))
            .await
            .expect("create");
        assert!(second.is_none());

        store.update_status(&first.expect("task").id, TaskStatus::Done).await.expect("update");
        let third = store
            .create_if_no_open_match(&deal_id, "[AUTO] Advance", new_task("[AUTO] Advance to X"))
            .await
            .expect("create");
        assert!(third.is_some(), "closed matches do not block creation");
    }

    #[tokio::test]
    async fn concurrent_conditional_creates_produce_one_task() {
        let store = Arc::new(InMemoryTaskStore::default());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .create_if_no_open_match(
                        &DealId("deal-1".to_string()),
                        "[AUTOPILOT]",
                        new_task("[AUTOPILOT] Confirm strategy"),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("create");
        }

        let tasks = store.list_for_deal(&DealId("deal-1".to_string())).await.expect("list");
        assert_eq!(tasks.len(), 1);
    }
}
