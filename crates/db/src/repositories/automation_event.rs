use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row};

use entops_core::domain::automation::{
    AutomationEvent, AutomationEventFinish, AutomationEventId, AutomationEventStatus,
};
use entops_core::domain::deal::DealId;
use entops_core::errors::StoreError;
use entops_core::store::AutomationEventStore;

use super::{
    decode_enum, encode_timestamp, parse_optional_timestamp, parse_timestamp, RepositoryError,
};
use crate::DbPool;

const EVENT_COLUMNS: &str = "id, deal_id, handler_name, event_type, status, input_data, \
                             output_data, error, started_at, completed_at, duration_ms";

pub struct SqlAutomationEventRepository {
    pool: DbPool,
}

impl SqlAutomationEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AutomationEventStore for SqlAutomationEventRepository {
    async fn insert(&self, event: AutomationEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO automation_events (
                id, deal_id, handler_name, event_type, status, input_data,
                output_data, error, started_at, completed_at, duration_ms
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id.0)
        .bind(event.deal_id.as_ref().map(|deal_id| deal_id.0.as_str()))
        .bind(&event.handler_name)
        .bind(&event.event_type)
        .bind(event.status.as_str())
        .bind(encode_json(event.input_data.as_ref())?)
        .bind(encode_json(event.output_data.as_ref())?)
        .bind(event.error.as_deref())
        .bind(encode_timestamp(event.started_at))
        .bind(event.completed_at.map(encode_timestamp))
        .bind(event.duration_ms)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn find(&self, id: &AutomationEventId) -> Result<Option<AutomationEvent>, StoreError> {
        let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM automation_events WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.map(event_from_row).transpose()?)
    }

    async fn finish(
        &self,
        id: &AutomationEventId,
        finish: AutomationEventFinish,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE automation_events
             SET status = ?, output_data = ?, error = ?, completed_at = ?, duration_ms = ?
             WHERE id = ?",
        )
        .bind(finish.status.as_str())
        .bind(encode_json(finish.output_data.as_ref())?)
        .bind(finish.error.as_deref())
        .bind(encode_timestamp(finish.completed_at))
        .bind(finish.duration_ms)
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("automation event {}", id.0)));
        }
        Ok(())
    }

    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<AutomationEvent>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS}
             FROM automation_events
             WHERE started_at >= ?
             ORDER BY started_at ASC"
        ))
        .bind(encode_timestamp(since))
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.into_iter().map(event_from_row).collect::<Result<Vec<_>, _>>()?)
    }
}

fn encode_json(value: Option<&Value>) -> Result<Option<String>, StoreError> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|error| StoreError::Decode(format!("json encode failed: {error}")))
}

fn decode_json(column: &str, value: Option<String>) -> Result<Option<Value>, RepositoryError> {
    value
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("invalid json in `{column}`: {error}")))
}

fn event_from_row(row: SqliteRow) -> Result<AutomationEvent, RepositoryError> {
    Ok(AutomationEvent {
        id: AutomationEventId(row.try_get("id")?),
        deal_id: row.try_get::<Option<String>, _>("deal_id")?.map(DealId),
        handler_name: row.try_get("handler_name")?,
        event_type: row.try_get("event_type")?,
        status: decode_enum("status", row.try_get("status")?, AutomationEventStatus::parse)?,
        input_data: decode_json("input_data", row.try_get("input_data")?)?,
        output_data: decode_json("output_data", row.try_get("output_data")?)?,
        error: row.try_get("error")?,
        started_at: parse_timestamp("started_at", row.try_get("started_at")?)?,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
        duration_ms: row.try_get("duration_ms")?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use serde_json::json;

    use entops_core::automation::{AutomationBus, AutomationHandler, DomainEvent, DomainEventType, HandlerError};
    use entops_core::config::AutomationConfig;
    use entops_core::domain::automation::{
        AutomationEvent, AutomationEventFinish, AutomationEventId, AutomationEventStatus,
    };
    use entops_core::domain::deal::{DealId, OrgId};
    use entops_core::errors::StoreError;
    use entops_core::store::AutomationEventStore;

    use super::SqlAutomationEventRepository;
    use crate::repositories::test_support::{parse_ts, setup_pool};

    #[tokio::test]
    async fn finish_updates_running_row_once() {
        let pool = setup_pool().await;
        let repo = SqlAutomationEventRepository::new(pool.clone());
        let started_at = parse_ts("2026-03-02T09:00:00Z");
        let event = AutomationEvent {
            id: AutomationEventId("evt-1".to_string()),
            deal_id: Some(DealId("deal-1".to_string())),
            handler_name: "document_classification".to_string(),
            event_type: "upload.created".to_string(),
            status: AutomationEventStatus::Running,
            input_data: Some(json!({"uploadId": "upload-1"})),
            output_data: None,
            error: None,
            started_at,
            completed_at: None,
            duration_ms: None,
        };
        repo.insert(event.clone()).await.expect("insert");

        repo.finish(
            &event.id,
            AutomationEventFinish {
                status: AutomationEventStatus::Completed,
                output_data: Some(json!({"action": "reclassified"})),
                error: None,
                completed_at: started_at + Duration::milliseconds(42),
                duration_ms: 42,
            },
        )
        .await
        .expect("finish");

        let stored = repo.find(&event.id).await.expect("find").expect("event exists");
        assert_eq!(stored.status, AutomationEventStatus::Completed);
        assert_eq!(stored.duration_ms, Some(42));
        assert_eq!(stored.output_data, Some(json!({"action": "reclassified"})));
        assert_eq!(stored.input_data, event.input_data);

        let since = repo.list_since(started_at - Duration::hours(1)).await.expect("list");
        assert_eq!(since.len(), 1);
        assert!(repo.list_since(started_at + Duration::hours(1)).await.expect("list").is_empty());
        pool.close().await;
    }

    #[tokio::test]
    async fn finishing_unknown_event_is_not_found() {
        let pool = setup_pool().await;
        let repo = SqlAutomationEventRepository::new(pool.clone());
        let error = repo
            .finish(
                &AutomationEventId("missing".to_string()),
                AutomationEventFinish {
                    status: AutomationEventStatus::Failed,
                    output_data: None,
                    error: Some("boom".to_string()),
                    completed_at: parse_ts("2026-03-02T09:00:00Z"),
                    duration_ms: 1,
                },
            )
            .await
            .expect_err("unknown event");
        assert!(matches!(error, StoreError::NotFound(_)));
        pool.close().await;
    }

    struct AlwaysFails;

    #[async_trait::async_trait]
    impl AutomationHandler for AlwaysFails {
        fn name(&self) -> &'static str {
            "always_fails"
        }

        async fn handle(
            &self,
            _event: &DomainEvent,
        ) -> Result<Option<serde_json::Value>, HandlerError> {
            Err(HandlerError::Failed("collaborator unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn bus_records_failures_through_sql_store() {
        let pool = setup_pool().await;
        let repo = Arc::new(SqlAutomationEventRepository::new(pool.clone()));
        let mut bus = AutomationBus::new(repo.clone(), &AutomationConfig::default());
        bus.register(DomainEventType::ParcelCreated, Arc::new(AlwaysFails));

        let report = bus
            .dispatch(&DomainEvent::ParcelCreated {
                deal_id: DealId("deal-1".to_string()),
                parcel_id: "parcel-1".to_string(),
                org_id: OrgId("org-1".to_string()),
            })
            .await;
        assert_eq!(report.failure_count(), 1);

        let stats = bus.automation_stats().await.expect("stats");
        assert_eq!(stats.total_today, 1);
        assert_eq!(stats.failures_today, 1);
        pool.close().await;
    }
}
