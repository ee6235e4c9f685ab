use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::AutomationConfig;
use crate::domain::automation::{
    AutomationEvent, AutomationEventFinish, AutomationEventId, AutomationEventStatus,
};
use crate::domain::deal::DealId;
use crate::errors::StoreError;
use crate::store::AutomationEventStore;

use super::events::{DomainEvent, DomainEventType};
use super::ops::should_alert_on_failure;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait AutomationHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns output recorded on the automation event, or `None` when the event was not
    /// relevant.
    async fn handle(&self, event: &DomainEvent) -> Result<Option<Value>, HandlerError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerOutcome {
    pub handler_name: String,
    pub event_id: Option<AutomationEventId>,
    pub status: AutomationEventStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub event_type: DomainEventType,
    pub outcomes: Vec<HandlerOutcome>,
}

impl DispatchReport {
    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.status == AutomationEventStatus::Failed).count()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerHealthStatus {
    Healthy,
    Degraded,
    Failing,
    Inactive,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerHealth {
    pub handler_name: String,
    pub total_runs_7d: u32,
    pub success_count_7d: u32,
    pub failure_count_7d: u32,
    pub success_rate_7d: f64,
    pub avg_duration_ms: f64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub status: HandlerHealthStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationStats {
    pub total_today: u32,
    pub success_rate_today: f64,
    pub avg_duration_ms: f64,
    pub failures_today: u32,
}

/// Routes domain events to registered handlers and records one automation event per handler
/// invocation.
pub struct AutomationBus {
    events: Arc<dyn AutomationEventStore>,
    handlers: HashMap<DomainEventType, Vec<Arc<dyn AutomationHandler>>>,
    health_window: Duration,
    alert_threshold: u32,
    failure_streaks: Mutex<HashMap<&'static str, u32>>,
}

impl AutomationBus {
    pub fn new(events: Arc<dyn AutomationEventStore>, config: &AutomationConfig) -> Self {
        Self {
            events,
            handlers: HashMap::new(),
            health_window: Duration::days(config.health_window_days),
            alert_threshold: config.alert_failure_threshold,
            failure_streaks: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&mut self, event_type: DomainEventType, handler: Arc<dyn AutomationHandler>) {
        self.handlers.entry(event_type).or_default().push(handler);
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> =
            self.handlers.values().flatten().map(|handler| handler.name()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub async fn start_event(
        &self,
        handler_name: &str,
        event_type: &str,
        deal_id: Option<&DealId>,
        input_data: Option<Value>,
    ) -> Result<AutomationEventId, StoreError> {
        let event = AutomationEvent {
            id: AutomationEventId::generate(),
            deal_id: deal_id.cloned(),
            handler_name: handler_name.to_string(),
            event_type: event_type.to_string(),
            status: AutomationEventStatus::Running,
            input_data,
            output_data: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        };
        let id = event.id.clone();
        self.events.insert(event).await?;
        Ok(id)
    }

    pub async fn complete_event(
        &self,
        id: &AutomationEventId,
        output_data: Option<Value>,
    ) -> Result<(), StoreError> {
        self.finish_event(id, AutomationEventStatus::Completed, output_data, None).await
    }

    pub async fn fail_event(
        &self,
        id: &AutomationEventId,
        error: impl std::fmt::Display,
    ) -> Result<(), StoreError> {
        self.finish_event(id, AutomationEventStatus::Failed, None, Some(error.to_string())).await
    }

    async fn finish_event(
        &self,
        id: &AutomationEventId,
        status: AutomationEventStatus,
        output_data: Option<Value>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let started = self
            .events
            .find(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("automation event {}", id.0)))?;
        let completed_at = Utc::now();
        let duration_ms = (completed_at - started.started_at).num_milliseconds().max(0);

        self.events
            .finish(id, AutomationEventFinish { status, output_data, error, completed_at, duration_ms })
            .await
    }

    /// Runs every handler registered for the event's type. A failing handler is recorded and
    /// does not stop the others.
    pub async fn dispatch(&self, event: &DomainEvent) -> DispatchReport {
        let event_type = event.event_type();
        let handlers = self.handlers.get(&event_type).cloned().unwrap_or_default();
        let mut outcomes = Vec::with_capacity(handlers.len());

        for handler in handlers {
            outcomes.push(self.run_handler(handler.as_ref(), event).await);
        }

        DispatchReport { event_type, outcomes }
    }

    async fn run_handler(&self, handler: &dyn AutomationHandler, event: &DomainEvent) -> HandlerOutcome {
        let handler_name = handler.name();
        let event_type = event.event_type().as_str();
        let deal_id = event.deal_id();

        let event_id = match self
            .start_event(handler_name, event_type, Some(deal_id), Some(event.to_payload()))
            .await
        {
            Ok(id) => Some(id),
            Err(error) => {
                tracing::warn!(
                    event_name = "automation.event.start_failed",
                    handler = handler_name,
                    error = %error,
                    "could not record automation event start"
                );
                None
            }
        };
        tracing::info!(
            event_name = "automation.handler.started",
            handler = handler_name,
            event_type,
            deal_id = %deal_id.0,
            "automation handler started"
        );

        let (status, output, error) = match handler.handle(event).await {
            Ok(output) => {
                if let Some(id) = &event_id {
                    if let Err(store_error) = self.complete_event(id, output.clone()).await {
                        tracing::warn!(handler = handler_name, error = %store_error, "could not record completion");
                    }
                }
                tracing::info!(
                    event_name = "automation.handler.completed",
                    handler = handler_name,
                    event_type,
                    deal_id = %deal_id.0,
                    "automation handler completed"
                );
                self.reset_streak(handler_name).await;
                (AutomationEventStatus::Completed, output, None)
            }
            Err(handler_error) => {
                let message = handler_error.to_string();
                if let Some(id) = &event_id {
                    if let Err(store_error) = self.fail_event(id, &message).await {
                        tracing::warn!(handler = handler_name, error = %store_error, "could not record failure");
                    }
                }
                tracing::error!(
                    event_name = "automation.handler.failed",
                    handler = handler_name,
                    event_type,
                    deal_id = %deal_id.0,
                    error = %message,
                    "automation handler failed"
                );
                self.record_failure(handler_name).await;
                (AutomationEventStatus::Failed, None, Some(message))
            }
        };

        HandlerOutcome { handler_name: handler_name.to_string(), event_id, status, output, error }
    }

    async fn reset_streak(&self, handler_name: &'static str) {
        self.failure_streaks.lock().await.remove(handler_name);
    }

    async fn record_failure(&self, handler_name: &'static str) {
        let mut streaks = self.failure_streaks.lock().await;
        let streak = streaks.entry(handler_name).or_insert(0);
        *streak += 1;
        if should_alert_on_failure(*streak, self.alert_threshold) {
            tracing::error!(
                event_name = "automation.handler.alert",
                handler = handler_name,
                consecutive_failures = *streak,
                "automation handler is failing repeatedly"
            );
        }
    }

    /// Per-handler health over the configured window, including registered handlers that
    /// have not run.
    pub async fn handler_health(&self) -> Result<Vec<HandlerHealth>, StoreError> {
        let events = self.events.list_since(Utc::now() - self.health_window).await?;

        let mut grouped: BTreeMap<String, Vec<&AutomationEvent>> = self
            .handler_names()
            .into_iter()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();
        for event in &events {
            grouped.entry(event.handler_name.clone()).or_default().push(event);
        }

        Ok(grouped.into_iter().map(|(name, events)| summarize_handler(name, &events)).collect())
    }

    /// Totals since midnight UTC.
    pub async fn automation_stats(&self) -> Result<AutomationStats, StoreError> {
        let now = Utc::now();
        let midnight = now.date_naive().and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()).unwrap_or(now);
        // Failures finished today may have started yesterday.
        let events = self.events.list_since(midnight - Duration::days(1)).await?;

        let today: Vec<&AutomationEvent> =
            events.iter().filter(|event| event.started_at >= midnight).collect();
        let successes = today.iter().filter(|event| event.status == AutomationEventStatus::Completed).count();
        let failures_today = events
            .iter()
            .filter(|event| event.status == AutomationEventStatus::Failed)
            .filter(|event| event.completed_at.map(|at| at >= midnight).unwrap_or(false))
            .count();

        Ok(AutomationStats {
            total_today: today.len() as u32,
            success_rate_today: success_rate(successes, today.len()),
            avg_duration_ms: average_duration(&today),
            failures_today: failures_today as u32,
        })
    }
}

fn summarize_handler(handler_name: String, events: &[&AutomationEvent]) -> HandlerHealth {
    let total = events.len();
    let successes = events.iter().filter(|event| event.status == AutomationEventStatus::Completed).count();
    let failures = events.iter().filter(|event| event.status == AutomationEventStatus::Failed).count();
    let success_rate_7d = success_rate(successes, successes + failures);

    let status = if total == 0 {
        HandlerHealthStatus::Inactive
    } else if success_rate_7d >= 90.0 {
        HandlerHealthStatus::Healthy
    } else if success_rate_7d >= 60.0 {
        HandlerHealthStatus::Degraded
    } else {
        HandlerHealthStatus::Failing
    };

    HandlerHealth {
        handler_name,
        total_runs_7d: total as u32,
        success_count_7d: successes as u32,
        failure_count_7d: failures as u32,
        success_rate_7d,
        avg_duration_ms: average_duration(events),
        last_run_at: events.iter().map(|event| event.started_at).max(),
        status,
    }
}

/// Percentage rounded to one decimal; 100 when nothing finished.
fn success_rate(successes: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    ((successes as f64 / total as f64) * 1_000.0).round() / 10.0
}

fn average_duration(events: &[&AutomationEvent]) -> f64 {
    let durations: Vec<i64> = events.iter().filter_map(|event| event.duration_ms).collect();
    if durations.is_empty() {
        return 0.0;
    }
    (durations.iter().sum::<i64>() as f64 / durations.len() as f64).round()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{AutomationBus, AutomationHandler, HandlerError, HandlerHealthStatus};
    use crate::automation::events::{DomainEvent, DomainEventType};
    use crate::config::AutomationConfig;
    use crate::domain::automation::{AutomationEventId, AutomationEventStatus};
    use crate::domain::deal::{DealId, OrgId};
    use crate::domain::task::TaskId;
    use crate::errors::StoreError;
    use crate::store::{AutomationEventStore, InMemoryAutomationEventStore};

    struct Succeeds;

    #[async_trait]
    impl AutomationHandler for Succeeds {
        fn name(&self) -> &'static str {
            "succeeds"
        }

        async fn handle(&self, _event: &DomainEvent) -> Result<Option<Value>, HandlerError> {
            Ok(Some(json!({ "ok": true })))
        }
    }

    struct Fails;

    #[async_trait]
    impl AutomationHandler for Fails {
        fn name(&self) -> &'static str {
            "fails"
        }

        async fn handle(&self, _event: &DomainEvent) -> Result<Option<Value>, HandlerError> {
            Err(HandlerError::Failed("parcel lookup exploded".to_string()))
        }
    }

    struct Idle;

    #[async_trait]
    impl AutomationHandler for Idle {
        fn name(&self) -> &'static str {
            "idle"
        }

        async fn handle(&self, _event: &DomainEvent) -> Result<Option<Value>, HandlerError> {
            Ok(None)
        }
    }

    fn task_completed() -> DomainEvent {
        DomainEvent::TaskCompleted {
            deal_id: DealId("deal-1".into()),
            task_id: TaskId("task-1".into()),
            org_id: OrgId("org-1".into()),
        }
    }

    fn bus(store: Arc<InMemoryAutomationEventStore>) -> AutomationBus {
        let mut bus = AutomationBus::new(store, &AutomationConfig::default());
        bus.register(DomainEventType::TaskCompleted, Arc::new(Fails));
        bus.register(DomainEventType::TaskCompleted, Arc::new(Succeeds));
        bus.register(DomainEventType::UploadCreated, Arc::new(Idle));
        bus
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_siblings() {
        let store = Arc::new(InMemoryAutomationEventStore::default());
        let bus = bus(store.clone());

        let report = bus.dispatch(&task_completed()).await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.failure_count(), 1);
        let succeeded = report
            .outcomes
            .iter()
            .find(|outcome| outcome.handler_name == "succeeds")
            .expect("succeeds outcome");
        assert_eq!(succeeded.status, AutomationEventStatus::Completed);

        let failed = report.outcomes.iter().find(|outcome| outcome.handler_name == "fails").expect("fails");
        let recorded = store
            .find(failed.event_id.as_ref().expect("event id"))
            .await
            .expect("find")
            .expect("recorded event");
        assert_eq!(recorded.status, AutomationEventStatus::Failed);
        assert_eq!(recorded.error.as_deref(), Some("parcel lookup exploded"));
        assert!(recorded.duration_ms.is_some());
        assert_eq!(recorded.deal_id, Some(DealId("deal-1".into())));
    }

    #[tokio::test]
    async fn events_without_handlers_produce_empty_report() {
        let bus = bus(Arc::new(InMemoryAutomationEventStore::default()));
        let report = bus
            .dispatch(&DomainEvent::ParcelCreated {
                deal_id: DealId("deal-1".into()),
                parcel_id: "p-1".into(),
                org_id: OrgId("org-1".into()),
            })
            .await;
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn completing_unknown_event_is_not_found() {
        let bus = bus(Arc::new(InMemoryAutomationEventStore::default()));
        let result = bus.complete_event(&AutomationEventId("missing".into()), None).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn health_includes_inactive_handlers_and_grades_failures() {
        let store = Arc::new(InMemoryAutomationEventStore::default());
        let bus = bus(store);
        bus.dispatch(&task_completed()).await;
        bus.dispatch(&task_completed()).await;

        let health = bus.handler_health().await.expect("health");
        let by_name = |name: &str| health.iter().find(|entry| entry.handler_name == name).cloned();

        let idle = by_name("idle").expect("idle handler listed");
        assert_eq!(idle.status, HandlerHealthStatus::Inactive);
        assert_eq!(idle.success_rate_7d, 100.0);

        let fails = by_name("fails").expect("fails handler");
        assert_eq!(fails.total_runs_7d, 2);
        assert_eq!(fails.failure_count_7d, 2);
        assert_eq!(fails.status, HandlerHealthStatus::Failing);

        let succeeds = by_name("succeeds").expect("succeeds handler");
        assert_eq!(succeeds.status, HandlerHealthStatus::Healthy);
        assert!(succeeds.last_run_at.is_some());
    }

    #[tokio::test]
    async fn stats_default_to_full_success_when_idle() {
        let store = Arc::new(InMemoryAutomationEventStore::default());
        let bus = bus(store);

        let idle = bus.automation_stats().await.expect("stats");
        assert_eq!(idle.total_today, 0);
        assert_eq!(idle.success_rate_today, 100.0);

        bus.dispatch(&task_completed()).await;
        let stats = bus.automation_stats().await.expect("stats");
        assert_eq!(stats.total_today, 2);
        assert_eq!(stats.success_rate_today, 50.0);
        assert_eq!(stats.failures_today, 1);
    }
}
