pub mod advancement;
pub mod bus;
pub mod documents;
pub mod events;
pub mod ops;

use std::sync::Arc;

use crate::config::AutomationConfig;
use crate::store::{AutomationEventStore, DealStore, TaskStore, UploadStore};

pub use advancement::{
    get_next_transition, AdvancementHandler, PipelineTransition, StatusChangeReminderHandler,
};
pub use bus::{
    AutomationBus, AutomationHandler, AutomationStats, DispatchReport, HandlerError,
    HandlerHealth, HandlerHealthStatus, HandlerOutcome,
};
pub use documents::{classify_document, DocumentClassification, DocumentClassificationHandler};
pub use events::{DomainEvent, DomainEventType};
pub use ops::{
    evaluate_health, is_migration_safe, should_alert_on_failure, ConfigHealth,
    CriticalSettings, MigrationSafety, OpsHealthStatus,
};

/// Bus with the standard handler wiring.
pub fn standard_bus(
    events: Arc<dyn AutomationEventStore>,
    deals: Arc<dyn DealStore>,
    tasks: Arc<dyn TaskStore>,
    uploads: Arc<dyn UploadStore>,
    config: &AutomationConfig,
) -> AutomationBus {
    let mut bus = AutomationBus::new(events, config);
    bus.register(
        DomainEventType::TaskCompleted,
        Arc::new(AdvancementHandler::new(deals.clone(), tasks.clone())),
    );
    bus.register(
        DomainEventType::DealStatusChanged,
        Arc::new(StatusChangeReminderHandler::new(tasks.clone())),
    );
    bus.register(
        DomainEventType::UploadCreated,
        Arc::new(DocumentClassificationHandler::new(
            uploads,
            deals,
            tasks,
            config.reclassify_min_confidence,
        )),
    );
    bus
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{standard_bus, DomainEvent};
    use crate::config::AutomationConfig;
    use crate::domain::automation::AutomationEventStatus;
    use crate::domain::deal::{Deal, DealId, DealStatus, OrgId};
    use crate::domain::task::TaskStatus;
    use crate::store::{
        DealStore, InMemoryAutomationEventStore, InMemoryDealStore, InMemoryTaskStore,
        InMemoryUploadStore, TaskStore,
    };

    #[tokio::test]
    async fn status_change_flows_through_standard_wiring() {
        let events = Arc::new(InMemoryAutomationEventStore::default());
        let deals = Arc::new(InMemoryDealStore::default());
        let tasks = Arc::new(InMemoryTaskStore::default());
        deals
            .save(Deal {
                id: DealId("deal-1".into()),
                org_id: OrgId("org-1".into()),
                name: "Hwy 190".into(),
                status: DealStatus::Submitted,
                sku: None,
                jurisdiction_id: Some("ebr".into()),
            })
            .await
            .expect("save deal");
        let bus = standard_bus(
            events,
            deals,
            tasks.clone(),
            Arc::new(InMemoryUploadStore::default()),
            &AutomationConfig::default(),
        );

        let report = bus
            .dispatch(&DomainEvent::DealStatusChanged {
                deal_id: DealId("deal-1".into()),
                from: DealStatus::Neighbors,
                to: DealStatus::Submitted,
                org_id: OrgId("org-1".into()),
            })
            .await;
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].status, AutomationEventStatus::Completed);

        let created = tasks.list_for_step(&DealId("deal-1".into()), 6).await.expect("list");
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].status, TaskStatus::Todo);
        assert_eq!(bus.handler_names().len(), 3);
    }
}
