use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::deal::DealStatus;
use crate::domain::task::{NewTask, TaskStatus, AUTO_TASK_MARKER};
use crate::store::{DealStore, TaskStore};

use super::bus::{AutomationHandler, HandlerError};
use super::events::DomainEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTransition {
    pub to: DealStatus,
    /// Pipeline step of the stage being left.
    pub pipeline_step: u8,
}

/// Next stage in the linear pipeline. `Intake` advances through triage instead, and terminal
/// stages have no successor.
pub fn get_next_transition(status: DealStatus) -> Option<PipelineTransition> {
    if matches!(status, DealStatus::Intake) || status.is_terminal() {
        return None;
    }
    let pipeline_step = status.pipeline_step()?;
    let to = DealStatus::PIPELINE.get(usize::from(pipeline_step))?;
    Some(PipelineTransition { to: *to, pipeline_step })
}

fn advance_marker(to: DealStatus) -> String {
    format!("{AUTO_TASK_MARKER} Advance to {}", to.as_str())
}

/// On `task.completed`, suggests advancing the deal once every task for its current stage
/// is done.
pub struct AdvancementHandler {
    deals: Arc<dyn DealStore>,
    tasks: Arc<dyn TaskStore>,
}

impl AdvancementHandler {
    pub fn new(deals: Arc<dyn DealStore>, tasks: Arc<dyn TaskStore>) -> Self {
        Self { deals, tasks }
    }
}

#[async_trait]
impl AutomationHandler for AdvancementHandler {
    fn name(&self) -> &'static str {
        "pipeline_advancement"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<Option<Value>, HandlerError> {
        let DomainEvent::TaskCompleted { deal_id, org_id, .. } = event else {
            return Ok(None);
        };
        let Some(deal) = self.deals.find(deal_id).await? else {
            return Ok(Some(json!({ "action": "skipped", "reason": "deal_not_found" })));
        };
        // EXIT_MARKETED -> EXITED waits on funds received, not on tasks.
        if matches!(
            deal.status,
            DealStatus::Intake | DealStatus::Killed | DealStatus::Exited | DealStatus::ExitMarketed
        ) {
            return Ok(Some(json!({ "action": "skipped", "reason": "stage_not_advanceable" })));
        }
        let Some(transition) = get_next_transition(deal.status) else {
            return Ok(Some(json!({ "action": "skipped", "reason": "no_transition" })));
        };

        let marker = advance_marker(transition.to);
        let stage_tasks: Vec<_> = self
            .tasks
            .list_for_step(deal_id, transition.pipeline_step)
            .await?
            .into_iter()
            .filter(|task| !task.title.starts_with(&marker))
            .collect();
        if stage_tasks.is_empty()
            || stage_tasks.iter().any(|task| task.status != TaskStatus::Done)
        {
            return Ok(Some(json!({ "action": "none", "reason": "stage_tasks_outstanding" })));
        }

        let created = self
            .tasks
            .create_if_no_open_match(
                deal_id,
                &marker,
                NewTask {
                    org_id: org_id.clone(),
                    deal_id: deal_id.clone(),
                    title: format!(
                        "{marker}: all {} {} tasks are complete",
                        stage_tasks.len(),
                        deal.status.as_str()
                    ),
                    description: Some(format!(
                        "Every task for {} is done. Review and move the deal to {}.",
                        deal.status.as_str(),
                        transition.to.as_str()
                    )),
                    pipeline_step: transition.pipeline_step,
                },
            )
            .await?;

        let action = if created.is_some() { "advancement_suggested" } else { "already_suggested" };
        Ok(Some(json!({ "action": action, "to": transition.to })))
    }
}

/// On `deal.statusChanged`, reminds the team to plan the new stage when it has no tasks.
pub struct StatusChangeReminderHandler {
    tasks: Arc<dyn TaskStore>,
}

impl StatusChangeReminderHandler {
    pub fn new(tasks: Arc<dyn TaskStore>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl AutomationHandler for StatusChangeReminderHandler {
    fn name(&self) -> &'static str {
        "status_change_reminder"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<Option<Value>, HandlerError> {
        let DomainEvent::DealStatusChanged { deal_id, to, org_id, .. } = event else {
            return Ok(None);
        };
        if *to == DealStatus::Killed || get_next_transition(*to).is_none() {
            return Ok(Some(json!({ "action": "none", "reason": "terminal_or_unplanned_stage" })));
        }
        let Some(pipeline_step) = to.pipeline_step() else {
            return Ok(Some(json!({ "action": "none", "reason": "terminal_or_unplanned_stage" })));
        };

        if !self.tasks.list_for_step(deal_id, pipeline_step).await?.is_empty() {
            return Ok(Some(json!({ "action": "none", "reason": "stage_has_tasks" })));
        }

        let marker = format!("{AUTO_TASK_MARKER} Create tasks for {} stage", to.as_str());
        let created = self
            .tasks
            .create_if_no_open_match(
                deal_id,
                &marker,
                NewTask {
                    org_id: org_id.clone(),
                    deal_id: deal_id.clone(),
                    title: marker.clone(),
                    description: Some(format!(
                        "The deal moved to {} and no tasks exist for this stage yet.",
                        to.as_str()
                    )),
                    pipeline_step,
                },
            )
            .await?;

        let action = if created.is_some() { "reminder_created" } else { "reminder_exists" };
        Ok(Some(json!({ "action": action })))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{get_next_transition, AdvancementHandler, PipelineTransition, StatusChangeReminderHandler};
    use crate::automation::bus::AutomationHandler;
    use crate::automation::events::DomainEvent;
    use crate::domain::deal::{Deal, DealId, DealStatus, OrgId};
    use crate::domain::task::{NewTask, TaskId, TaskStatus};
    use crate::store::{DealStore, InMemoryDealStore, InMemoryTaskStore, TaskStore};

    #[test]
    fn transitions_follow_the_linear_pipeline() {
        assert_eq!(get_next_transition(DealStatus::TriageDone).map(|t| t.to), Some(DealStatus::Preapp));
        assert_eq!(
            get_next_transition(DealStatus::Approved),
            Some(PipelineTransition { to: DealStatus::ExitMarketed, pipeline_step: 8 })
        );
        assert_eq!(
            get_next_transition(DealStatus::ExitMarketed).map(|t| t.to),
            Some(DealStatus::Exited)
        );
        assert_eq!(get_next_transition(DealStatus::Intake), None);
        assert_eq!(get_next_transition(DealStatus::Exited), None);
        assert_eq!(get_next_transition(DealStatus::Killed), None);
    }

    async fn seeded(status: DealStatus) -> (Arc<InMemoryDealStore>, Arc<InMemoryTaskStore>) {
        let deals = Arc::new(InMemoryDealStore::default());
        deals
            .save(Deal {
                id: DealId("deal-1".into()),
                org_id: OrgId("org-1".into()),
                name: "Plank Rd".into(),
                status,
                sku: Some("OUTDOOR_STORAGE".into()),
                jurisdiction_id: None,
            })
            .await
            .expect("save deal");
        (deals, Arc::new(InMemoryTaskStore::default()))
    }

    async fn add_task(tasks: &InMemoryTaskStore, step: u8, status: TaskStatus) -> TaskId {
        let task = tasks
            .create(NewTask {
                org_id: OrgId("org-1".into()),
                deal_id: DealId("deal-1".into()),
                title: "Pull zoning map".into(),
                description: None,
                pipeline_step: step,
            })
            .await
            .expect("create task");
        tasks.update_status(&task.id, status).await.expect("update");
        task.id
    }

    fn task_completed(task_id: TaskId) -> DomainEvent {
        DomainEvent::TaskCompleted {
            deal_id: DealId("deal-1".into()),
            task_id,
            org_id: OrgId("org-1".into()),
        }
    }

    #[tokio::test]
    async fn completed_stage_suggests_advancement_exactly_once() {
        let (deals, tasks) = seeded(DealStatus::Preapp).await;
        let first = add_task(&tasks, 3, TaskStatus::Done).await;
        add_task(&tasks, 3, TaskStatus::Done).await;
        let handler = AdvancementHandler::new(deals, tasks.clone());

        let output = handler.handle(&task_completed(first.clone())).await.expect("handle");
        assert_eq!(output.expect("output")["action"], "advancement_suggested");
        let output = handler.handle(&task_completed(first)).await.expect("handle");
        assert_eq!(output.expect("output")["action"], "already_suggested");

        let notices: Vec<_> = tasks
            .list_for_deal(&DealId("deal-1".into()))
            .await
            .expect("list")
            .into_iter()
            .filter(|task| task.title.starts_with("[AUTO] Advance to CONCEPT"))
            .collect();
        assert_eq!(notices.len(), 1);
    }

    #[tokio::test]
    async fn outstanding_tasks_block_advancement() {
        let (deals, tasks) = seeded(DealStatus::Concept).await;
        let done = add_task(&tasks, 4, TaskStatus::Done).await;
        add_task(&tasks, 4, TaskStatus::InProgress).await;
        let handler = AdvancementHandler::new(deals, tasks.clone());

        let output = handler.handle(&task_completed(done)).await.expect("handle");
        assert_eq!(output.expect("output")["action"], "none");
        assert_eq!(tasks.list_for_deal(&DealId("deal-1".into())).await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn exit_marketed_deals_never_auto_advance() {
        let (deals, tasks) = seeded(DealStatus::ExitMarketed).await;
        let done = add_task(&tasks, 9, TaskStatus::Done).await;
        let handler = AdvancementHandler::new(deals, tasks);

        let output = handler.handle(&task_completed(done)).await.expect("handle");
        assert_eq!(output.expect("output")["reason"], "stage_not_advanceable");
    }

    #[tokio::test]
    async fn reminder_created_only_for_empty_stage() {
        let (_, tasks) = seeded(DealStatus::Neighbors).await;
        let handler = StatusChangeReminderHandler::new(tasks.clone());
        let event = DomainEvent::DealStatusChanged {
            deal_id: DealId("deal-1".into()),
            from: DealStatus::Concept,
            to: DealStatus::Neighbors,
            org_id: OrgId("org-1".into()),
        };

        let output = handler.handle(&event).await.expect("handle");
        assert_eq!(output.expect("output")["action"], "reminder_created");
        let output = handler.handle(&event).await.expect("handle");
        assert_eq!(output.expect("output")["reason"], "stage_has_tasks");

        let killed = DomainEvent::DealStatusChanged {
            deal_id: DealId("deal-1".into()),
            from: DealStatus::Neighbors,
            to: DealStatus::Killed,
            org_id: OrgId("org-1".into()),
        };
        let output = handler.handle(&killed).await.expect("handle");
        assert_eq!(output.expect("output")["action"], "none");
    }
}
