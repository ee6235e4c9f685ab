//! Entitlement strategy autopilot: KPI guardrails over ranked strategy predictions, with
//! optional follow-up task materialization and a bulk sweep.

pub mod analytics;
pub mod ranking;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AutopilotConfig;
use crate::domain::deal::{Deal, DealId, DealStatus, OrgId};
use crate::domain::strategy::{AnalyticsQuery, KpiSnapshot};
use crate::domain::task::{NewTask, Task, AUTOPILOT_TASK_MARKER};
use crate::errors::ApplicationError;
use crate::retry::{with_timeout_and_retry, RetryPolicy};
use crate::store::{DealStore, EntitlementAnalytics, TaskStore};

pub use ranking::{rank_candidates, StrategyRecommendationCandidate};

const MAX_ALTERNATIVES: usize = 5;
const TARGET_STAGES: [DealStatus; 2] = [DealStatus::Preapp, DealStatus::Concept];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Recommended,
    Hold,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Recommended,
    InsufficientKpiSamples,
    KpiDriftDetected,
    NoPredictions,
    LowStrategyConfidence,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotGuardrails {
    pub kpi_eligible: bool,
    pub mae_within_threshold: bool,
    pub calibration_within_threshold: bool,
    pub prediction_exists: bool,
    pub top_candidate_eligible: bool,
}

impl AutopilotGuardrails {
    /// First failing guardrail in evaluation order.
    pub fn reason_code(&self) -> ReasonCode {
        if !self.kpi_eligible {
            ReasonCode::InsufficientKpiSamples
        } else if !self.mae_within_threshold || !self.calibration_within_threshold {
            ReasonCode::KpiDriftDetected
        } else if !self.prediction_exists {
            ReasonCode::NoPredictions
        } else if !self.top_candidate_eligible {
            ReasonCode::LowStrategyConfidence
        } else {
            ReasonCode::Recommended
        }
    }
}

pub fn evaluate_guardrails(
    kpi: &KpiSnapshot,
    candidates: &[StrategyRecommendationCandidate],
    config: &AutopilotConfig,
) -> AutopilotGuardrails {
    AutopilotGuardrails {
        kpi_eligible: kpi.sample_size >= config.min_kpi_sample_size
            && kpi.matched_prediction_count >= config.min_matched_predictions,
        mae_within_threshold: kpi
            .median_timeline_absolute_error_days
            .map(|mae| mae <= config.max_median_timeline_mae_days)
            .unwrap_or(true),
        calibration_within_threshold: kpi
            .approval_calibration_gap
            .map(|gap| gap.abs() <= config.max_approval_calibration_gap)
            .unwrap_or(true),
        prediction_exists: !candidates.is_empty(),
        top_candidate_eligible: candidates
            .first()
            .map(|top| {
                top.probability_approval >= config.min_probability_approval
                    && top.sample_size >= config.min_strategy_sample_size
            })
            .unwrap_or(false),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementStrategyAutopilotRecommendation {
    pub deal_id: DealId,
    pub status: RecommendationStatus,
    pub reason_code: ReasonCode,
    pub guardrails: AutopilotGuardrails,
    pub kpi: KpiSnapshot,
    pub recommendation: Option<StrategyRecommendationCandidate>,
    pub alternatives: Vec<StrategyRecommendationCandidate>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationInput {
    pub org_id: OrgId,
    pub deal_id: DealId,
    #[serde(default)]
    pub jurisdiction_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotRunInput {
    #[serde(flatten)]
    pub recommendation: RecommendationInput,
    #[serde(default = "default_true")]
    pub materialize_tasks: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializationSkip {
    RecommendationNotActionable,
    DealStageNotTargeted,
    OpenAutopilotTasksExist,
    MaterializationDisabled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotRunResult {
    pub recommendation: EntitlementStrategyAutopilotRecommendation,
    pub created_tasks: Vec<Task>,
    pub skipped_reason: Option<MaterializationSkip>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepInput {
    #[serde(default)]
    pub org_id: Option<OrgId>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub statuses: Option<Vec<DealStatus>>,
    #[serde(default)]
    pub materialize_tasks: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepDealResult {
    pub deal_id: DealId,
    pub status: RecommendationStatus,
    pub reason_code: ReasonCode,
    pub tasks_created: u32,
    pub skipped_reason: Option<MaterializationSkip>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepError {
    pub deal_id: DealId,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResult {
    pub deals_scanned: u32,
    pub recommended_count: u32,
    pub tasks_created: u32,
    pub results: Vec<SweepDealResult>,
    pub errors: Vec<SweepError>,
}

pub struct EntitlementStrategyAutopilot {
    deals: Arc<dyn DealStore>,
    tasks: Arc<dyn TaskStore>,
    analytics: Arc<dyn EntitlementAnalytics>,
    config: AutopilotConfig,
}

impl EntitlementStrategyAutopilot {
    pub fn new(
        deals: Arc<dyn DealStore>,
        tasks: Arc<dyn TaskStore>,
        analytics: Arc<dyn EntitlementAnalytics>,
        config: AutopilotConfig,
    ) -> Self {
        Self { deals, tasks, analytics, config }
    }

    pub async fn recommend(
        &self,
        input: &RecommendationInput,
    ) -> Result<EntitlementStrategyAutopilotRecommendation, ApplicationError> {
        self.recommend_for_deal(input).await.map(|(_, recommendation)| recommendation)
    }

    async fn recommend_for_deal(
        &self,
        input: &RecommendationInput,
    ) -> Result<(Deal, EntitlementStrategyAutopilotRecommendation), ApplicationError> {
        let deal = self
            .deals
            .find_scoped(&input.deal_id, &input.org_id, input.jurisdiction_id.as_deref())
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("deal {}", input.deal_id.0)))?;

        let query = AnalyticsQuery {
            org_id: input.org_id.clone(),
            jurisdiction_id: input.jurisdiction_id.clone().or_else(|| deal.jurisdiction_id.clone()),
            sku: deal.sku.clone(),
            lookback_months: self.config.lookback_months,
            record_limit: self.config.record_limit,
        };
        let policy = RetryPolicy::new(
            Duration::from_secs(self.config.collaborator_timeout_secs),
            self.config.collaborator_retries,
        );

        let predictions = with_timeout_and_retry(policy, || {
            let analytics = self.analytics.clone();
            let query = query.clone();
            async move { analytics.strategy_predictions(&query).await }
        })
        .await
        .map_err(|error| ApplicationError::Integration(format!("strategy predictions: {error}")))?;

        let kpi = with_timeout_and_retry(policy, || {
            let analytics = self.analytics.clone();
            let query = query.clone();
            async move { analytics.kpi_snapshot(&query).await }
        })
        .await
        .map_err(|error| ApplicationError::Integration(format!("kpi snapshot: {error}")))?;

        let candidates =
            rank_candidates(&predictions, self.config.approval_weight, self.config.speed_weight);
        let guardrails = evaluate_guardrails(&kpi, &candidates, &self.config);
        let reason_code = guardrails.reason_code();
        let status = if reason_code == ReasonCode::Recommended {
            RecommendationStatus::Recommended
        } else {
            RecommendationStatus::Hold
        };

        let mut remaining = candidates.into_iter();
        let recommendation = match status {
            RecommendationStatus::Recommended => remaining.next(),
            RecommendationStatus::Hold => None,
        };
        let alternatives: Vec<_> = remaining.take(MAX_ALTERNATIVES).collect();

        let recommendation = EntitlementStrategyAutopilotRecommendation {
            deal_id: deal.id.clone(),
            status,
            reason_code,
            guardrails,
            kpi,
            recommendation,
            alternatives,
            generated_at: Utc::now(),
        };
        Ok((deal, recommendation))
    }

    pub async fn run(&self, input: &AutopilotRunInput) -> Result<AutopilotRunResult, ApplicationError> {
        let (deal, recommendation) = self.recommend_for_deal(&input.recommendation).await?;

        let skip = if !input.materialize_tasks {
            Some(MaterializationSkip::MaterializationDisabled)
        } else if recommendation.status != RecommendationStatus::Recommended {
            Some(MaterializationSkip::RecommendationNotActionable)
        } else if !TARGET_STAGES.contains(&deal.status) {
            Some(MaterializationSkip::DealStageNotTargeted)
        } else {
            None
        };
        if let Some(skipped_reason) = skip {
            return Ok(AutopilotRunResult {
                recommendation,
                created_tasks: Vec::new(),
                skipped_reason: Some(skipped_reason),
            });
        }

        let Some(top) = recommendation.recommendation.clone() else {
            return Ok(AutopilotRunResult {
                recommendation,
                created_tasks: Vec::new(),
                skipped_reason: Some(MaterializationSkip::RecommendationNotActionable),
            });
        };
        let created_tasks = self.materialize(&deal, &top).await?;
        let skipped_reason =
            created_tasks.is_empty().then_some(MaterializationSkip::OpenAutopilotTasksExist);

        Ok(AutopilotRunResult { recommendation, created_tasks, skipped_reason })
    }

    /// Creates the confirmation and checklist tasks unless an open autopilot task already
    /// exists for the deal.
    async fn materialize(
        &self,
        deal: &Deal,
        top: &StrategyRecommendationCandidate,
    ) -> Result<Vec<Task>, ApplicationError> {
        let pipeline_step = deal.status.pipeline_step().unwrap_or(0);
        let confirmation = NewTask {
            org_id: deal.org_id.clone(),
            deal_id: deal.id.clone(),
            title: format!("{AUTOPILOT_TASK_MARKER} Confirm entitlement strategy: {}", top.strategy_label),
            description: Some(format!(
                "Recommended {} with {:.0}% approval probability ({:.0}-{:.0}%) and a median of {:.0} days across {} comparable outcomes.",
                top.strategy_label,
                top.probability_approval * 100.0,
                top.probability_low * 100.0,
                top.probability_high * 100.0,
                top.expected_days_p50,
                top.sample_size,
            )),
            pipeline_step,
        };

        let Some(first) = self
            .tasks
            .create_if_no_open_match(&deal.id, AUTOPILOT_TASK_MARKER, confirmation)
            .await?
        else {
            return Ok(Vec::new());
        };

        let checklist = self
            .tasks
            .create(NewTask {
                org_id: deal.org_id.clone(),
                deal_id: deal.id.clone(),
                title: format!("{AUTOPILOT_TASK_MARKER} Execution checklist: {}", top.strategy_label),
                description: Some(
                    "Assemble the application package, schedule the pre-application meeting and \
                     line up neighbor outreach for the confirmed strategy."
                        .to_string(),
                ),
                pipeline_step,
            })
            .await?;

        Ok(vec![first, checklist])
    }

    /// Runs the autopilot across deals in the target stages. A failing deal is reported in
    /// `errors` and does not stop the sweep.
    pub async fn sweep(&self, input: &SweepInput) -> Result<SweepResult, ApplicationError> {
        let statuses = input.statuses.clone().unwrap_or_else(|| self.config.sweep_statuses.clone());
        let limit = input.limit.unwrap_or(self.config.sweep_limit).min(self.config.sweep_limit);
        let deals = self.deals.list_by_status(input.org_id.as_ref(), &statuses, limit).await?;

        let mut result = SweepResult::default();
        for deal in deals {
            result.deals_scanned += 1;
            let run_input = AutopilotRunInput {
                recommendation: RecommendationInput {
                    org_id: deal.org_id.clone(),
                    deal_id: deal.id.clone(),
                    jurisdiction_id: None,
                },
                materialize_tasks: input.materialize_tasks.unwrap_or(true),
            };

            match self.run(&run_input).await {
                Ok(run) => {
                    if run.recommendation.status == RecommendationStatus::Recommended {
                        result.recommended_count += 1;
                    }
                    result.tasks_created += run.created_tasks.len() as u32;
                    result.results.push(SweepDealResult {
                        deal_id: deal.id,
                        status: run.recommendation.status,
                        reason_code: run.recommendation.reason_code,
                        tasks_created: run.created_tasks.len() as u32,
                        skipped_reason: run.skipped_reason,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        event_name = "autopilot.sweep.deal_failed",
                        deal_id = %deal.id.0,
                        error = %error,
                        "autopilot sweep failed for deal"
                    );
                    result.errors.push(SweepError { deal_id: deal.id, error: error.to_string() });
                }
            }
        }

        tracing::info!(
            event_name = "autopilot.sweep.completed",
            deals_scanned = result.deals_scanned,
            recommended = result.recommended_count,
            tasks_created = result.tasks_created,
            errors = result.errors.len(),
            "autopilot sweep completed"
        );
        Ok(result)
    }
}
