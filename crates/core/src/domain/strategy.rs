use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::deal::OrgId;

/// Historical entitlement result for one strategy on one deal, used to derive predictions
/// and KPI drift.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyOutcomeRecord {
    pub org_id: OrgId,
    pub jurisdiction_id: Option<String>,
    pub sku: Option<String>,
    pub strategy_key: String,
    pub strategy_label: String,
    pub approved: bool,
    pub days_to_decision: Option<f64>,
    /// Approval probability predicted before the outcome was known.
    pub predicted_probability: Option<f64>,
    pub predicted_days_p50: Option<f64>,
    pub decided_at: DateTime<Utc>,
}

/// Scope of an analytics read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub org_id: OrgId,
    pub jurisdiction_id: Option<String>,
    pub sku: Option<String>,
    pub lookback_months: u32,
    pub record_limit: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyPrediction {
    pub strategy_key: String,
    pub strategy_label: String,
    pub probability_approval: f64,
    pub probability_low: f64,
    pub probability_high: f64,
    pub expected_days_p50: f64,
    pub sample_size: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    pub sample_size: u32,
    pub matched_prediction_count: u32,
    pub median_timeline_absolute_error_days: Option<f64>,
    /// Mean predicted approval probability minus observed approval rate.
    pub approval_calibration_gap: Option<f64>,
}
