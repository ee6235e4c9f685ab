//! Aggregation of historical strategy outcomes into per-strategy predictions and a KPI
//! snapshot. Shared by the in-memory and SQL analytics backends.

use std::collections::BTreeMap;

use chrono::{DateTime, Months, Utc};

use crate::domain::strategy::{
    AnalyticsQuery, KpiSnapshot, StrategyOutcomeRecord, StrategyPrediction,
};

/// z for a two-sided 95% interval.
const WILSON_Z: f64 = 1.96;

/// Records matching the query's org, jurisdiction and SKU within the lookback window,
/// newest first, capped at the record limit.
pub fn scope_records<'a>(
    records: impl Iterator<Item = &'a StrategyOutcomeRecord>,
    query: &AnalyticsQuery,
    now: DateTime<Utc>,
) -> Vec<StrategyOutcomeRecord> {
    let cutoff = lookback_cutoff(now, query.lookback_months);
    let mut scoped: Vec<StrategyOutcomeRecord> = records
        .filter(|record| record.org_id == query.org_id)
        .filter(|record| {
            query.jurisdiction_id.is_none() || record.jurisdiction_id == query.jurisdiction_id
        })
        .filter(|record| query.sku.is_none() || record.sku == query.sku)
        .filter(|record| record.decided_at >= cutoff)
        .cloned()
        .collect();
    scoped.sort_by(|left, right| right.decided_at.cmp(&left.decided_at));
    scoped.truncate(query.record_limit as usize);
    scoped
}

pub fn lookback_cutoff(now: DateTime<Utc>, lookback_months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(lookback_months)).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// One prediction per strategy that has timeline data, highest approval probability first.
pub fn predict_strategies(records: &[StrategyOutcomeRecord]) -> Vec<StrategyPrediction> {
    let mut by_strategy: BTreeMap<&str, Vec<&StrategyOutcomeRecord>> = BTreeMap::new();
    for record in records {
        by_strategy.entry(record.strategy_key.as_str()).or_default().push(record);
    }

    let mut predictions: Vec<StrategyPrediction> = by_strategy
        .into_iter()
        .filter_map(|(key, group)| {
            let sample_size = group.len();
            let approvals = group.iter().filter(|record| record.approved).count();
            let days: Vec<f64> = group.iter().filter_map(|record| record.days_to_decision).collect();
            let expected_days_p50 = median(&days)?;
            let (probability_low, probability_high) = wilson_interval(approvals, sample_size);
            let label = group
                .first()
                .map(|record| record.strategy_label.clone())
                .unwrap_or_else(|| key.to_string());

            Some(StrategyPrediction {
                strategy_key: key.to_string(),
                strategy_label: label,
                probability_approval: round4(approvals as f64 / sample_size as f64),
                probability_low: round4(probability_low),
                probability_high: round4(probability_high),
                expected_days_p50: round1(expected_days_p50),
                sample_size: sample_size as u32,
            })
        })
        .collect();

    predictions.sort_by(|left, right| {
        right
            .probability_approval
            .total_cmp(&left.probability_approval)
            .then_with(|| left.strategy_key.cmp(&right.strategy_key))
    });
    predictions
}

/// Drift KPIs over records that carried a prediction before the outcome was known.
pub fn kpi_snapshot(records: &[StrategyOutcomeRecord]) -> KpiSnapshot {
    let matched: Vec<&StrategyOutcomeRecord> =
        records.iter().filter(|record| record.predicted_probability.is_some()).collect();

    let timeline_errors: Vec<f64> = matched
        .iter()
        .filter_map(|record| match (record.predicted_days_p50, record.days_to_decision) {
            (Some(predicted), Some(actual)) => Some((actual - predicted).abs()),
            _ => None,
        })
        .collect();

    let approval_calibration_gap = if matched.is_empty() {
        None
    } else {
        let predicted_mean = matched
            .iter()
            .filter_map(|record| record.predicted_probability)
            .sum::<f64>()
            / matched.len() as f64;
        let observed = matched.iter().filter(|record| record.approved).count() as f64
            / matched.len() as f64;
        Some(round4(predicted_mean - observed))
    };

    KpiSnapshot {
        sample_size: records.len() as u32,
        matched_prediction_count: matched.len() as u32,
        median_timeline_absolute_error_days: median(&timeline_errors).map(round1),
        approval_calibration_gap,
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[middle - 1] + sorted[middle]) / 2.0)
    } else {
        Some(sorted[middle])
    }
}

fn wilson_interval(successes: usize, total: usize) -> (f64, f64) {
    if total == 0 {
        return (0.0, 1.0);
    }
    let n = total as f64;
    let p = successes as f64 / n;
    let z2 = WILSON_Z * WILSON_Z;
    let denominator = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denominator;
    let margin = WILSON_Z * ((p * (1.0 - p) / n) + z2 / (4.0 * n * n)).sqrt() / denominator;
    ((center - margin).max(0.0), (center + margin).min(1.0))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
