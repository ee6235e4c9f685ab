//! Recalibrates triage weights and projection corrections from resolved deals.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::weights::{DimensionScores, ScoringWeights, TriageDecision, TriageDimension, WEIGHT_FLOOR};

pub const MIN_OUTCOMES: usize = 5;
pub const LEARNING_RATE: f64 = 0.03;
pub const MAX_ADJUSTMENT: f64 = 0.03;
pub const MIN_BIAS_FACTOR: f64 = 0.5;
pub const MAX_BIAS_FACTOR: f64 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeResult {
    Success,
    Partial,
    Failure,
}

impl OutcomeResult {
    pub fn value(&self) -> f64 {
        match self {
            Self::Success => 1.0,
            Self::Partial => 0.5,
            Self::Failure => 0.0,
        }
    }
}

/// Triage prediction paired with how the deal actually resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub dimension_scores: DimensionScores,
    pub predicted_decision: TriageDecision,
    pub actual_outcome: OutcomeResult,
    pub predicted_score: f64,
}

/// One projected metric (e.g. rent, timeline) and what it turned out to be.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionActual {
    pub metric: String,
    pub predicted: f64,
    pub actual: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionBias {
    pub metric: String,
    pub correction_factor: f64,
    pub sample_size: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTier {
    Green,
    Yellow,
    Red,
}

impl ScoreTier {
    pub fn for_score(score: f64) -> Self {
        if score >= 70.0 {
            Self::Green
        } else if score >= 40.0 {
            Self::Yellow
        } else {
            Self::Red
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierCalibration {
    pub tier: ScoreTier,
    pub count: usize,
    pub success_rate: f64,
    pub failure_rate: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    InsufficientData,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn for_sample_size(count: usize) -> Self {
        match count {
            0..=4 => Self::InsufficientData,
            5..=14 => Self::Low,
            15..=49 => Self::Medium,
            _ => Self::High,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeTrackingSummary {
    pub total_outcomes: usize,
    pub confidence: ConfidenceLevel,
    pub adaptive_weights: Option<ScoringWeights>,
    pub projection_biases: Vec<ProjectionBias>,
    pub tier_calibration: Vec<TierCalibration>,
}

/// Nudges each weight toward dimensions whose scores track real outcomes. Returns `None`
/// below [`MIN_OUTCOMES`] records.
pub fn compute_adaptive_weights(
    outcomes: &[OutcomeRecord],
    base_weights: &ScoringWeights,
) -> Option<ScoringWeights> {
    if outcomes.len() < MIN_OUTCOMES {
        return None;
    }

    let results: Vec<f64> = outcomes.iter().map(|outcome| outcome.actual_outcome.value()).collect();
    let adjusted: Vec<f64> = TriageDimension::ALL
        .iter()
        .map(|dimension| {
            let scores: Vec<f64> =
                outcomes.iter().map(|outcome| outcome.dimension_scores.get(*dimension)).collect();
            let adjustment =
                (pearson(&scores, &results) * LEARNING_RATE).clamp(-MAX_ADJUSTMENT, MAX_ADJUSTMENT);
            (base_weights.get(*dimension) + adjustment).max(WEIGHT_FLOOR)
        })
        .collect();

    // `from_fn` visits dimensions in `TriageDimension::ALL` order.
    let mut normalized = round_to_unit_sum(&normalize_with_floor(&adjusted)).into_iter();
    Some(ScoringWeights::from_fn(|_| normalized.next().unwrap_or(WEIGHT_FLOOR)))
}

/// Mean actual/predicted ratio per metric, clamped to the allowed correction band. Zero
/// predictions are skipped; metrics with no usable pairs are omitted.
pub fn compute_projection_biases(actuals: &[ProjectionActual]) -> Vec<ProjectionBias> {
    let mut ratios: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for entry in actuals.iter().filter(|entry| entry.predicted != 0.0) {
        ratios.entry(entry.metric.as_str()).or_default().push(entry.actual / entry.predicted);
    }

    ratios
        .into_iter()
        .map(|(metric, values)| {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            ProjectionBias {
                metric: metric.to_string(),
                correction_factor: round4(mean.clamp(MIN_BIAS_FACTOR, MAX_BIAS_FACTOR)),
                sample_size: values.len(),
            }
        })
        .collect()
}

pub fn compute_tier_calibration(outcomes: &[OutcomeRecord]) -> Vec<TierCalibration> {
    [ScoreTier::Green, ScoreTier::Yellow, ScoreTier::Red]
        .into_iter()
        .map(|tier| {
            let in_tier: Vec<&OutcomeRecord> = outcomes
                .iter()
                .filter(|outcome| ScoreTier::for_score(outcome.predicted_score) == tier)
                .collect();
            let count = in_tier.len();
            let rate = |result: OutcomeResult| {
                if count == 0 {
                    return 0.0;
                }
                let matching = in_tier.iter().filter(|outcome| outcome.actual_outcome == result).count();
                round4(matching as f64 / count as f64)
            };
            TierCalibration {
                tier,
                count,
                success_rate: rate(OutcomeResult::Success),
                failure_rate: rate(OutcomeResult::Failure),
            }
        })
        .collect()
}

pub fn build_outcome_tracking_summary(
    outcomes: &[OutcomeRecord],
    actuals: &[ProjectionActual],
    base_weights: &ScoringWeights,
) -> OutcomeTrackingSummary {
    OutcomeTrackingSummary {
        total_outcomes: outcomes.len(),
        confidence: ConfidenceLevel::for_sample_size(outcomes.len()),
        adaptive_weights: compute_adaptive_weights(outcomes, base_weights),
        projection_biases: compute_projection_biases(actuals),
        tier_calibration: compute_tier_calibration(outcomes),
    }
}

/// Pearson correlation; 0 when either series has no variance.
fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let count = xs.len().min(ys.len());
    if count == 0 {
        return 0.0;
    }
    let mean_x = xs.iter().take(count).sum::<f64>() / count as f64;
    let mean_y = ys.iter().take(count).sum::<f64>() / count as f64;

    let (mut covariance, mut variance_x, mut variance_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys.iter()) {
        let (dx, dy) = (x - mean_x, y - mean_y);
        covariance += dx * dy;
        variance_x += dx * dx;
        variance_y += dy * dy;
    }
    if variance_x == 0.0 || variance_y == 0.0 {
        return 0.0;
    }
    covariance / (variance_x.sqrt() * variance_y.sqrt())
}

/// Scales weights to sum to one, pinning any that would fall under the floor and
/// redistributing the remainder across the rest.
fn normalize_with_floor(weights: &[f64]) -> Vec<f64> {
    let mut pinned = vec![false; weights.len()];
    let mut result = weights.to_vec();

    loop {
        let pinned_count = pinned.iter().filter(|pinned| **pinned).count();
        let free_total: f64 =
            weights.iter().zip(&pinned).filter(|(_, pinned)| !**pinned).map(|(w, _)| w).sum();
        let budget = 1.0 - WEIGHT_FLOOR * pinned_count as f64;

        let mut newly_pinned = false;
        for (index, weight) in weights.iter().enumerate() {
            if pinned[index] {
                result[index] = WEIGHT_FLOOR;
                continue;
            }
            let scaled = if free_total > 0.0 { weight / free_total * budget } else { WEIGHT_FLOOR };
            if scaled < WEIGHT_FLOOR {
                pinned[index] = true;
                newly_pinned = true;
            }
            result[index] = scaled.max(WEIGHT_FLOOR);
        }

        if !newly_pinned {
            return result;
        }
    }
}

/// Rounds to four decimals and folds the rounding remainder into the last dimension that can
/// take it without crossing the floor.
fn round_to_unit_sum(weights: &[f64]) -> Vec<f64> {
    let mut rounded: Vec<f64> = weights.iter().map(|weight| round4(*weight)).collect();
    let remainder = round4(1.0 - rounded.iter().sum::<f64>());
    if remainder != 0.0 {
        if let Some(index) =
            (0..rounded.len()).rev().find(|index| rounded[*index] + remainder >= WEIGHT_FLOOR)
        {
            rounded[index] = round4(rounded[index] + remainder);
        }
    }
    rounded
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
