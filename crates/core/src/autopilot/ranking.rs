use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::strategy::StrategyPrediction;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyRecommendationCandidate {
    pub strategy_key: String,
    pub strategy_label: String,
    pub probability_approval: f64,
    pub probability_low: f64,
    pub probability_high: f64,
    pub expected_days_p50: f64,
    pub sample_size: u32,
    pub approval_score: f64,
    pub speed_score: f64,
    pub composite_score: f64,
}

/// Blends approval likelihood with relative speed. Weights are normalized to sum to one.
pub fn rank_candidates(
    predictions: &[StrategyPrediction],
    approval_weight: f64,
    speed_weight: f64,
) -> Vec<StrategyRecommendationCandidate> {
    let (approval_weight, speed_weight) = normalize_weights(approval_weight, speed_weight);

    let fastest = predictions.iter().map(|p| p.expected_days_p50).fold(f64::INFINITY, f64::min);
    let slowest = predictions.iter().map(|p| p.expected_days_p50).fold(f64::NEG_INFINITY, f64::max);
    let spread = slowest - fastest;

    let mut candidates: Vec<StrategyRecommendationCandidate> = predictions
        .iter()
        .map(|prediction| {
            let approval_score = prediction.probability_approval.clamp(0.0, 1.0);
            let speed_score = if spread > 0.0 {
                1.0 - (prediction.expected_days_p50 - fastest) / spread
            } else {
                1.0
            };
            StrategyRecommendationCandidate {
                strategy_key: prediction.strategy_key.clone(),
                strategy_label: prediction.strategy_label.clone(),
                probability_approval: prediction.probability_approval,
                probability_low: prediction.probability_low,
                probability_high: prediction.probability_high,
                expected_days_p50: prediction.expected_days_p50,
                sample_size: prediction.sample_size,
                approval_score: round4(approval_score),
                speed_score: round4(speed_score),
                composite_score: round4(approval_score * approval_weight + speed_score * speed_weight),
            }
        })
        .collect();

    candidates.sort_by(compare_candidates);
    candidates
}

/// Composite desc, then approval probability desc, then faster timeline, then larger sample.
fn compare_candidates(
    left: &StrategyRecommendationCandidate,
    right: &StrategyRecommendationCandidate,
) -> Ordering {
    right
        .composite_score
        .total_cmp(&left.composite_score)
        .then_with(|| right.probability_approval.total_cmp(&left.probability_approval))
        .then_with(|| left.expected_days_p50.total_cmp(&right.expected_days_p50))
        .then_with(|| right.sample_size.cmp(&left.sample_size))
}

fn normalize_weights(approval_weight: f64, speed_weight: f64) -> (f64, f64) {
    let approval_weight = approval_weight.max(0.0);
    let speed_weight = speed_weight.max(0.0);
    let total = approval_weight + speed_weight;
    if total <= 0.0 {
        return (0.7, 0.3);
    }
    (approval_weight / total, speed_weight / total)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
