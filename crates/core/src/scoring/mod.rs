pub mod adaptive;
pub mod finance;
pub mod screening;
pub mod weights;

pub use adaptive::{
    build_outcome_tracking_summary, compute_adaptive_weights, compute_projection_biases,
    compute_tier_calibration, ConfidenceLevel, OutcomeRecord, OutcomeResult,
    OutcomeTrackingSummary, ProjectionActual, ProjectionBias, ScoreTier, TierCalibration,
};
pub use screening::{
    compute_listing_score, compute_screening, ListingScoreBreakdown, ListingTier,
    ScreeningComputation, ScreeningInputs, ScreeningPlaybook,
};
pub use weights::{
    triage_score, DimensionScores, DimensionValues, ScoringWeights, TriageDecision,
    TriageDimension, WEIGHT_FLOOR,
};
