use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Minimum weight any dimension may hold after adaptation.
pub const WEIGHT_FLOOR: f64 = 0.02;
const SUM_TOLERANCE: f64 = 1e-4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageDimension {
    Access,
    Drainage,
    Adjacency,
    Environmental,
    Utilities,
    Politics,
    Zoning,
    Acreage,
}

impl TriageDimension {
    /// Fixed key order. The last entry absorbs rounding remainders.
    pub const ALL: [TriageDimension; 8] = [
        Self::Access,
        Self::Drainage,
        Self::Adjacency,
        Self::Environmental,
        Self::Utilities,
        Self::Politics,
        Self::Zoning,
        Self::Acreage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Drainage => "drainage",
            Self::Adjacency => "adjacency",
            Self::Environmental => "environmental",
            Self::Utilities => "utilities",
            Self::Politics => "politics",
            Self::Zoning => "zoning",
            Self::Acreage => "acreage",
        }
    }
}

/// One value per triage dimension. Used both for weights and for 0-100 dimension scores.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DimensionValues {
    pub access: f64,
    pub drainage: f64,
    pub adjacency: f64,
    pub environmental: f64,
    pub utilities: f64,
    pub politics: f64,
    pub zoning: f64,
    pub acreage: f64,
}

pub type ScoringWeights = DimensionValues;
pub type DimensionScores = DimensionValues;

impl DimensionValues {
    pub fn from_fn(mut value: impl FnMut(TriageDimension) -> f64) -> Self {
        Self {
            access: value(TriageDimension::Access),
            drainage: value(TriageDimension::Drainage),
            adjacency: value(TriageDimension::Adjacency),
            environmental: value(TriageDimension::Environmental),
            utilities: value(TriageDimension::Utilities),
            politics: value(TriageDimension::Politics),
            zoning: value(TriageDimension::Zoning),
            acreage: value(TriageDimension::Acreage),
        }
    }

    pub fn get(&self, dimension: TriageDimension) -> f64 {
        match dimension {
            TriageDimension::Access => self.access,
            TriageDimension::Drainage => self.drainage,
            TriageDimension::Adjacency => self.adjacency,
            TriageDimension::Environmental => self.environmental,
            TriageDimension::Utilities => self.utilities,
            TriageDimension::Politics => self.politics,
            TriageDimension::Zoning => self.zoning,
            TriageDimension::Acreage => self.acreage,
        }
    }

    pub fn sum(&self) -> f64 {
        TriageDimension::ALL.iter().map(|dimension| self.get(*dimension)).sum()
    }

    /// Checks the weight invariants: every weight at or above the floor, sum of one.
    pub fn validate_weights(&self) -> Result<(), DomainError> {
        if let Some(dimension) =
            TriageDimension::ALL.iter().find(|dimension| self.get(**dimension) < WEIGHT_FLOOR)
        {
            return Err(DomainError::InvariantViolation(format!(
                "weight for {} is below the {WEIGHT_FLOOR} floor",
                dimension.as_str()
            )));
        }
        if (self.sum() - 1.0).abs() > SUM_TOLERANCE {
            return Err(DomainError::InvariantViolation(format!(
                "weights sum to {:.4}, expected 1.0",
                self.sum()
            )));
        }
        Ok(())
    }
}

impl Default for DimensionValues {
    /// Baseline triage weights.
    fn default() -> Self {
        Self {
            access: 0.15,
            drainage: 0.10,
            adjacency: 0.10,
            environmental: 0.15,
            utilities: 0.10,
            politics: 0.10,
            zoning: 0.20,
            acreage: 0.10,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriageDecision {
    Kill,
    Hold,
    Advance,
}

impl TriageDecision {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            Self::Advance
        } else if score >= 40.0 {
            Self::Hold
        } else {
            Self::Kill
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kill => "KILL",
            Self::Hold => "HOLD",
            Self::Advance => "ADVANCE",
        }
    }
}

/// Weighted 0-100 triage score, rounded to one decimal.
pub fn triage_score(scores: &DimensionScores, weights: &ScoringWeights) -> f64 {
    let total_weight = weights.sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = TriageDimension::ALL
        .iter()
        .map(|dimension| scores.get(*dimension).clamp(0.0, 100.0) * weights.get(*dimension))
        .sum();
    ((weighted / total_weight) * 10.0).round() / 10.0
}
