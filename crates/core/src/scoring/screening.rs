//! Deal screening on a 1-5 scale and weighted listing scores.
//!
//! Financial and qualitative groups are averaged separately and blended 50/50. A missing input
//! drops out of its group's denominator instead of scoring zero, marks the result provisional
//! and is listed in `missing_keys`. Hard filters only fail on values that could be computed.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::finance;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebtTemplate {
    pub ltv: f64,
    pub interest_rate: f64,
    pub amort_years: u32,
    pub io_years: u32,
    pub debt_fee_rate: f64,
}

impl Default for DebtTemplate {
    fn default() -> Self {
        Self { ltv: 0.65, interest_rate: 0.07, amort_years: 25, io_years: 0, debt_fee_rate: 0.01 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClosingCostsTemplate {
    pub legal_pct: f64,
    pub title_pct: f64,
    pub due_diligence_flat: f64,
}

impl Default for ClosingCostsTemplate {
    fn default() -> Self {
        Self { legal_pct: 0.005, title_pct: 0.003, due_diligence_flat: 25_000.0 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservesTemplate {
    pub capex_reserve_per_sf_year: f64,
}

impl Default for ReservesTemplate {
    fn default() -> Self {
        Self { capex_reserve_per_sf_year: 0.25 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardFilters {
    pub min_dscr: f64,
    pub min_cap_rate: f64,
    pub min_yield_spread: f64,
}

impl Default for HardFilters {
    fn default() -> Self {
        Self { min_dscr: 1.25, min_cap_rate: 0.07, min_yield_spread: 0.015 }
    }
}

/// Ascending floors for scores 1..=5. Values under the first floor still score 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringBands {
    pub cap_rate: Vec<f64>,
    pub dscr: Vec<f64>,
    pub cash_on_cash: Vec<f64>,
    pub yield_on_cost: Vec<f64>,
    pub yield_spread: Vec<f64>,
}

impl Default for ScoringBands {
    fn default() -> Self {
        Self {
            cap_rate: vec![0.07, 0.08, 0.09, 0.10, 0.11],
            dscr: vec![1.25, 1.40, 1.55, 1.70, 1.85],
            cash_on_cash: vec![0.06, 0.08, 0.10, 0.12, 0.14],
            yield_on_cost: vec![0.06, 0.08, 0.10, 0.12, 0.14],
            yield_spread: vec![0.015, 0.020, 0.025, 0.030, 0.035],
        }
    }
}

/// Org-level screening settings. Every section falls back to its defaults when omitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningPlaybook {
    pub low_confidence_threshold: f64,
    pub hard_filters: HardFilters,
    pub debt_template: DebtTemplate,
    pub closing_costs: ClosingCostsTemplate,
    pub reserves: ReservesTemplate,
    pub scoring_bands: ScoringBands,
}

impl Default for ScreeningPlaybook {
    fn default() -> Self {
        Self {
            low_confidence_threshold: 0.70,
            hard_filters: HardFilters::default(),
            debt_template: DebtTemplate::default(),
            closing_costs: ClosingCostsTemplate::default(),
            reserves: ReservesTemplate::default(),
            scoring_bands: ScoringBands::default(),
        }
    }
}

impl ScreeningPlaybook {
    pub fn standard() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let fractions = [
            ("low_confidence_threshold", self.low_confidence_threshold),
            ("debt_template.ltv", self.debt_template.ltv),
            ("debt_template.interest_rate", self.debt_template.interest_rate),
            ("hard_filters.min_cap_rate", self.hard_filters.min_cap_rate),
            ("hard_filters.min_yield_spread", self.hard_filters.min_yield_spread),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{name} must be within 0..=1")));
            }
        }

        let small_rates = [
            ("debt_template.debt_fee_rate", self.debt_template.debt_fee_rate),
            ("closing_costs.legal_pct", self.closing_costs.legal_pct),
            ("closing_costs.title_pct", self.closing_costs.title_pct),
        ];
        for (name, value) in small_rates {
            if !(0.0..=0.1).contains(&value) {
                return Err(invalid(format!("{name} must be within 0..=0.1")));
            }
        }

        if !(1..=40).contains(&self.debt_template.amort_years) {
            return Err(invalid("debt_template.amort_years must be within 1..=40"));
        }
        if self.debt_template.io_years > 10 {
            return Err(invalid("debt_template.io_years must be at most 10"));
        }

        let non_negative = [
            ("hard_filters.min_dscr", self.hard_filters.min_dscr),
            ("closing_costs.due_diligence_flat", self.closing_costs.due_diligence_flat),
            ("reserves.capex_reserve_per_sf_year", self.reserves.capex_reserve_per_sf_year),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(invalid(format!("{name} must not be negative")));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> DomainError {
    DomainError::InvariantViolation(message.into())
}

/// Annualized money amounts; rates as decimals. Qualitative scores are on the 1-5 scale.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningInputs {
    pub price_basis: Option<f64>,
    pub total_project_cost: Option<f64>,
    pub square_feet: Option<f64>,
    pub noi_in_place: Option<f64>,
    pub noi_stabilized: Option<f64>,
    pub tenant_credit_score: Option<f64>,
    pub asset_condition_score: Option<f64>,
    pub market_dynamics_score: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreeningMetrics {
    pub price_basis: Option<f64>,
    pub total_cost: Option<f64>,
    pub loan_amount: Option<f64>,
    pub equity_invested: Option<f64>,
    pub loan_constant: Option<f64>,
    pub annual_debt_service: Option<f64>,
    pub annual_reserves: Option<f64>,
    pub cap_rate_in_place: Option<f64>,
    pub cap_rate_stabilized: Option<f64>,
    pub cap_rate_used: Option<f64>,
    pub noi_used: Option<f64>,
    pub yield_on_cost: Option<f64>,
    pub yield_spread: Option<f64>,
    pub dscr: Option<f64>,
    pub cash_on_cash: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreeningScores {
    pub overall_score: Option<f64>,
    pub financial_score: Option<f64>,
    pub qualitative_score: Option<f64>,
    pub is_provisional: bool,
    pub hard_filter_failed: bool,
    pub hard_filter_reasons: Vec<String>,
    pub missing_keys: Vec<String>,
    pub metric_scores: BTreeMap<String, Option<f64>>,
    pub metric_values: BTreeMap<String, Option<f64>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreeningComputation {
    pub metrics: ScreeningMetrics,
    pub scores: ScreeningScores,
}

const FINANCIAL_KEYS: [&str; 4] = ["cap_rate", "yield_on_cost", "cash_on_cash", "dscr"];
const QUALITATIVE_KEYS: [&str; 3] = ["tenant_credit", "asset_condition", "market_dynamics"];

/// Stabilized NOI drives cap rate, yield and the cap-rate filter; in-place NOI drives cash
/// flow, DSCR and cash-on-cash. Each falls back to the other when missing.
pub fn compute_screening(
    playbook: &ScreeningPlaybook,
    inputs: &ScreeningInputs,
) -> ScreeningComputation {
    let mut missing = BTreeSet::new();
    let mut present = |key: &'static str, value: Option<f64>| {
        let value = value.filter(|value| value.is_finite());
        if value.is_none() {
            missing.insert(key.to_string());
        }
        value
    };

    let price_basis = present("price_basis", inputs.price_basis);
    let square_feet = present("square_feet", inputs.square_feet);
    let noi_in_place = present("noi_in_place", inputs.noi_in_place);
    let noi_stabilized = present("noi_stabilized", inputs.noi_stabilized);
    let tenant_credit = present("tenant_credit", inputs.tenant_credit_score);
    let asset_condition = present("asset_condition", inputs.asset_condition_score);
    let market_dynamics = present("market_dynamics", inputs.market_dynamics_score);

    let noi_for_cap = noi_stabilized.or(noi_in_place);
    let noi_for_cash_flow = noi_in_place.or(noi_stabilized);

    let cap_rate_in_place = rate_on(noi_in_place, price_basis);
    let cap_rate_stabilized = rate_on(noi_stabilized, price_basis);
    let cap_rate_used = rate_on(noi_for_cap, price_basis);

    let debt = &playbook.debt_template;
    let closing = &playbook.closing_costs;
    let loan_amount = price_basis.map(|price| price * debt.ltv);
    let loan_constant =
        loan_amount.map(|_| finance::loan_constant(debt.interest_rate, debt.amort_years));
    let annual_debt_service = loan_amount.zip(loan_constant).map(|(loan, constant)| loan * constant);

    let total_cost = inputs.total_project_cost.filter(|value| value.is_finite()).or_else(|| {
        let (price, loan) = price_basis.zip(loan_amount)?;
        Some(
            price
                + price * closing.legal_pct
                + price * closing.title_pct
                + closing.due_diligence_flat
                + loan * debt.debt_fee_rate,
        )
    });
    let equity = total_cost.zip(loan_amount).map(|(cost, loan)| cost - loan);

    let reserves = square_feet.map(|feet| feet * playbook.reserves.capex_reserve_per_sf_year);
    let noi_after_reserves =
        noi_for_cash_flow.zip(reserves).map(|(noi, reserves)| noi - reserves);

    let dscr = noi_after_reserves
        .zip(annual_debt_service)
        .and_then(|(noi, service)| finance::dscr(decimal(noi)?, decimal(service)?));
    let yield_on_cost = rate_on(noi_for_cap, total_cost);
    let yield_spread = yield_on_cost.zip(loan_constant).map(|(yield_, constant)| yield_ - constant);
    let cash_on_cash = noi_after_reserves
        .zip(annual_debt_service)
        .map(|(noi, service)| noi - service)
        .zip(equity.filter(|equity| *equity > 0.0))
        .and_then(|(cash_flow, equity)| {
            Some(finance::cash_on_cash(decimal(cash_flow)?, decimal(equity)?))
        });

    let bands = &playbook.scoring_bands;
    let qualitative = |value: Option<f64>| value.map(|value| value.clamp(1.0, 5.0));
    let metric_scores: BTreeMap<String, Option<f64>> = [
        ("cap_rate", score_from_bands(cap_rate_used, &bands.cap_rate)),
        ("yield_on_cost", score_from_bands(yield_on_cost, &bands.yield_on_cost)),
        ("cash_on_cash", score_from_bands(cash_on_cash, &bands.cash_on_cash)),
        ("dscr", score_from_bands(dscr, &bands.dscr)),
        ("tenant_credit", qualitative(tenant_credit)),
        ("asset_condition", qualitative(asset_condition)),
        ("market_dynamics", qualitative(market_dynamics)),
    ]
    .into_iter()
    .map(|(key, score)| (key.to_string(), score))
    .collect();

    let group_average = |keys: &[&str]| {
        let scores: Vec<f64> =
            keys.iter().filter_map(|key| metric_scores.get(*key).copied().flatten()).collect();
        (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64)
    };
    let financial_score = group_average(&FINANCIAL_KEYS);
    let qualitative_score = group_average(&QUALITATIVE_KEYS);
    let overall_score = match (financial_score, qualitative_score) {
        (Some(financial), Some(qualitative)) => Some(0.5 * financial + 0.5 * qualitative),
        (financial, qualitative) => financial.or(qualitative),
    };
    let is_provisional = metric_scores.values().any(Option::is_none);

    let hard = &playbook.hard_filters;
    let hard_filter_reasons: Vec<String> = [
        ("dscr", hard.min_dscr, dscr),
        ("cap_rate", hard.min_cap_rate, cap_rate_used),
        ("yield_spread", hard.min_yield_spread, yield_spread),
    ]
    .into_iter()
    .filter(|(_, threshold, value)| value.is_some_and(|value| value < *threshold))
    .map(|(name, _, _)| name.to_string())
    .collect();

    let metric_values: BTreeMap<String, Option<f64>> = [
        ("cap_rate_in_place", cap_rate_in_place),
        ("cap_rate_stabilized", cap_rate_stabilized),
        ("cap_rate_used", cap_rate_used),
        ("yield_on_cost", yield_on_cost),
        ("yield_spread", yield_spread),
        ("cash_on_cash", cash_on_cash),
        ("dscr", dscr),
        ("loan_constant", loan_constant),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.map(round4)))
    .collect();

    let metrics = ScreeningMetrics {
        price_basis: price_basis.map(round4),
        total_cost: total_cost.map(round4),
        loan_amount: loan_amount.map(round4),
        equity_invested: equity.map(round4),
        loan_constant: loan_constant.map(round4),
        annual_debt_service: annual_debt_service.map(round4),
        annual_reserves: reserves.map(round4),
        cap_rate_in_place: cap_rate_in_place.map(round4),
        cap_rate_stabilized: cap_rate_stabilized.map(round4),
        cap_rate_used: cap_rate_used.map(round4),
        noi_used: noi_for_cap.map(round4),
        yield_on_cost: yield_on_cost.map(round4),
        yield_spread: yield_spread.map(round4),
        dscr: dscr.map(round4),
        cash_on_cash: cash_on_cash.map(round4),
    };

    let scores = ScreeningScores {
        overall_score: overall_score.map(round2),
        financial_score: financial_score.map(round2),
        qualitative_score: qualitative_score.map(round2),
        is_provisional,
        hard_filter_failed: !hard_filter_reasons.is_empty(),
        hard_filter_reasons,
        missing_keys: missing.into_iter().collect(),
        metric_scores: metric_scores
            .into_iter()
            .map(|(key, score)| (key, score.map(round2)))
            .collect(),
        metric_values,
    };

    ScreeningComputation { metrics, scores }
}

/// Highest band whose floor the value reaches, 1 when it reaches none.
pub fn score_from_bands(value: Option<f64>, bands: &[f64]) -> Option<f64> {
    let value = value?;
    if bands.is_empty() {
        return None;
    }
    let score = bands
        .iter()
        .enumerate()
        .filter(|(_, floor)| value >= **floor)
        .map(|(index, _)| index + 1)
        .last()
        .unwrap_or(1);
    Some(score as f64)
}

/// `numerator / denominator` through the cap-rate primitive; `None` on a missing or zero
/// denominator.
fn rate_on(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (numerator, denominator) = numerator.zip(denominator)?;
    if denominator == 0.0 {
        return None;
    }
    Some(finance::cap_rate(decimal(numerator)?, decimal(denominator)?))
}

fn decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64_retain(value)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Default weights for listing scores submitted to the deal screener.
pub const LISTING_SCORE_WEIGHTS: [(&str, f64); 6] = [
    ("financial", 0.30),
    ("location", 0.20),
    ("utilities", 0.10),
    ("zoning", 0.15),
    ("market", 0.15),
    ("risk", 0.10),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingTier {
    A,
    B,
    C,
    D,
}

impl ListingTier {
    pub fn from_total(total: f64) -> Self {
        if total >= 85.0 {
            Self::A
        } else if total >= 70.0 {
            Self::B
        } else if total >= 55.0 {
            Self::C
        } else {
            Self::D
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListingScoreBreakdown {
    pub raw_scores: BTreeMap<String, f64>,
    pub normalized_scores: BTreeMap<String, f64>,
    pub weighted_scores: BTreeMap<String, f64>,
    pub total_score: f64,
    pub tier: ListingTier,
    pub weights: BTreeMap<String, f64>,
}

/// Fractions at or under 1 are read as percentages; everything is clamped to 0..=100. A
/// weighted key with no score counts as 0.
pub fn normalize_listing_score(value: Option<f64>) -> f64 {
    match value {
        Some(value) if value.is_finite() => {
            let value = if value <= 1.0 { value * 100.0 } else { value };
            value.clamp(0.0, 100.0)
        }
        _ => 0.0,
    }
}

/// Weighted listing total. Overrides replace default weights and may add new keys.
pub fn compute_listing_score(
    scores: &BTreeMap<String, f64>,
    overrides: Option<&BTreeMap<String, f64>>,
) -> ListingScoreBreakdown {
    let mut weights: BTreeMap<String, f64> = LISTING_SCORE_WEIGHTS
        .iter()
        .map(|(key, weight)| (key.to_string(), *weight))
        .collect();
    if let Some(overrides) = overrides {
        weights.extend(overrides.iter().map(|(key, weight)| (key.clone(), *weight)));
    }

    let normalized_scores: BTreeMap<String, f64> = weights
        .keys()
        .map(|key| (key.clone(), normalize_listing_score(scores.get(key).copied())))
        .collect();
    let weighted_scores: BTreeMap<String, f64> = weights
        .iter()
        .map(|(key, weight)| (key.clone(), normalized_scores[key] * weight))
        .collect();
    let total_score = round2(weighted_scores.values().sum());

    ListingScoreBreakdown {
        raw_scores: scores.clone(),
        normalized_scores,
        weighted_scores,
        total_score,
        tier: ListingTier::from_total(total_score),
        weights,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{
        compute_listing_score, compute_screening, normalize_listing_score, score_from_bands,
        ListingTier, ScreeningInputs, ScreeningPlaybook,
    };

    fn approx(left: f64, right: f64, tolerance: f64) -> bool {
        (left - right).abs() < tolerance
    }

    fn qualitative_threes(inputs: ScreeningInputs) -> ScreeningInputs {
        ScreeningInputs {
            tenant_credit_score: Some(3.0),
            asset_condition_score: Some(3.0),
            market_dynamics_score: Some(3.0),
            ..inputs
        }
    }

    fn priced(total_project_cost: f64, noi_in_place: f64, noi_stabilized: f64) -> ScreeningInputs {
        qualitative_threes(ScreeningInputs {
            price_basis: Some(10_000_000.0),
            total_project_cost: Some(total_project_cost),
            square_feet: Some(100_000.0),
            noi_in_place: Some(noi_in_place),
            noi_stabilized: Some(noi_stabilized),
            ..ScreeningInputs::default()
        })
    }

    #[test]
    fn complete_inputs_are_not_provisional() {
        let playbook = ScreeningPlaybook::standard();
        let inputs = ScreeningInputs {
            tenant_credit_score: Some(4.0),
            asset_condition_score: Some(3.0),
            market_dynamics_score: Some(4.0),
            ..priced(10_300_000.0, 900_000.0, 1_100_000.0)
        };

        let result = compute_screening(&playbook, &inputs);

        assert!(!result.scores.is_provisional);
        let overall = result.scores.overall_score.expect("overall score");
        assert!((1.0..=5.0).contains(&overall), "overall was {overall}");
        assert!(!result.scores.hard_filter_failed);
        assert!(result.scores.missing_keys.is_empty());
        assert!(approx(result.metrics.cap_rate_used.expect("cap rate"), 0.11, 1e-4));
        assert!(approx(result.metrics.noi_used.expect("noi"), 1_100_000.0, 1e-4));
        assert!(approx(result.metrics.loan_constant.expect("constant"), 0.0848, 1e-4));
    }

    #[test]
    fn missing_financials_do_not_penalize_qualitative_score() {
        let inputs = ScreeningInputs {
            tenant_credit_score: Some(4.0),
            asset_condition_score: Some(2.0),
            market_dynamics_score: Some(3.0),
            ..ScreeningInputs::default()
        };

        let result = compute_screening(&ScreeningPlaybook::standard(), &inputs);

        assert!(result.scores.is_provisional);
        assert_eq!(result.scores.financial_score, None);
        assert_eq!(result.scores.qualitative_score, Some(3.0));
        assert_eq!(result.scores.overall_score, result.scores.qualitative_score);
        assert!(!result.scores.hard_filter_failed);
        for key in ["price_basis", "noi_in_place", "noi_stabilized", "square_feet"] {
            assert!(result.scores.missing_keys.iter().any(|missing| missing == key), "{key}");
        }
    }

    #[test]
    fn low_in_place_noi_fails_only_the_dscr_filter() {
        let playbook = ScreeningPlaybook::standard();
        let result = compute_screening(&playbook, &priced(12_000_000.0, 500_000.0, 1_500_000.0));

        let dscr = result.metrics.dscr.expect("dscr is computed");
        assert!(dscr < playbook.hard_filters.min_dscr, "dscr was {dscr}");
        assert!(result.scores.hard_filter_failed);
        assert_eq!(result.scores.hard_filter_reasons, vec!["dscr".to_string()]);
    }

    #[test]
    fn stabilized_cap_rate_below_minimum_fails() {
        let playbook = ScreeningPlaybook::standard();
        let result = compute_screening(&playbook, &priced(12_000_000.0, 1_500_000.0, 600_000.0));

        let cap_rate = result.metrics.cap_rate_used.expect("cap rate");
        assert!(cap_rate < playbook.hard_filters.min_cap_rate);
        assert!(result.scores.hard_filter_reasons.contains(&"cap_rate".to_string()));
    }

    #[test]
    fn thin_yield_spread_fails_while_cap_rate_passes() {
        let playbook = ScreeningPlaybook::standard();
        let result = compute_screening(&playbook, &priced(12_000_000.0, 1_200_000.0, 800_000.0));

        let spread = result.metrics.yield_spread.expect("yield spread");
        assert!(spread < playbook.hard_filters.min_yield_spread, "spread was {spread}");
        assert!(result.scores.hard_filter_reasons.contains(&"yield_spread".to_string()));
        assert!(!result.scores.hard_filter_reasons.contains(&"cap_rate".to_string()));
    }

    #[test]
    fn total_cost_is_estimated_from_closing_templates() {
        let inputs = ScreeningInputs {
            total_project_cost: None,
            ..priced(0.0, 900_000.0, 900_000.0)
        };

        let result = compute_screening(&ScreeningPlaybook::standard(), &inputs);

        // 10M price + 0.8% legal/title + 25k diligence + 1% fee on a 6.5M loan.
        assert!(approx(result.metrics.total_cost.expect("total cost"), 10_170_000.0, 1e-6));
        assert!(approx(result.metrics.equity_invested.expect("equity"), 3_670_000.0, 1e-6));
        assert!(approx(result.metrics.annual_reserves.expect("reserves"), 25_000.0, 1e-9));
    }

    #[test]
    fn bands_floor_at_one_and_cap_at_five() {
        let bands = [0.07, 0.08, 0.09, 0.10, 0.11];
        assert_eq!(score_from_bands(Some(0.05), &bands), Some(1.0));
        assert_eq!(score_from_bands(Some(0.085), &bands), Some(2.0));
        assert_eq!(score_from_bands(Some(0.2), &bands), Some(5.0));
        assert_eq!(score_from_bands(None, &bands), None);
        assert_eq!(score_from_bands(Some(0.2), &[]), None);
    }

    #[test]
    fn playbook_rejects_out_of_range_settings() {
        assert!(ScreeningPlaybook::standard().validate().is_ok());

        let mut playbook = ScreeningPlaybook::standard();
        playbook.debt_template.amort_years = 0;
        assert!(playbook.validate().is_err());

        let mut playbook = ScreeningPlaybook::standard();
        playbook.debt_template.ltv = 1.2;
        assert!(playbook.validate().is_err());
    }

    #[test]
    fn partial_playbook_json_keeps_defaults() {
        let playbook: ScreeningPlaybook =
            serde_json::from_str(r#"{"hard_filters": {"min_dscr": 1.4}}"#).expect("playbook json");
        assert_eq!(playbook.hard_filters.min_dscr, 1.4);
        assert_eq!(playbook.hard_filters.min_cap_rate, 0.07);
        assert_eq!(playbook.debt_template.amort_years, 25);
        assert_eq!(playbook.low_confidence_threshold, 0.70);
    }

    #[test]
    fn listing_score_blends_normalized_dimensions() {
        let scores: BTreeMap<String, f64> = [
            ("financial", 0.9),
            ("location", 80.0),
            ("utilities", 70.0),
            ("zoning", 60.0),
            ("market", 50.0),
            ("risk", 120.0),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        let breakdown = compute_listing_score(&scores, None);

        assert_eq!(breakdown.normalized_scores["financial"], 90.0);
        assert_eq!(breakdown.normalized_scores["risk"], 100.0);
        assert!(approx(breakdown.total_score, 76.5, 1e-9));
        assert_eq!(breakdown.tier, ListingTier::B);
    }

    #[test]
    fn listing_weight_overrides_replace_and_extend_defaults() {
        let scores: BTreeMap<String, f64> =
            [("financial".to_string(), 100.0), ("access".to_string(), 100.0)].into();
        let overrides: BTreeMap<String, f64> =
            [("financial".to_string(), 0.5), ("access".to_string(), 0.4)].into();

        let breakdown = compute_listing_score(&scores, Some(&overrides));

        assert_eq!(breakdown.weights.len(), 7);
        assert_eq!(breakdown.normalized_scores["location"], 0.0);
        assert!(approx(breakdown.total_score, 90.0, 1e-9));
        assert_eq!(breakdown.tier, ListingTier::A);
    }

    #[test]
    fn listing_tiers_use_fixed_cut_points() {
        assert_eq!(ListingTier::from_total(85.0), ListingTier::A);
        assert_eq!(ListingTier::from_total(70.0), ListingTier::B);
        assert_eq!(ListingTier::from_total(55.0), ListingTier::C);
        assert_eq!(ListingTier::from_total(54.99), ListingTier::D);
        assert_eq!(normalize_listing_score(Some(-4.0)), 0.0);
        assert_eq!(normalize_listing_score(None), 0.0);
    }
}
