//! Underwriting math behind deal screening.
//!
//! Ratios are `f64`. Currency results are `Decimal` rounded half-up to cents.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

const IRR_LOW: f64 = -0.9999;
const IRR_HIGH: f64 = 10.0;
const IRR_ITERATIONS: usize = 100;
const IRR_TOLERANCE: f64 = 1e-6;

pub fn npv(rate: f64, cash_flows: &[f64]) -> f64 {
    cash_flows
        .iter()
        .enumerate()
        .map(|(period, cash_flow)| cash_flow / (1.0 + rate).powi(period as i32))
        .sum()
}

/// Internal rate of return by bisection. Returns 0.0 when the flows never change sign or the
/// search bracket does not contain a root.
pub fn irr(cash_flows: &[f64]) -> f64 {
    let has_inflow = cash_flows.iter().any(|flow| *flow > 0.0);
    let has_outflow = cash_flows.iter().any(|flow| *flow < 0.0);
    if !(has_inflow && has_outflow) {
        return 0.0;
    }

    let (mut low, mut high) = (IRR_LOW, IRR_HIGH);
    let mut npv_low = npv(low, cash_flows);
    let npv_high = npv(high, cash_flows);
    if npv_low == 0.0 {
        return low;
    }
    if npv_high == 0.0 {
        return high;
    }
    if npv_low * npv_high > 0.0 {
        return 0.0;
    }

    let mut mid = 0.0;
    for _ in 0..IRR_ITERATIONS {
        mid = (low + high) / 2.0;
        let npv_mid = npv(mid, cash_flows);
        if npv_mid.abs() < IRR_TOLERANCE {
            return mid;
        }
        if npv_low * npv_mid < 0.0 {
            high = mid;
        } else {
            low = mid;
            npv_low = npv_mid;
        }
    }
    mid
}

pub fn equity_multiple(total_distributions: Decimal, equity_invested: Decimal) -> f64 {
    ratio(total_distributions, equity_invested)
}

pub fn cash_on_cash(annual_cash_flow: Decimal, equity_invested: Decimal) -> f64 {
    ratio(annual_cash_flow, equity_invested)
}

/// Debt service coverage; `None` when there is no debt service.
pub fn dscr(noi: Decimal, annual_debt_service: Decimal) -> Option<f64> {
    if annual_debt_service.is_zero() {
        return None;
    }
    Some(decimal_to_f64(noi / annual_debt_service))
}

pub fn ltv(loan_amount: Decimal, property_value: Decimal) -> f64 {
    ratio(loan_amount, property_value)
}

pub fn debt_yield(noi: Decimal, loan_amount: Decimal) -> f64 {
    ratio(noi, loan_amount)
}

pub fn cap_rate(noi: Decimal, purchase_price: Decimal) -> f64 {
    ratio(noi, purchase_price)
}

/// Annual debt service per dollar of loan for a monthly-amortizing loan.
pub fn loan_constant(annual_rate: f64, amortization_years: u32) -> f64 {
    if amortization_years == 0 {
        return 0.0;
    }
    let payments = f64::from(amortization_years * 12);
    let monthly_rate = annual_rate / 12.0;
    if monthly_rate == 0.0 {
        return 1.0 / f64::from(amortization_years);
    }
    let growth = (1.0 + monthly_rate).powf(payments);
    monthly_rate * growth / (growth - 1.0) * 12.0
}

pub fn mortgage_payment(principal: Decimal, annual_rate: f64, years: u32) -> Decimal {
    let payments = years * 12;
    if payments == 0 {
        return Decimal::ZERO;
    }
    let monthly_rate = annual_rate / 12.0;
    if monthly_rate == 0.0 {
        return round_currency(principal / Decimal::from(payments));
    }

    let growth = (1.0 + monthly_rate).powf(f64::from(payments));
    let factor = monthly_rate * growth / (growth - 1.0);
    round_currency(principal * Decimal::from_f64_retain(factor).unwrap_or(Decimal::ZERO))
}

/// Direct-capitalization value; zero when the cap rate is zero.
pub fn property_value(noi: Decimal, cap_rate: f64) -> Decimal {
    match Decimal::from_f64_retain(cap_rate) {
        Some(rate) if !rate.is_zero() => round_currency(noi / rate),
        _ => Decimal::ZERO,
    }
}

pub fn noi(effective_gross_income: Decimal, operating_expenses: Decimal) -> Decimal {
    effective_gross_income - operating_expenses
}

pub fn effective_gross_income(
    potential_gross_income: Decimal,
    vacancy_rate: f64,
    collection_loss: f64,
) -> Decimal {
    let retained = Decimal::from_f64_retain(1.0 - (vacancy_rate + collection_loss))
        .unwrap_or(Decimal::ZERO);
    round_currency(potential_gross_income * retained)
}

pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn ratio(numerator: Decimal, denominator: Decimal) -> f64 {
    if denominator.is_zero() {
        return 0.0;
    }
    decimal_to_f64(numerator / denominator)
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
