use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Round half-up to cents and pin the scale to 2 decimal places.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Validate a caller-supplied amount and normalize it to cents.
pub fn normalize_amount(amount: Decimal, field: &str) -> Result<Decimal> {
    if amount < Decimal::ZERO {
        return Err(EngineError::Validation(format!(
            "{field} must not be negative, got {amount}"
        )));
    }
    Ok(round_money(amount))
}

/// Insurer/patient split of a cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSplit {
    pub covered_amount: Decimal,
    pub patient_amount: Decimal,
}

impl CoverageSplit {
    pub fn total(&self) -> Decimal {
        self.covered_amount + self.patient_amount
    }
}

pub struct CoverageCalculator;

impl CoverageCalculator {
    /// Split `cost` by a whole-number coverage percentage.
    ///
    /// The covered amount is rounded; the patient amount is the exact
    /// remainder, so both always add back up to the (cent-normalized) cost.
    pub fn split(cost: Decimal, coverage_percentage: i64) -> Result<CoverageSplit> {
        if !(0..=100).contains(&coverage_percentage) {
            return Err(EngineError::Validation(format!(
                "coverage percentage must be within 0..=100, got {coverage_percentage}"
            )));
        }
        let cost = normalize_amount(cost, "cost")?;

        let covered = cost
            .checked_mul(Decimal::from(coverage_percentage))
            .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(|| {
                EngineError::Validation(format!("cost {cost} is too large to split"))
            })?;
        let covered_amount = round_money(covered);
        let patient_amount = cost - covered_amount;

        Ok(CoverageSplit {
            covered_amount,
            patient_amount,
        })
    }
}
