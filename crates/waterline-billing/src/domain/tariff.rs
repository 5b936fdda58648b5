use crate::domain::types::Money;
use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Rate card for one billing cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffSchedule {
    /// Charge per cubic meter consumed.
    pub rate_per_unit: Decimal,
    /// Discount fraction for qualifying senior customers.
    pub senior_discount_rate: Decimal,
    /// Consumption ceiling (m3) above which the senior discount forfeits
    /// entirely. Not prorated.
    pub senior_consumption_cap: Decimal,
    /// Penalty fraction, charged on the base amount.
    pub penalty_rate: Decimal,
}

impl Default for TariffSchedule {
    fn default() -> Self {
        Self {
            rate_per_unit: dec!(50),
            senior_discount_rate: dec!(0.20),
            senior_consumption_cap: dec!(30),
            penalty_rate: dec!(0.10),
        }
    }
}

/// Line amounts derived from a pair of meter readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BillTotals {
    pub consumption: Decimal,
    pub base_amount: Money,
    pub senior_discount: Money,
    pub penalty_amount: Money,
    pub amount_due: Money,
}

impl TariffSchedule {
    /// Compute a bill's amounts from raw meter readings.
    ///
    /// Readings must be non-negative; a current reading below the previous
    /// one clamps consumption to zero rather than failing, since rejecting
    /// it is the caller's validation concern.
    pub fn compute(
        &self,
        previous_reading: Decimal,
        current_reading: Decimal,
        is_senior: bool,
        penalty_applied: bool,
    ) -> Result<BillTotals> {
        if previous_reading < Decimal::ZERO {
            return Err(BillingError::ValidationError {
                field: "previous_reading".to_string(),
                message: format!("reading must be non-negative, got {previous_reading}"),
            });
        }
        if current_reading < Decimal::ZERO {
            return Err(BillingError::ValidationError {
                field: "current_reading".to_string(),
                message: format!("reading must be non-negative, got {current_reading}"),
            });
        }

        let consumption = (current_reading - previous_reading).max(Decimal::ZERO);

        let base_amount = Money::from_decimal(consumption * self.rate_per_unit);

        // All-or-nothing: above the cap the discount forfeits entirely.
        let senior_discount = if is_senior && consumption <= self.senior_consumption_cap {
            Money::from_decimal(base_amount.as_decimal() * self.senior_discount_rate)
        } else {
            Money::zero()
        };

        // Charged on the base amount, never the discounted amount.
        let penalty_amount = if penalty_applied {
            Money::from_decimal(base_amount.as_decimal() * self.penalty_rate)
        } else {
            Money::zero()
        };

        // discount <= base and penalty >= 0, so this cannot go negative
        let amount_due = base_amount
            .subtract(senior_discount)
            .unwrap_or(Money::zero())
            .add(penalty_amount);

        Ok(BillTotals {
            consumption,
            base_amount,
            senior_discount,
            penalty_amount,
            amount_due,
        })
    }
}
