//! Input-validation adapter between form payloads and the core.
//!
//! Form submissions carry numeric fields as either bare numbers or
//! strings depending on the input widget. The core only ever sees
//! validated decimals; everything upstream of that boundary lands here.

use crate::error::{BillingError, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

/// A numeric form field as submitted: a bare number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumericField {
    Number(f64),
    Text(String),
}

impl NumericField {
    /// Coerce to a finite, non-negative decimal.
    pub fn into_reading(self, field: &str) -> Result<Decimal> {
        let value = match self {
            NumericField::Number(n) => {
                if !n.is_finite() {
                    return Err(invalid(field, "value must be a finite number"));
                }
                Decimal::from_f64(n).ok_or_else(|| invalid(field, "value is out of range"))?
            }
            NumericField::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(invalid(field, "value is required"));
                }
                trimmed
                    .parse::<Decimal>()
                    .map_err(|e| invalid(field, &format!("invalid decimal value: {e}")))?
            }
        };

        if value < Decimal::ZERO {
            return Err(invalid(field, "value must be non-negative"));
        }

        Ok(value)
    }
}

fn invalid(field: &str, message: &str) -> BillingError {
    BillingError::ValidationError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Raw bill-creation form, prior to validation.
#[derive(Debug, Clone, Deserialize)]
pub struct BillReadingsInput {
    pub previous_reading: NumericField,
    pub current_reading: NumericField,
    #[serde(default)]
    pub penalty_applied: bool,
}

/// Validated counterpart of [`BillReadingsInput`].
#[derive(Debug, Clone, Copy)]
pub struct ValidatedReadings {
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
    pub penalty_applied: bool,
}

impl BillReadingsInput {
    pub fn validate(self) -> Result<ValidatedReadings> {
        Ok(ValidatedReadings {
            previous_reading: self.previous_reading.into_reading("previous_reading")?,
            current_reading: self.current_reading.into_reading("current_reading")?,
            penalty_applied: self.penalty_applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_accepts_numbers_and_strings() {
        let input: BillReadingsInput = serde_json::from_value(serde_json::json!({
            "previous_reading": "100",
            "current_reading": 120.5,
        }))
        .unwrap();

        let validated = input.validate().unwrap();
        assert_eq!(validated.previous_reading, dec!(100));
        assert_eq!(validated.current_reading, dec!(120.5));
        assert!(!validated.penalty_applied);
    }

    #[test]
    fn test_trims_string_input() {
        let value = NumericField::Text("  42.5  ".to_string());
        assert_eq!(value.into_reading("reading").unwrap(), dec!(42.5));
    }

    #[test]
    fn test_rejects_empty_string() {
        let err = NumericField::Text("   ".to_string())
            .into_reading("current_reading")
            .unwrap_err();
        assert!(matches!(err, BillingError::ValidationError { ref field, .. } if field == "current_reading"));
    }

    #[test]
    fn test_rejects_garbage_text() {
        let err = NumericField::Text("12abc".to_string())
            .into_reading("reading")
            .unwrap_err();
        assert!(matches!(err, BillingError::ValidationError { .. }));
    }

    #[test]
    fn test_rejects_non_finite_numbers() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = NumericField::Number(bad).into_reading("reading").unwrap_err();
            assert!(matches!(err, BillingError::ValidationError { .. }));
        }
    }

    #[test]
    fn test_rejects_negative_values() {
        let err = NumericField::Number(-1.0).into_reading("reading").unwrap_err();
        assert!(matches!(err, BillingError::ValidationError { .. }));

        let err = NumericField::Text("-5".to_string())
            .into_reading("reading")
            .unwrap_err();
        assert!(matches!(err, BillingError::ValidationError { .. }));
    }
}
