//! Common types used across Waterline components

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for meter number validation
#[derive(Debug, Error)]
pub enum MeterNumberError {
    #[error("Meter number cannot be empty")]
    Empty,
    #[error("Meter number too long (max 32 characters)")]
    TooLong,
    #[error("Meter number contains invalid characters. Only alphanumeric characters and hyphens are allowed")]
    InvalidCharacters,
}

/// A validated meter number
///
/// Meter numbers must:
/// - Be between 1 and 32 characters long
/// - Only contain alphanumeric characters (a-z, A-Z, 0-9) and hyphens (-)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MeterNumber(String);

impl MeterNumber {
    /// Create a new validated meter number
    pub fn new(number: impl Into<String>) -> Result<Self, MeterNumberError> {
        let number = number.into();
        Self::validate(&number)?;
        Ok(Self(number))
    }

    /// Validate a meter number
    fn validate(number: &str) -> Result<(), MeterNumberError> {
        if number.is_empty() {
            return Err(MeterNumberError::Empty);
        }

        if number.len() > 32 {
            return Err(MeterNumberError::TooLong);
        }

        // Check each character is alphanumeric or a hyphen
        if !number.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(MeterNumberError::InvalidCharacters);
        }

        Ok(())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for MeterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MeterNumber {
    type Err = MeterNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for MeterNumber {
    type Error = MeterNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MeterNumber> for String {
    fn from(number: MeterNumber) -> Self {
        number.0
    }
}

impl AsRef<str> for MeterNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
