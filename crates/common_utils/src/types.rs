//! Shared wire types.

use serde::{Deserialize, Serialize};

use crate::errors::{CustomResult, ValidationError};

/// An amount in the smallest unit of its currency (cents, aurar, ...).
///
/// Every adapter normalizes to this representation; the wallet processor's
/// decimal-string amounts are converted at the mapping boundary.
#[derive(
    Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MinorUnit(i64);

impl MinorUnit {
    /// Wrap a raw minor-unit amount.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The raw minor-unit amount.
    pub fn get_amount_as_i64(self) -> i64 {
        self.0
    }

    /// Parse a major-unit decimal string (`"12.34"`) for a two-exponent
    /// currency into minor units (`1234`). Fails on malformed input or more
    /// than two fractional digits.
    pub fn from_major_string(value: &str) -> CustomResult<Self, ValidationError> {
        let invalid = || {
            error_stack::report!(ValidationError::IncorrectValueProvided {
                field_name: "amount",
            })
        };

        let (sign, digits) = match value.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, value),
        };
        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits, ""),
        };
        if whole.is_empty() || fraction.len() > 2 {
            return Err(invalid());
        }
        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let fraction: i64 = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{fraction:0<2}");
            padded.parse().map_err(|_| invalid())?
        };

        Ok(Self(sign * (whole * 100 + fraction)))
    }
}

impl std::fmt::Display for MinorUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn major_string_conversions() {
        assert_eq!(MinorUnit::from_major_string("12.34").unwrap(), MinorUnit(1234));
        assert_eq!(MinorUnit::from_major_string("12.3").unwrap(), MinorUnit(1230));
        assert_eq!(MinorUnit::from_major_string("12").unwrap(), MinorUnit(1200));
        assert_eq!(MinorUnit::from_major_string("0.05").unwrap(), MinorUnit(5));
        assert_eq!(MinorUnit::from_major_string("-3.50").unwrap(), MinorUnit(-350));
    }

    #[test]
    fn malformed_major_strings_are_rejected() {
        assert!(MinorUnit::from_major_string("").is_err());
        assert!(MinorUnit::from_major_string(".50").is_err());
        assert!(MinorUnit::from_major_string("12.345").is_err());
        assert!(MinorUnit::from_major_string("twelve").is_err());
    }
}
