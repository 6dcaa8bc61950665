//! Fixed-point quantity value objects.
//!
//! Money and length are both exchanged at the service boundary as decimal
//! values with two fractional digits. Internally they are `i64` counts of the
//! smallest unit (cents, hundredths of a length unit) so arithmetic is exact.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Monetary amount in cents (two implied decimal digits).
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

/// Material length in hundredths of a length unit.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Length(i64);

macro_rules! impl_fixed_point {
    ($t:ty, $unit:literal) => {
        impl $t {
            pub const ZERO: $t = Self(0);

            pub const fn from_hundredths(value: i64) -> Self {
                Self(value)
            }

            pub const fn hundredths(self) -> i64 {
                self.0
            }

            pub fn is_zero(self) -> bool {
                self.0 == 0
            }

            /// Parse a boundary decimal. Rejects non-finite and negative
            /// values; rounds to two fractional digits.
            pub fn parse_decimal(value: f64, field: &str) -> EngineResult<Self> {
                if !value.is_finite() {
                    return Err(EngineError::validation(format!(
                        "{field} must be a finite number"
                    )));
                }
                if value < 0.0 {
                    return Err(EngineError::validation(format!(
                        "{field} must not be negative"
                    )));
                }
                let hundredths = (value * 100.0).round();
                if hundredths > i64::MAX as f64 {
                    return Err(EngineError::validation(format!("{field} is too large")));
                }
                Ok(Self(hundredths as i64))
            }

            /// Boundary representation: decimal with two fractional digits.
            pub fn as_decimal(self) -> f64 {
                self.0 as f64 / 100.0
            }

            pub fn checked_add(self, other: Self) -> EngineResult<Self> {
                self.0
                    .checked_add(other.0)
                    .map(Self)
                    .ok_or_else(|| EngineError::validation(concat!($unit, " total overflow")))
            }

            pub fn checked_mul(self, factor: u32) -> EngineResult<Self> {
                self.0
                    .checked_mul(i64::from(factor))
                    .map(Self)
                    .ok_or_else(|| EngineError::validation(concat!($unit, " total overflow")))
            }

            pub fn saturating_sub(self, other: Self) -> Self {
                Self(self.0.saturating_sub(other.0).max(0))
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}.{:02}", self.0 / 100, (self.0 % 100).abs())
            }
        }
    };
}

impl_fixed_point!(Money, "money");
impl_fixed_point!(Length, "length");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_decimal_rounds_to_two_digits() {
        assert_eq!(
            Money::parse_decimal(10.006, "amount").unwrap().hundredths(),
            1001
        );
        assert_eq!(
            Money::parse_decimal(10.004, "amount").unwrap().hundredths(),
            1000
        );
        assert_eq!(Money::parse_decimal(0.1, "amount").unwrap().hundredths(), 10);
        assert_eq!(
            Money::parse_decimal(123.45, "amount").unwrap().hundredths(),
            12_345
        );
    }

    #[test]
    fn parse_decimal_rejects_negative_and_non_finite() {
        assert!(matches!(
            Money::parse_decimal(-1.0, "amount"),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            Money::parse_decimal(f64::NAN, "amount"),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            Length::parse_decimal(f64::INFINITY, "length"),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn display_has_two_fractional_digits() {
        assert_eq!(Money::from_hundredths(12345).to_string(), "123.45");
        assert_eq!(Money::from_hundredths(5).to_string(), "0.05");
        assert_eq!(Length::from_hundredths(100).to_string(), "1.00");
    }

    #[test]
    fn checked_arithmetic_flags_overflow() {
        let max = Money::from_hundredths(i64::MAX);
        assert!(max.checked_add(Money::from_hundredths(1)).is_err());
        assert!(max.checked_mul(2).is_err());
        assert_eq!(
            Money::from_hundredths(100)
                .saturating_sub(Money::from_hundredths(250))
                .hundredths(),
            0
        );
    }
}
