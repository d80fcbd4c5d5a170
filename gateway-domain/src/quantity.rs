//! Quantity normalization.
//!
//! Venues only accept amounts on a grid (lot size for orders, integer
//! multiple for withdrawals). `flatten` rounds an amount down onto that grid
//! using exact decimal arithmetic, optionally stepping further down so a
//! rejected order can be retried with a slightly smaller size.
//!
//! The grid step must be a power of ten (`0.001`, `1`, `10`). Steps such as
//! `0.5` are rejected rather than mis-rounded.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value_objects::DomainError;

/// Largest number of decimal places a step can have.
pub const MAX_PRECISION: u32 = 28;

// =============================================================================
// StepSize
// =============================================================================

/// Permitted increment for a traded or withdrawn quantity.
///
/// # Invariants
/// - `step > 0`
/// - `step` is a power of ten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct StepSize {
    step: Decimal,
    precision_digits: u32,
}

impl StepSize {
    /// Create a step size from its decimal increment (e.g. `0.001`).
    ///
    /// # Errors
    /// - `DomainError::InvalidQuantity` if `step <= 0`
    /// - `DomainError::NonDecimalStepSize` if `step` is not a power of ten
    pub fn new(step: Decimal) -> Result<Self, DomainError> {
        if step <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(format!(
                "Step size must be positive, got {}",
                step
            )));
        }

        let normalized = step.normalize();
        if !is_power_of_ten(normalized.mantissa()) {
            return Err(DomainError::NonDecimalStepSize(to_wire(step)));
        }

        Ok(Self {
            step: normalized,
            precision_digits: normalized.scale(),
        })
    }

    /// Create a step size from a number of decimal places (`3` → `0.001`).
    ///
    /// # Errors
    /// - `DomainError::PrecisionOutOfRange` if `digits > MAX_PRECISION`
    pub fn try_from_precision(digits: u32) -> Result<Self, DomainError> {
        if digits > MAX_PRECISION {
            return Err(DomainError::PrecisionOutOfRange(digits));
        }

        Ok(Self {
            step: Decimal::new(1, digits),
            precision_digits: digits,
        })
    }

    /// The increment itself.
    pub fn step(&self) -> Decimal {
        self.step
    }

    /// Number of decimal places the step allows.
    pub fn precision_digits(&self) -> u32 {
        self.precision_digits
    }

    /// Round `amount` down onto this grid, `steps_down` extra steps lower.
    pub fn flatten(&self, amount: Decimal, steps_down: u32) -> Result<Decimal, DomainError> {
        if amount < Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(format!(
                "Amount must not be negative, got {}",
                amount
            )));
        }

        let leaves_nothing = || {
            DomainError::InvalidQuantity(format!(
                "Stepping {} down by {} x {} leaves nothing",
                amount, steps_down, self.step
            ))
        };
        let reduced = self
            .step
            .checked_mul(Decimal::from(steps_down))
            .and_then(|lowered| amount.checked_sub(lowered))
            .ok_or_else(leaves_nothing)?;
        if reduced < Decimal::ZERO {
            return Err(leaves_nothing());
        }

        let units = reduced.checked_div(self.step).ok_or_else(|| {
            DomainError::InvalidQuantity(format!(
                "{} is too large for a step of {}",
                amount, self.step
            ))
        })?;

        Ok((units.floor() * self.step).normalize())
    }
}

impl TryFrom<Decimal> for StepSize {
    type Error = DomainError;

    fn try_from(step: Decimal) -> Result<Self, Self::Error> {
        Self::new(step)
    }
}

impl From<StepSize> for Decimal {
    fn from(step: StepSize) -> Self {
        step.step
    }
}

/// Round `amount` down to a multiple of `step`, `steps_down` steps lower.
///
/// # Examples
/// ```
/// # use gateway_domain::quantity::flatten;
/// # use rust_decimal_macros::dec;
/// assert_eq!(flatten(dec!(1.23456), dec!(0.001), 0).unwrap(), dec!(1.234));
/// assert_eq!(flatten(dec!(1.23456), dec!(0.001), 2).unwrap(), dec!(1.232));
/// ```
///
/// # Errors
/// See [`StepSize::new`] and [`StepSize::flatten`].
pub fn flatten(amount: Decimal, step: Decimal, steps_down: u32) -> Result<Decimal, DomainError> {
    StepSize::new(step)?.flatten(amount, steps_down)
}

/// Render a decimal for the wire: plain notation, no trailing zeros,
/// independent of any locale.
pub fn to_wire(value: Decimal) -> String {
    value.normalize().to_string()
}

fn is_power_of_ten(mantissa: i128) -> bool {
    let mut m = mantissa;
    if m <= 0 {
        return false;
    }
    while m % 10 == 0 {
        m /= 10;
    }
    m == 1
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_flatten_examples() {
        assert_eq!(flatten(dec!(1.23456), dec!(0.001), 0).unwrap(), dec!(1.234));
        assert_eq!(flatten(dec!(1.23456), dec!(0.001), 2).unwrap(), dec!(1.232));
    }

    #[test]
    fn test_flatten_never_exceeds_amount_and_lands_on_grid() {
        let steps = [dec!(0.00000001), dec!(0.0001), dec!(0.01), dec!(1), dec!(10)];
        let amounts = [dec!(0), dec!(0.00012345), dec!(7.77777777), dec!(12345.6789), dec!(99.99)];

        for step in steps {
            for amount in amounts {
                let flat = flatten(amount, step, 0).unwrap();
                assert!(flat <= amount, "{} > {} for step {}", flat, amount, step);
                assert_eq!(flat % step, Decimal::ZERO, "{} not a multiple of {}", flat, step);
                assert!(amount - flat < step);
            }
        }
    }

    #[test]
    fn test_flatten_exact_multiple_unchanged() {
        assert_eq!(flatten(dec!(5.000), dec!(0.001), 0).unwrap(), dec!(5));
    }

    #[test]
    fn test_flatten_trailing_zero_step() {
        // Binance reports steps like "0.00100000"
        assert_eq!(flatten(dec!(0.123456), dec!(0.00100000), 0).unwrap(), dec!(0.123));
    }

    #[test]
    fn test_flatten_integer_steps() {
        assert_eq!(flatten(dec!(1234.5), dec!(1), 0).unwrap(), dec!(1234));
        assert_eq!(flatten(dec!(1234.5), dec!(10), 0).unwrap(), dec!(1230));
        assert_eq!(flatten(dec!(1234.5), dec!(10), 1).unwrap(), dec!(1220));
    }

    #[test]
    fn test_non_decimal_step_rejected() {
        assert!(matches!(
            flatten(dec!(1.3), dec!(0.5), 0),
            Err(DomainError::NonDecimalStepSize(_))
        ));
        assert!(matches!(
            StepSize::new(dec!(0.25)),
            Err(DomainError::NonDecimalStepSize(_))
        ));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(flatten(dec!(1), dec!(0), 0), Err(DomainError::InvalidQuantity(_))));
        assert!(matches!(flatten(dec!(1), dec!(-0.1), 0), Err(DomainError::InvalidQuantity(_))));
        assert!(matches!(flatten(dec!(-1), dec!(0.1), 0), Err(DomainError::InvalidQuantity(_))));
        assert!(matches!(
            flatten(dec!(0.002), dec!(0.001), 3),
            Err(DomainError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn test_step_size_precision() {
        let step = StepSize::new(dec!(0.0100)).unwrap();
        assert_eq!(step.step(), dec!(0.01));
        assert_eq!(step.precision_digits(), 2);

        let from_digits = StepSize::try_from_precision(4).unwrap();
        assert_eq!(from_digits.step(), dec!(0.0001));
        assert_eq!(from_digits.flatten(dec!(3.14159), 0).unwrap(), dec!(3.1415));

        assert_eq!(StepSize::try_from_precision(28).unwrap().precision_digits(), 28);
    }

    #[test]
    fn test_precision_beyond_decimal_scale_rejected() {
        assert_eq!(
            StepSize::try_from_precision(29),
            Err(DomainError::PrecisionOutOfRange(29))
        );
        assert_eq!(
            StepSize::try_from_precision(u32::MAX),
            Err(DomainError::PrecisionOutOfRange(u32::MAX))
        );
    }

    #[test]
    fn test_flatten_overflow_is_an_error() {
        let tiny = StepSize::try_from_precision(28).unwrap();
        assert!(matches!(tiny.flatten(Decimal::MAX, 0), Err(DomainError::InvalidQuantity(_))));

        let huge = StepSize::new(dec!(10000000000000000000000000000)).unwrap();
        assert!(matches!(
            huge.flatten(dec!(1), u32::MAX),
            Err(DomainError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn test_step_size_deserializes_through_validation() {
        let step: StepSize = serde_json::from_str("\"0.001\"").unwrap();
        assert_eq!(step.step(), dec!(0.001));
        assert_eq!(step.precision_digits(), 3);

        assert!(serde_json::from_str::<StepSize>("\"0.5\"").is_err());
        assert!(serde_json::from_str::<StepSize>("\"0\"").is_err());
    }

    #[test]
    fn test_to_wire_plain_notation() {
        assert_eq!(to_wire(dec!(1.2340)), "1.234");
        assert_eq!(to_wire(dec!(100)), "100");
        assert_eq!(to_wire(dec!(0.00000001)), "0.00000001");
        assert_eq!(to_wire(dec!(0.000)), "0");
    }
}
