//! Currency arithmetic helpers.
//!
//! Amounts are `Decimal` end to end. Rounding happens once, at the edge of a
//! computation, never per term.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round to 2 decimal places, half away from zero (sign preserved).
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Largest amount a bill, tax, discount or posting may carry (`NUMERIC(14, 2)`).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x107A_3FFF, 0x5AF3, 0, false, 2);

/// Exact sum of `values`, rounded once at the end. `None` on overflow.
pub fn checked_sum<I>(values: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .map(round2)
}

/// Exact sum of `values`, rounded once at the end; saturates instead of overflowing.
pub fn sum<I>(values: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    round2(values.into_iter().fold(Decimal::ZERO, |acc, v| acc.saturating_add(v)))
}

/// Whether `value` fits the stored amount columns.
pub fn in_range(value: Decimal) -> bool {
    value.abs() <= MAX_AMOUNT
}

/// `max(0, value)`.
pub fn non_negative(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}
