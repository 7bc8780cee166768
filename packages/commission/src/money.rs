//! Fixed-point money helpers

use crate::types::LineItem;
use rust_decimal::{Decimal, RoundingStrategy};

/// Currency precision of persisted amounts
pub const CENTS_SCALE: u32 = 2;

/// Round to cents, half-up
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CENTS_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `sum(commissionable_value * quantity)` at full precision
pub fn sum_commissionable_value(items: &[LineItem]) -> Decimal {
    items
        .iter()
        .map(|item| item.commissionable_value * Decimal::from(item.quantity))
        .sum()
}
