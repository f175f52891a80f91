//! Fixed-point monetary arithmetic.
//!
//! Every amount that is persisted or displayed passes through [`quantize`]:
//! two decimal places, half-up. Binary floats never touch money.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::errors::ServiceError;

/// Orders at or above this subtotal ship free.
pub const FREE_SHIPPING_THRESHOLD: Decimal = dec!(39.00);

/// Flat shipping rate below the free-shipping threshold.
pub const FLAT_SHIPPING: Decimal = dec!(4.90);

/// Quantize an amount to two decimal places, rounding half-up.
pub fn quantize(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Shipping owed for a given (already quantized) subtotal.
///
/// Zero subtotal ships free: an empty summary must not charge shipping.
pub fn shipping_for_subtotal(subtotal: Decimal) -> Decimal {
    if subtotal == Decimal::ZERO || subtotal >= FREE_SHIPPING_THRESHOLD {
        Decimal::ZERO
    } else {
        FLAT_SHIPPING
    }
}

/// Convert an amount to integer minor currency units (cents) for the
/// payment provider. Quantizes first so a stray third decimal cannot
/// shift the cent amount.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    let cents = (quantize(amount) * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    cents.to_i64().ok_or_else(|| {
        ServiceError::InternalError(format!("amount {} out of range for minor units", amount))
    })
}

/// Sale price derived from cost and markup percentage.
///
/// `price = cost × (1 + markup/100)`, quantized. Called explicitly at every
/// product save site; the stored price is never set independently.
pub fn compute_sale_price(cost_price: Decimal, markup_percent: Decimal) -> Decimal {
    quantize(cost_price * (Decimal::ONE + markup_percent / Decimal::ONE_HUNDRED))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_rounds_half_up() {
        assert_eq!(quantize(dec!(0.105)), dec!(0.11));
        assert_eq!(quantize(dec!(2.224)), dec!(2.22));
        assert_eq!(quantize(dec!(2.225)), dec!(2.23));
        assert_eq!(quantize(dec!(12.5)), dec!(12.50));
    }

    #[test]
    fn shipping_thresholds() {
        assert_eq!(shipping_for_subtotal(dec!(0.00)), dec!(0.00));
        assert_eq!(shipping_for_subtotal(dec!(38.99)), dec!(4.90));
        assert_eq!(shipping_for_subtotal(dec!(39.00)), dec!(0.00));
        assert_eq!(shipping_for_subtotal(dec!(120.00)), dec!(0.00));
    }

    #[test]
    fn minor_units_from_quantized_amounts() {
        assert_eq!(to_minor_units(dec!(12.50)).unwrap(), 1250);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(to_minor_units(dec!(39.00)).unwrap(), 3900);
        // quantization happens before the cent shift
        assert_eq!(to_minor_units(dec!(9.995)).unwrap(), 1000);
    }

    #[test]
    fn sale_price_from_cost_and_markup() {
        assert_eq!(compute_sale_price(dec!(10.00), dec!(25)), dec!(12.50));
        assert_eq!(compute_sale_price(dec!(7.33), dec!(0)), dec!(7.33));
        // 8.40 × 1.175 = 9.87
        assert_eq!(compute_sale_price(dec!(8.40), dec!(17.5)), dec!(9.87));
        assert_eq!(compute_sale_price(dec!(0.00), dec!(40)), dec!(0.00));
    }
}
