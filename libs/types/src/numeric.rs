//! Integer arithmetic for amounts, prices and fees
//!
//! All amounts are integers in the relevant asset's smallest unit. Prices
//! carry an explicit `PRICE_CONSTANT` multiplier: a price of `2 *
//! PRICE_CONSTANT` means two price-asset units per amount-asset unit.
//! Intermediate products run in `u128` so no plausible market overflows.

/// Price multiplier: price-asset units per `PRICE_CONSTANT` amount units.
pub const PRICE_CONSTANT: u64 = 100_000_000;

/// Fee-asset rates are integers in millionths.
pub const RATE_CONSTANT: u64 = 1_000_000;

/// Price-asset value of `amount` at `price`.
pub fn quote_amount(amount: u64, price: u64) -> u128 {
    amount as u128 * price as u128 / PRICE_CONSTANT as u128
}

/// Fee owed for executing `executed` of an order's `total` amount:
/// `ceil(matcher_fee * executed / total)`. Callers clamp by the order's fee
/// remainder so the sum over fills never exceeds `matcher_fee`.
pub fn prorated_fee(matcher_fee: u64, executed: u64, total: u64) -> u64 {
    debug_assert!(total > 0);
    debug_assert!(executed <= total);
    let num = matcher_fee as u128 * executed as u128;
    num.div_ceil(total as u128) as u64
}

/// Minimum fee for `base_fee` given a fee-asset `rate` in millionths,
/// rounded up.
pub fn min_fee_for_rate(base_fee: u64, rate: u64) -> u64 {
    let num = base_fee as u128 * rate as u128;
    num.div_ceil(RATE_CONSTANT as u128) as u64
}

/// Snap `amount` onto the `step` grid with round-half-to-even, used when a
/// pair defines an amount step. `step <= 1` leaves the amount untouched.
/// A tie can round up past the input; callers trading a bounded remainder
/// step the result back down when it exceeds what is available.
pub fn snap_to_step(amount: u64, step: u64) -> u64 {
    if step <= 1 {
        return amount;
    }
    let down = amount / step * step;
    let rem = amount - down;
    match (rem * 2).cmp(&step) {
        std::cmp::Ordering::Less => down,
        std::cmp::Ordering::Greater => down + step,
        std::cmp::Ordering::Equal => {
            if (down / step) % 2 == 0 {
                down
            } else {
                down + step
            }
        }
    }
}
