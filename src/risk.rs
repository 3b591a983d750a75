// =============================================================================
// Risk calculator — pure R arithmetic on integer cents
// =============================================================================
//
// R is the price distance between entry and stop, the unit of risk. All
// functions here are pure and operate on integer cents; R-multiples are the
// only floating-point values and are rounded to two decimals with a
// multiply-round-divide so persisted values are exact.
// =============================================================================

use crate::market_data::Candle;
use crate::types::Direction;

/// Round an R-multiple to two decimals (half away from zero).
pub fn round_r(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The R-value of a position: `|entry - stop|` in cents.
pub fn compute_r_value(entry_price: i64, stop_level: i64) -> i64 {
    (entry_price - stop_level).abs()
}

/// Price of the k-R target in the trade direction.
pub fn compute_target_price(entry_price: i64, r_value: i64, k: i64, direction: Direction) -> i64 {
    entry_price + direction.sign() * k * r_value
}

/// P&L of an exit expressed in R units, signed by direction and rounded to
/// two decimals. Returns 0.0 when `r_value` is zero (the machine rejects
/// such entries before any trade exists).
pub fn compute_r_multiple(
    entry_price: i64,
    exit_price: i64,
    r_value: i64,
    direction: Direction,
) -> f64 {
    if r_value == 0 {
        return 0.0;
    }
    let signed = (direction.sign() * (exit_price - entry_price)) as f64;
    round_r(signed / r_value as f64)
}

/// Maximum favorable excursion across `bars`, in R units (never negative:
/// a trade that only moved against us has an MFE of 0).
pub fn compute_mfe(bars: &[Candle], entry_price: i64, r_value: i64, direction: Direction) -> f64 {
    if r_value == 0 {
        return 0.0;
    }
    let best = bars
        .iter()
        .map(|bar| match direction {
            Direction::Long => bar.high - entry_price,
            Direction::Short => entry_price - bar.low,
        })
        .max()
        .unwrap_or(0)
        .max(0);
    round_r(best as f64 / r_value as f64)
}

/// Maximum adverse excursion across `bars`, in R units, as a non-negative
/// magnitude.
pub fn compute_mae(bars: &[Candle], entry_price: i64, r_value: i64, direction: Direction) -> f64 {
    if r_value == 0 {
        return 0.0;
    }
    let worst = bars
        .iter()
        .map(|bar| match direction {
            Direction::Long => entry_price - bar.low,
            Direction::Short => bar.high - entry_price,
        })
        .max()
        .unwrap_or(0)
        .max(0);
    round_r(worst as f64 / r_value as f64)
}

/// Convert integer cents to display dollars.
pub fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Convert dollars to integer cents (rounded to the nearest cent).
pub fn dollars_to_cents(dollars: f64) -> i64 {
    (dollars * 100.0).round() as i64
}
