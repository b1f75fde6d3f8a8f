//! Supertrend: ATR envelope around the bar midpoint with a direction flag.
//!
//! The bands are path dependent. Rather than carrying band state between
//! evaluations, every call folds over the whole window it is given, so an
//! evicted or reset window can never leave stale bands behind.

use super::atr::rolling_atr;
use crate::models::Candle;

/// Supertrend state at one bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendPoint {
    /// Active band: lower band in an uptrend, upper band in a downtrend
    pub level: f64,
    pub upper: f64,
    pub lower: f64,
    pub is_uptrend: bool,
    pub close: f64,
}

impl SupertrendPoint {
    /// Close sits above the active trend level
    pub fn price_above(&self) -> bool {
        self.close > self.level
    }
}

/// Fold the supertrend over `candles`, one point per bar from index `period` on.
///
/// Direction starts up. It flips up when the close breaks above the previous
/// upper band and down when it breaks below the previous lower band. Otherwise
/// the direction persists and the trailing band ratchets: the lower band never
/// falls during an uptrend and the upper band never rises during a downtrend.
pub fn supertrend_series(candles: &[Candle], period: usize, multiplier: f64) -> Vec<SupertrendPoint> {
    let atr = rolling_atr(candles, period);
    let mut points: Vec<SupertrendPoint> = Vec::new();

    for (i, candle) in candles.iter().enumerate() {
        let Some(atr) = atr[i] else { continue };

        let envelope = multiplier * atr;
        let mid = candle.mid_price();
        let mut upper = mid + envelope;
        let mut lower = mid - envelope;
        let close = candle.close;

        let is_uptrend = match points.last() {
            None => true,
            Some(prev) if close > prev.upper => true,
            Some(prev) if close < prev.lower => false,
            Some(prev) => {
                if prev.is_uptrend && lower < prev.lower {
                    lower = prev.lower;
                }
                if !prev.is_uptrend && upper > prev.upper {
                    upper = prev.upper;
                }
                prev.is_uptrend
            }
        };

        points.push(SupertrendPoint {
            level: if is_uptrend { lower } else { upper },
            upper,
            lower,
            is_uptrend,
            close,
        });
    }

    points
}

/// Supertrend at the latest bar; `None` with fewer than `period + 1` candles
pub fn supertrend(candles: &[Candle], period: usize, multiplier: f64) -> Option<SupertrendPoint> {
    supertrend_series(candles, period, multiplier).last().copied()
}
