//! Average True Range (ATR) helpers
//!
//! True Range is the greatest of:
//! - Current High - Current Low
//! - Abs(Current High - Previous Close)
//! - Abs(Current Low - Previous Close)

use crate::models::Candle;

/// True range per bar. The first bar has no previous close, so it uses high - low.
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    let mut true_ranges = Vec::with_capacity(candles.len());

    for i in 0..candles.len() {
        let high = candles[i].high;
        let low = candles[i].low;

        let tr = if i == 0 {
            high - low
        } else {
            let prev_close = candles[i - 1].close;
            (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs())
        };

        true_ranges.push(tr);
    }

    true_ranges
}

/// Rolling ATR aligned with `candles`
///
/// Bar `i` (for `i >= period`) gets the mean of the `period` true ranges
/// ending at `i`, i.e. it is computed from the `period + 1` candles ending
/// at that bar. Earlier bars are `None`.
pub fn rolling_atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut atr = vec![None; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return atr;
    }

    let true_ranges = true_range(candles);
    for i in period..candles.len() {
        let window = &true_ranges[i + 1 - period..=i];
        atr[i] = Some(window.iter().sum::<f64>() / period as f64);
    }

    atr
}

/// ATR of the latest bar
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    rolling_atr(candles, period).last().copied().flatten()
}
