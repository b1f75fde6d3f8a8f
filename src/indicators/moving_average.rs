use crate::models::Candle;

/// Calculate Simple Moving Average (SMA) over the last `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Moving-average crossover flag
///
/// Averages the close over the `sma_period + 1` most recent candles and
/// reports whether the latest close sits above that average.
pub fn sma_crossover(candles: &[Candle], sma_period: usize) -> Option<bool> {
    let lookback = sma_period + 1;
    if candles.len() < lookback {
        return None;
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let average = calculate_sma(&closes, lookback)?;
    let latest = *closes.last()?;

    Some(latest > average)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InstrumentId;
    use chrono::{Duration, TimeZone, Utc};

    fn create_test_candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                instrument: InstrumentId::from("TEST"),
                bucket_start: Utc.with_ymd_and_hms(2024, 3, 4, 9, 15, 0).unwrap()
                    + Duration::minutes(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
                open_interest: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let sma = calculate_sma(&prices, 5);
        assert_eq!(sma, Some(104.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        let sma = calculate_sma(&prices, 5);
        assert!(sma.is_none());
    }

    #[test]
    fn test_crossover_above_average() {
        let candles = create_test_candles(&[9.0, 10.0, 11.0]);
        assert_eq!(sma_crossover(&candles, 2), Some(true));
    }

    #[test]
    fn test_crossover_below_average() {
        // avg(10, 11, 5) = 8.67 and 5 is below it
        let candles = create_test_candles(&[9.0, 10.0, 11.0, 5.0]);
        assert_eq!(sma_crossover(&candles, 2), Some(false));
    }

    #[test]
    fn test_crossover_needs_period_plus_one() {
        let candles = create_test_candles(&[9.0, 10.0]);
        assert_eq!(sma_crossover(&candles, 2), None);
    }

    #[test]
    fn test_crossover_flat_is_not_above() {
        let candles = create_test_candles(&[10.0, 10.0, 10.0]);
        assert_eq!(sma_crossover(&candles, 2), Some(false));
    }
}
