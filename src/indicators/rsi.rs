use crate::models::Candle;

/// Calculate Relative Strength Index (RSI)
///
/// The first average gain/loss is the simple mean of the first `period`
/// changes; any further changes are folded in with Wilder's smoothing.
///
/// Returns `None` with fewer than `period + 1` prices, or when the prices
/// never moved (RSI is undefined without gains or losses).
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);

    // Calculate price changes
    for i in 1..prices.len() {
        let change = prices[i] - prices[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let p = period as f64;
    let mut avg_gain: f64 = gains.iter().take(period).sum::<f64>() / p;
    let mut avg_loss: f64 = losses.iter().take(period).sum::<f64>() / p;

    for i in period..gains.len() {
        avg_gain = (avg_gain * (p - 1.0) + gains[i]) / p;
        avg_loss = (avg_loss * (p - 1.0) + losses[i]) / p;
    }

    if avg_gain == 0.0 && avg_loss == 0.0 {
        return None;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    let rsi = 100.0 - (100.0 / (1.0 + rs));

    Some(rsi)
}

/// Momentum threshold flag: RSI over the `rsi_period + 1` most recent closes is at least 50
pub fn rsi_threshold(candles: &[Candle], rsi_period: usize) -> Option<bool> {
    let lookback = rsi_period + 1;
    if candles.len() < lookback {
        return None;
    }

    let closes: Vec<f64> = candles[candles.len() - lookback..]
        .iter()
        .map(|c| c.close)
        .collect();

    calculate_rsi(&closes, rsi_period).map(|rsi| rsi >= 50.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_seed_is_simple_mean_of_first_changes() {
        // Changes +2, -1, +3: avg_gain 5/3, avg_loss 1/3, RS 5
        let prices = vec![100.0, 102.0, 101.0, 104.0];
        let rsi = calculate_rsi(&prices, 3).unwrap();
        assert!((rsi - 250.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_needs_period_plus_one_prices() {
        let prices = vec![100.0, 102.0, 101.0];
        assert!(calculate_rsi(&prices, 3).is_none());
        assert!(calculate_rsi(&prices, 0).is_none());

        // Exactly period + 1: gains 2, 0 and losses 0, 1 give RS 2
        let rsi = calculate_rsi(&prices, 2).unwrap();
        assert!((rsi - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_smoothing_keeps_old_losses_after_gains() {
        // Seed over (-1, +2): avg_gain 1, avg_loss 0.5
        // Then +2: avg_gain (1 + 2) / 2 = 1.5, avg_loss 0.5 / 2 = 0.25
        let prices = vec![100.0, 99.0, 101.0, 103.0];
        let rsi = calculate_rsi(&prices, 2).unwrap();
        assert!((rsi - (100.0 - 100.0 / 7.0)).abs() < 1e-9);
        assert!(rsi < 100.0);
    }

    #[test]
    fn test_rsi_threshold_reads_only_the_tail() {
        use crate::models::InstrumentId;
        use chrono::{TimeZone, Utc};

        let candles: Vec<Candle> = [100.0, 90.0, 91.0, 92.0]
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                instrument: InstrumentId::from("X"),
                bucket_start: Utc.with_ymd_and_hms(2024, 3, 4, 9, 15 + i as u32, 0).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
                open_interest: 0.0,
            })
            .collect();

        // The -10 drop falls outside the last three closes
        assert_eq!(rsi_threshold(&candles, 2), Some(true));
        assert_eq!(rsi_threshold(&candles, 3), Some(false));
        assert_eq!(rsi_threshold(&candles, 4), None);
    }

    #[test]
    fn test_rsi_all_losses() {
        let prices = vec![105.0, 104.0, 103.0, 102.0];
        assert_eq!(calculate_rsi(&prices, 3), Some(0.0));
    }

    #[test]
    fn test_rsi_flat_prices_have_no_signal() {
        let prices = vec![100.0; 6];
        assert!(calculate_rsi(&prices, 5).is_none());
    }

    #[test]
    fn test_rsi_balanced_moves_hit_fifty() {
        let prices = vec![100.0, 101.0, 100.0];
        assert_eq!(calculate_rsi(&prices, 2), Some(50.0));
    }

    #[test]
    fn test_wilder_smoothing_beyond_seed() {
        // Seed over 2 changes (+1, -1), then a +2 move is smoothed in
        let prices = vec![100.0, 101.0, 100.0, 102.0];
        let rsi = calculate_rsi(&prices, 2).unwrap();
        // avg_gain = (0.5 + 2) / 2 = 1.25, avg_loss = 0.25
        let expected = 100.0 - 100.0 / (1.0 + 1.25 / 0.25);
        assert!((rsi - expected).abs() < 1e-9);
    }
}
