use super::{signals::IndicatorSnapshot, Strategy};
use crate::indicators::{rsi_threshold, sma_crossover, supertrend};
use crate::models::{Candle, StrategyConfig};

/// SMA + RSI + dual Supertrend strategy
///
/// Every evaluation recomputes all indicators from the window it is given.
#[derive(Debug, Clone)]
pub struct TrendStrategy {
    config: StrategyConfig,
}

impl TrendStrategy {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }
}

impl Strategy for TrendStrategy {
    fn name(&self) -> &str {
        "TrendStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.config.window_capacity()
    }

    fn evaluate(&self, candles: &[Candle]) -> Option<IndicatorSnapshot> {
        if candles.len() < self.min_candles_required() {
            return None;
        }

        let cfg = &self.config;
        let close = candles.last()?.close;

        let sma_above = sma_crossover(candles, cfg.sma_period)?;
        let rsi_bullish = rsi_threshold(candles, cfg.rsi_period)?;
        let fast = supertrend(candles, cfg.fast_period, cfg.fast_multiplier)?;
        let slow = supertrend(candles, cfg.slow_period, cfg.slow_multiplier)?;

        Some(IndicatorSnapshot {
            close,
            sma_above,
            rsi_bullish,
            fast,
            slow,
        })
    }
}
