use super::RollingWindow;
use crate::aggregation::BucketSet;
use crate::models::{Candle, InstrumentId, StrategyConfig};
use chrono::{DateTime, Duration, Utc};

/// Second aggregation level: one-minute candles resampled to the
/// strategy timeframe, then folded into the bounded window.
#[derive(Debug, Clone)]
pub struct WindowStore {
    instrument: InstrumentId,
    timeframe: Duration,
    window: RollingWindow,
    remainder: BucketSet,
    last_appended: Option<DateTime<Utc>>,
}

impl WindowStore {
    pub fn new(instrument: InstrumentId, strategy: &StrategyConfig) -> Self {
        Self {
            instrument,
            timeframe: strategy.timeframe_duration(),
            window: RollingWindow::new(strategy.window_capacity()),
            remainder: BucketSet::new(),
            last_appended: None,
        }
    }

    /// Seed the window from stored one-minute history
    ///
    /// Returns the number of timeframe candles appended.
    pub fn prewarm(&mut self, history: &[Candle], now: DateTime<Utc>) -> usize {
        let appended = self.absorb(history, now);

        tracing::debug!(
            instrument = %self.instrument,
            history = history.len(),
            appended,
            window = self.window.len(),
            "Pre-warmed rolling window"
        );

        appended
    }

    /// Fold newly completed one-minute candles into the window.
    ///
    /// Returns true when at least one timeframe candle was appended and the
    /// window holds enough candles for indicator evaluation.
    pub fn apply_completed(&mut self, candles: &[Candle], now: DateTime<Utc>) -> bool {
        let appended = self.absorb(candles, now);
        appended > 0 && self.window.is_full()
    }

    fn absorb(&mut self, candles: &[Candle], now: DateTime<Utc>) -> usize {
        let resampled = BucketSet::resample(candles, self.timeframe);

        let mut merged = std::mem::take(&mut self.remainder);
        merged.merge(resampled);

        let (complete, remainder) = merged.split_at_watermark(now, self.timeframe);
        self.remainder = remainder;

        let mut appended = 0;
        for candle in complete {
            if self.last_appended.is_some_and(|last| candle.bucket_start <= last) {
                tracing::warn!(
                    instrument = %self.instrument,
                    bucket = %candle.bucket_start,
                    "Ignoring candle older than the window head"
                );
                continue;
            }
            self.last_appended = Some(candle.bucket_start);
            self.window.push(candle);
            appended += 1;
        }

        appended
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn remainder_len(&self) -> usize {
        self.remainder.len()
    }

    pub fn is_ready(&self) -> bool {
        self.window.is_full()
    }

    pub fn timeframe(&self) -> Duration {
        self.timeframe
    }
}
