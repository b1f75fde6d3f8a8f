use super::bucket::{bucket_start, BucketSet};
use crate::models::{Candle, InstrumentId, Tick};
use chrono::{DateTime, Duration, Utc};

/// Turns one instrument's tick stream into fixed-width candles.
///
/// Ticks accumulate in `pending` until a flush. A flush merges them with
/// the incomplete remainder held from earlier flushes and emits only the
/// buckets that have aged past the watermark.
#[derive(Debug)]
pub struct CandleAggregator {
    instrument: InstrumentId,
    granularity: Duration,
    max_clock_skew: Duration,
    pending: Vec<Tick>,
    remainder: BucketSet,
    finalized_through: Option<DateTime<Utc>>,
}

impl CandleAggregator {
    pub fn new(instrument: InstrumentId, granularity: Duration, max_clock_skew: Duration) -> Self {
        Self {
            instrument,
            granularity,
            max_clock_skew,
            pending: Vec::new(),
            remainder: BucketSet::new(),
            finalized_through: None,
        }
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    pub fn granularity(&self) -> Duration {
        self.granularity
    }

    /// Queue a tick for the next flush
    pub fn push(&mut self, tick: Tick) {
        self.pending.push(tick);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Buckets still accumulating
    pub fn remainder(&self) -> &BucketSet {
        &self.remainder
    }

    /// Start of the newest bucket already emitted as complete
    pub fn finalized_through(&self) -> Option<DateTime<Utc>> {
        self.finalized_through
    }

    /// Merge pending ticks and emit every bucket that is complete at `now`
    pub fn flush(&mut self, now: DateTime<Utc>) -> Vec<Candle> {
        let fresh = self.bucket_pending(Some(now));

        let mut merged = std::mem::take(&mut self.remainder);
        merged.merge(fresh);

        let (complete, remainder) = merged.split_at_watermark(now, self.granularity);
        self.remainder = remainder;

        if let Some(last) = complete.last() {
            self.finalized_through = Some(last.bucket_start);
            tracing::debug!(
                instrument = %self.instrument,
                completed = complete.len(),
                through = %last.bucket_start,
                "Buckets aged past watermark"
            );
        }

        complete
    }

    /// Emit everything held, complete or not. Used when the instrument is torn down.
    pub fn flush_final(&mut self) -> Vec<Candle> {
        let fresh = self.bucket_pending(None);

        let mut merged = std::mem::take(&mut self.remainder);
        merged.merge(fresh);

        let candles = merged.into_candles();
        if let Some(last) = candles.last() {
            self.finalized_through = Some(last.bucket_start);
        }
        candles
    }

    fn bucket_pending(&mut self, now: Option<DateTime<Utc>>) -> BucketSet {
        let mut ticks = std::mem::take(&mut self.pending);
        // Stable: arrival order breaks timestamp ties
        ticks.sort_by_key(|t| t.timestamp);

        let mut fresh = BucketSet::new();
        for tick in &ticks {
            if let Some(now) = now {
                if tick.timestamp > now + self.max_clock_skew {
                    tracing::warn!(
                        instrument = %self.instrument,
                        timestamp = %tick.timestamp,
                        now = %now,
                        "Dropping tick from the future"
                    );
                    continue;
                }
            }

            let start = bucket_start(tick.timestamp, self.granularity);
            if self.finalized_through.is_some_and(|f| start <= f) {
                tracing::warn!(
                    instrument = %self.instrument,
                    timestamp = %tick.timestamp,
                    "Dropping late tick for an already completed bucket"
                );
                continue;
            }

            fresh.insert_tick(tick, self.granularity);
        }

        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
    }

    fn create_aggregator() -> CandleAggregator {
        CandleAggregator::new(
            InstrumentId::from("NIFTY"),
            Duration::minutes(1),
            Duration::seconds(5),
        )
    }

    fn tick(ts: DateTime<Utc>, price: f64) -> Tick {
        Tick::new("NIFTY", ts, price, 1000.0, 20.0)
    }

    #[test]
    fn test_ohlc_from_arrival_order() {
        let mut agg = create_aggregator();
        agg.push(tick(at(9, 15, 1), 10.0));
        agg.push(tick(at(9, 15, 2), 15.0));
        agg.push(tick(at(9, 15, 3), 8.0));
        agg.push(tick(at(9, 15, 4), 12.0));

        let completed = agg.flush(at(9, 17, 0));

        assert_eq!(completed.len(), 1);
        let candle = &completed[0];
        assert_eq!(candle.bucket_start, at(9, 15, 0));
        assert_eq!(candle.open, 10.0);
        assert_eq!(candle.high, 15.0);
        assert_eq!(candle.low, 8.0);
        assert_eq!(candle.close, 12.0);
    }

    #[test]
    fn test_volume_and_open_interest_are_last_reported() {
        let mut agg = create_aggregator();
        agg.push(Tick::new("NIFTY", at(9, 15, 1), 10.0, 100.0, 7.0));
        agg.push(Tick::new("NIFTY", at(9, 15, 9), 11.0, 250.0, 9.0));

        let completed = agg.flush(at(9, 18, 0));
        assert_eq!(completed[0].volume, 250.0);
        assert_eq!(completed[0].open_interest, 9.0);
    }

    #[test]
    fn test_watermark_boundary() {
        let mut agg = create_aggregator();
        agg.push(tick(at(9, 15, 0), 100.0));
        agg.push(tick(at(9, 15, 59), 101.0));

        assert!(agg.flush(at(9, 16, 0)).is_empty());
        assert!(agg.flush(at(9, 16, 59)).is_empty());
        assert_eq!(agg.remainder().len(), 1);

        let completed = agg.flush(at(9, 17, 0));
        assert_eq!(completed.len(), 1);
        assert!(agg.remainder().is_empty());
    }

    #[test]
    fn test_repeated_flush_is_idempotent() {
        let mut agg = create_aggregator();
        agg.push(tick(at(9, 15, 10), 100.0));
        agg.push(tick(at(9, 16, 10), 101.0));
        agg.push(tick(at(9, 17, 10), 102.0));

        let now = at(9, 17, 30);
        let first = agg.flush(now);
        let remainder_after_first = agg.remainder().clone();
        let second = agg.flush(now);

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(agg.remainder(), &remainder_after_first);
    }

    #[test]
    fn test_duplicate_ticks_are_tolerated() {
        let mut agg = create_aggregator();
        let t = tick(at(9, 15, 10), 100.0);
        agg.push(t.clone());
        agg.push(tick(at(9, 15, 20), 103.0));
        agg.push(t.clone());
        agg.push(t);

        let completed = agg.flush(at(9, 20, 0));
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].high, 103.0);
        assert_eq!(completed[0].low, 100.0);
        assert_eq!(completed[0].close, 103.0);
    }

    #[test]
    fn test_remainder_absorbs_later_ticks() {
        let mut agg = create_aggregator();
        agg.push(tick(at(9, 15, 10), 100.0));
        assert!(agg.flush(at(9, 15, 30)).is_empty());

        agg.push(tick(at(9, 15, 40), 97.0));
        let completed = agg.flush(at(9, 17, 0));

        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].open, 100.0);
        assert_eq!(completed[0].low, 97.0);
        assert_eq!(completed[0].close, 97.0);
    }

    #[test]
    fn test_late_tick_for_emitted_bucket_is_dropped() {
        let mut agg = create_aggregator();
        agg.push(tick(at(9, 15, 10), 100.0));
        assert_eq!(agg.flush(at(9, 17, 0)).len(), 1);

        agg.push(tick(at(9, 15, 50), 500.0));
        assert!(agg.flush(at(9, 17, 5)).is_empty());
        assert!(agg.remainder().is_empty());
        assert_eq!(agg.finalized_through(), Some(at(9, 15, 0)));
    }

    #[test]
    fn test_future_tick_is_dropped() {
        let mut agg = create_aggregator();
        agg.push(tick(at(10, 0, 0), 100.0));

        assert!(agg.flush(at(9, 15, 0)).is_empty());
        assert!(agg.remainder().is_empty());
    }

    #[test]
    fn test_out_of_order_arrival_sorted_by_time() {
        let mut agg = create_aggregator();
        agg.push(tick(at(9, 15, 30), 12.0));
        agg.push(tick(at(9, 15, 5), 10.0));

        let completed = agg.flush(at(9, 17, 0));
        assert_eq!(completed[0].open, 10.0);
        assert_eq!(completed[0].close, 12.0);
    }

    #[test]
    fn test_flush_final_emits_incomplete_buckets() {
        let mut agg = create_aggregator();
        agg.push(tick(at(9, 15, 10), 100.0));
        assert!(agg.flush(at(9, 15, 30)).is_empty());
        agg.push(tick(at(9, 16, 10), 101.0));

        let final_candles = agg.flush_final();
        assert_eq!(final_candles.len(), 2);
        assert!(agg.remainder().is_empty());
        assert_eq!(agg.pending_len(), 0);
    }
}
