//! Time buckets and the watermark split shared by both aggregation levels.
//!
//! Buckets are epoch-aligned and keyed by their start time, so merging the
//! same data twice lands on the same key instead of appending a duplicate.

use crate::models::{Candle, Tick};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Floor a timestamp to the start of its `width`-sized bucket
pub fn bucket_start(timestamp: DateTime<Utc>, width: Duration) -> DateTime<Utc> {
    let width_ms = width.num_milliseconds().max(1);
    let ms = timestamp.timestamp_millis();
    let floored = ms - ms.rem_euclid(width_ms);
    DateTime::from_timestamp_millis(floored).unwrap_or(timestamp)
}

/// Boundary before which buckets are final
pub fn watermark(now: DateTime<Utc>, width: Duration) -> DateTime<Utc> {
    now - width
}

/// A bucket is complete once it lies entirely before the watermark
pub fn is_complete(start: DateTime<Utc>, now: DateTime<Utc>, width: Duration) -> bool {
    start + width <= watermark(now, width)
}

/// Ordered set of candles keyed by bucket start
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketSet {
    buckets: BTreeMap<DateTime<Utc>, Candle>,
}

impl BucketSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a tick into the bucket it belongs to
    pub fn insert_tick(&mut self, tick: &Tick, width: Duration) {
        let start = bucket_start(tick.timestamp, width);
        let candle = Candle::from_tick(start, tick);
        self.insert_candle(candle);
    }

    /// Insert a candle that is later than anything already held for its bucket
    pub fn insert_candle(&mut self, candle: Candle) {
        match self.buckets.get_mut(&candle.bucket_start) {
            Some(existing) => existing.absorb(&candle),
            None => {
                self.buckets.insert(candle.bucket_start, candle);
            }
        }
    }

    /// Union by bucket start; `later` wins wherever the combine rule is last-wins
    pub fn merge(&mut self, later: BucketSet) {
        for (_, candle) in later.buckets {
            self.insert_candle(candle);
        }
    }

    /// Re-aggregate finer candles into `width` buckets
    pub fn resample(candles: &[Candle], width: Duration) -> Self {
        let mut set = Self::new();
        for candle in candles {
            let start = bucket_start(candle.bucket_start, width);
            set.insert_candle(candle.rebucket(start));
        }
        set
    }

    /// Partition into completed candles (oldest first) and the still-open remainder
    pub fn split_at_watermark(self, now: DateTime<Utc>, width: Duration) -> (Vec<Candle>, BucketSet) {
        let mut complete = Vec::new();
        let mut remainder = BucketSet::new();

        for (start, candle) in self.buckets {
            if is_complete(start, now, width) {
                complete.push(candle);
            } else {
                remainder.buckets.insert(start, candle);
            }
        }

        (complete, remainder)
    }

    /// Drain everything regardless of the watermark
    pub fn into_candles(self) -> Vec<Candle> {
        self.buckets.into_values().collect()
    }

    pub fn get(&self, start: &DateTime<Utc>) -> Option<&Candle> {
        self.buckets.get(start)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.buckets.values()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
