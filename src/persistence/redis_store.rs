use super::{CandleSink, HistorySource};
use crate::models::{Candle, InstrumentId};
use crate::Result;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

/// Stored form of a one-minute candle
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCandle {
    bucket_start: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    open_interest: f64,
}

impl StoredCandle {
    fn into_candle(self, instrument: &InstrumentId) -> Candle {
        Candle {
            instrument: instrument.clone(),
            bucket_start: self.bucket_start,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            open_interest: self.open_interest,
        }
    }
}

impl From<&Candle> for StoredCandle {
    fn from(candle: &Candle) -> Self {
        Self {
            bucket_start: candle.bucket_start,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            open_interest: candle.open_interest,
        }
    }
}

fn key(instrument: &InstrumentId) -> String {
    format!("ohlcv:{}", instrument)
}

/// Redis candle history
///
/// Uses sorted sets scored by bucket start (epoch seconds), one per instrument
#[derive(Clone)]
pub struct RedisCandleStore {
    conn: ConnectionManager,
}

impl RedisCandleStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    /// Store a candle, replacing any earlier write for the same bucket
    pub async fn save_candle(&self, candle: &Candle) -> Result<()> {
        let key = key(&candle.instrument);
        let score = candle.bucket_start.timestamp() as f64;
        let value = serde_json::to_string(&StoredCandle::from(candle))?;

        let mut conn = self.conn.clone();
        conn.zrembyscore::<_, _, _, ()>(&key, score, score).await?;
        conn.zadd::<_, _, _, ()>(&key, value, score).await?;

        Ok(())
    }

    /// Load up to `count` most recent candles, oldest first
    pub async fn load_recent(&self, instrument: &InstrumentId, count: usize) -> Result<Vec<Candle>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let results: Vec<String> = conn
            .zrange(key(instrument), -(count as isize), -1)
            .await?;

        let mut candles = Vec::with_capacity(results.len());
        for json_str in results {
            let stored: StoredCandle = serde_json::from_str(&json_str)?;
            candles.push(stored.into_candle(instrument));
        }

        tracing::info!(
            instrument = %instrument,
            loaded = candles.len(),
            "Loaded historical candles from Redis"
        );

        Ok(candles)
    }

    /// Clean up old candles to prevent unbounded growth
    ///
    /// Removes candles whose bucket started more than `keep_minutes` ago
    pub async fn cleanup_old(&self, instrument: &InstrumentId, keep_minutes: i64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::minutes(keep_minutes);
        let max_score = cutoff.timestamp() as f64;

        let mut conn = self.conn.clone();
        let removed: usize = conn.zrembyscore(key(instrument), "-inf", max_score).await?;

        if removed > 0 {
            tracing::debug!(instrument = %instrument, removed, "Cleaned up old candles");
        }

        Ok(removed)
    }

    /// Get count of stored candles for an instrument
    pub async fn count_candles(&self, instrument: &InstrumentId) -> Result<usize> {
        let mut conn = self.conn.clone();
        let count: usize = conn.zcard(key(instrument)).await?;
        Ok(count)
    }
}

impl HistorySource for RedisCandleStore {
    async fn load_recent_history(&self, instrument: &InstrumentId, count: usize) -> Result<Vec<Candle>> {
        self.load_recent(instrument, count).await
    }
}

impl CandleSink for RedisCandleStore {
    async fn write_completed_candle(&self, candle: &Candle) -> Result<()> {
        self.save_candle(candle).await
    }
}
