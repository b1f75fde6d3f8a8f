use super::{CandleSink, HistorySource, StrategySource};
use crate::models::{Candle, InstrumentId, StrategyConfig};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// In-process store for offline runs and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    strategies: RwLock<HashMap<InstrumentId, StrategyConfig>>,
    candles: RwLock<HashMap<InstrumentId, BTreeMap<DateTime<Utc>, Candle>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(self, instrument: impl Into<InstrumentId>, config: StrategyConfig) -> Self {
        self.set_strategy(instrument.into(), config);
        self
    }

    pub fn set_strategy(&self, instrument: InstrumentId, config: StrategyConfig) {
        if let Ok(mut strategies) = self.strategies.write() {
            strategies.insert(instrument, config);
        }
    }

    /// Store candles as if they had been written back earlier
    pub fn insert_candles(&self, candles: &[Candle]) {
        if let Ok(mut stored) = self.candles.write() {
            for candle in candles {
                stored
                    .entry(candle.instrument.clone())
                    .or_default()
                    .insert(candle.bucket_start, candle.clone());
            }
        }
    }

    /// All stored candles for an instrument, oldest first
    pub fn candles(&self, instrument: &InstrumentId) -> Vec<Candle> {
        self.candles
            .read()
            .ok()
            .and_then(|stored| stored.get(instrument).map(|c| c.values().cloned().collect()))
            .unwrap_or_default()
    }

    pub fn instruments(&self) -> Vec<InstrumentId> {
        let mut ids: Vec<InstrumentId> = self
            .strategies
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

impl StrategySource for MemoryStore {
    async fn load_strategy(&self, instrument: &InstrumentId) -> Result<Option<StrategyConfig>> {
        let strategies = self
            .strategies
            .read()
            .map_err(|_| "strategy table poisoned")?;
        Ok(strategies.get(instrument).cloned())
    }
}

impl HistorySource for MemoryStore {
    async fn load_recent_history(&self, instrument: &InstrumentId, count: usize) -> Result<Vec<Candle>> {
        let all = self.candles(instrument);
        let skip = all.len().saturating_sub(count);
        Ok(all.into_iter().skip(skip).collect())
    }
}

impl CandleSink for MemoryStore {
    async fn write_completed_candle(&self, candle: &Candle) -> Result<()> {
        self.insert_candles(std::slice::from_ref(candle));
        Ok(())
    }
}
