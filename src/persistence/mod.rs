// Storage collaborators: strategy bootstrap, candle history and write-back
pub mod memory;
pub mod redis_store;
pub mod writer;

pub use memory::MemoryStore;
pub use redis_store::RedisCandleStore;
pub use writer::PersistenceConsumer;

use crate::models::{Candle, InstrumentId, StrategyConfig};
use crate::Result;
use std::future::Future;

/// Where per-instrument strategy parameters come from
pub trait StrategySource: Send + Sync {
    /// `Ok(None)` when no configuration exists for the instrument
    fn load_strategy(
        &self,
        instrument: &InstrumentId,
    ) -> impl Future<Output = Result<Option<StrategyConfig>>> + Send;
}

/// Stored one-minute history used to pre-warm a window
pub trait HistorySource: Send + Sync {
    /// Up to `count` most recent candles, oldest first
    fn load_recent_history(
        &self,
        instrument: &InstrumentId,
        count: usize,
    ) -> impl Future<Output = Result<Vec<Candle>>> + Send;
}

/// Write-back target for completed candles
pub trait CandleSink: Send + Sync + 'static {
    fn write_completed_candle(&self, candle: &Candle) -> impl Future<Output = Result<()>> + Send;
}
