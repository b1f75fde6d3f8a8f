// Offline replay of tick streams against a pipeline on a simulated clock
pub mod synthetic;

pub use synthetic::{MarketScenario, SyntheticTickGenerator};

use crate::aggregation::bucket_start;
use crate::models::Tick;
use crate::pipeline::Pipeline;
use chrono::Duration;

/// Counters from a replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub ticks: usize,
    pub rejected: usize,
    pub flushes: usize,
    pub candles: usize,
}

/// Feed `ticks` through `pipeline`, flushing every `flush_every` of tick time.
///
/// The clock is driven by the tick timestamps, so a day of data replays in
/// moments. After the last tick the clock is advanced far enough for every
/// bucket to complete.
pub async fn replay(pipeline: &Pipeline, mut ticks: Vec<Tick>, flush_every: Duration) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    ticks.sort_by_key(|t| t.timestamp);

    let Some(first) = ticks.first() else {
        return summary;
    };
    let granularity = pipeline.config().granularity;
    let mut next_flush = bucket_start(first.timestamp, flush_every) + flush_every;
    let mut last = first.timestamp;

    for tick in ticks {
        while tick.timestamp >= next_flush {
            let reports = pipeline.flush_all(next_flush).await;
            summary.flushes += 1;
            summary.candles += reports.iter().map(|r| r.completed).sum::<usize>();
            next_flush += flush_every;
        }

        last = tick.timestamp;
        summary.ticks += 1;
        if pipeline.ingest(tick).is_err() {
            summary.rejected += 1;
        }
    }

    let settle = bucket_start(last, granularity) + granularity * 2;
    let reports = pipeline.flush_all(settle).await;
    summary.flushes += 1;
    summary.candles += reports.iter().map(|r| r.completed).sum::<usize>();

    tracing::info!(
        ticks = summary.ticks,
        rejected = summary.rejected,
        flushes = summary.flushes,
        candles = summary.candles,
        "Replay finished"
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InstrumentId, StrategyConfig};
    use crate::persistence::MemoryStore;
    use crate::pipeline::PipelineConfig;
    use crate::registry::tests::RecordingConsumer;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn strategy() -> StrategyConfig {
        StrategyConfig {
            timeframe: 1,
            sma_period: 3,
            rsi_period: 3,
            fast_period: 2,
            fast_multiplier: 1.0,
            slow_period: 3,
            slow_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_replay_uptrend_buys_call() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 3, 45, 0).unwrap();
        let id = InstrumentId::from("SIM");
        let store = MemoryStore::new().with_strategy("SIM", strategy());
        let pipeline = Pipeline::new(PipelineConfig::default());
        let signals = Arc::new(RecordingConsumer::default());
        pipeline.signal_registry().attach("recorder", signals.clone());
        pipeline.subscribe(id.clone(), &store, &store, start).await.unwrap();

        let ticks = SyntheticTickGenerator::new(42).generate(&id, MarketScenario::Uptrend, start, 20);
        let summary = replay(&pipeline, ticks, Duration::seconds(15)).await;

        assert_eq!(summary.ticks, 120);
        assert_eq!(summary.rejected, 0);
        assert_eq!(summary.candles, 20);

        let emitted = signals.signals();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0], crate::models::TradeSignal::buy_call(id));
    }

    #[tokio::test]
    async fn test_replay_downtrend_buys_put() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 3, 45, 0).unwrap();
        let id = InstrumentId::from("SIM");
        let store = MemoryStore::new().with_strategy("SIM", strategy());
        let pipeline = Pipeline::new(PipelineConfig::default());
        let signals = Arc::new(RecordingConsumer::default());
        pipeline.signal_registry().attach("recorder", signals.clone());
        pipeline.subscribe(id.clone(), &store, &store, start).await.unwrap();

        let ticks = SyntheticTickGenerator::new(42).generate(&id, MarketScenario::Downtrend, start, 20);
        let summary = replay(&pipeline, ticks, Duration::seconds(15)).await;

        assert_eq!(summary.candles, 20);
        assert_eq!(signals.signals(), vec![crate::models::TradeSignal::buy_put(id.clone())]);
        assert_eq!(pipeline.last_signal(&id), Some(crate::models::TradeSignal::buy_put(id)));
    }

    #[tokio::test]
    async fn test_replay_empty() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        assert_eq!(replay(&pipeline, Vec::new(), Duration::seconds(1)).await, ReplaySummary::default());
    }
}
