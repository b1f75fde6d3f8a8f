//! Tick ingestion front of the pipeline.
//!
//! Every instrument gets an unbounded inbox. The feed callback only validates
//! and enqueues; the flush is the single writer that drains the inbox into the
//! aggregator and publishes completed candles.

use crate::aggregation::CandleAggregator;
use crate::error::{PipelineError, TickError};
use crate::models::{InstrumentId, Tick};
use crate::registry::{PipelineEvent, SubscriptionRegistry};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;

/// What a single flush did for one instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub instrument: InstrumentId,
    /// Ticks drained from the inbox
    pub ticks: usize,
    /// Completed candles published
    pub completed: usize,
    /// Buckets still held as incomplete
    pub remainder: usize,
}

struct FeedCore {
    inbox: mpsc::UnboundedReceiver<Tick>,
    aggregator: CandleAggregator,
}

impl FeedCore {
    fn drain(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(tick) = self.inbox.try_recv() {
            self.aggregator.push(tick);
            drained += 1;
        }
        drained
    }
}

struct FeedSlot {
    sender: mpsc::UnboundedSender<Tick>,
    core: Mutex<FeedCore>,
}

/// Per-instrument tick buffers and candle aggregators
pub struct FeedStage {
    granularity: Duration,
    max_clock_skew: Duration,
    slots: RwLock<HashMap<InstrumentId, Arc<FeedSlot>>>,
    candles: Arc<SubscriptionRegistry>,
}

impl FeedStage {
    pub fn new(
        granularity: Duration,
        max_clock_skew: Duration,
        candles: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            granularity,
            max_clock_skew,
            slots: RwLock::new(HashMap::new()),
            candles,
        }
    }

    pub fn granularity(&self) -> Duration {
        self.granularity
    }

    /// Start accepting ticks for `instrument`. Returns false if already open.
    pub fn open(&self, instrument: InstrumentId) -> bool {
        let mut slots = self
            .slots
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slots.contains_key(&instrument) {
            return false;
        }

        let (sender, inbox) = mpsc::unbounded_channel();
        let aggregator = CandleAggregator::new(instrument.clone(), self.granularity, self.max_clock_skew);
        slots.insert(
            instrument,
            Arc::new(FeedSlot {
                sender,
                core: Mutex::new(FeedCore { inbox, aggregator }),
            }),
        );
        true
    }

    pub fn is_open(&self, instrument: &InstrumentId) -> bool {
        self.slots
            .read()
            .map(|slots| slots.contains_key(instrument))
            .unwrap_or(false)
    }

    pub fn instruments(&self) -> Vec<InstrumentId> {
        self.slots
            .read()
            .map(|slots| slots.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Validate and enqueue a tick. Never waits on aggregation state.
    pub fn ingest(&self, tick: Tick) -> Result<(), TickError> {
        tick.validate()?;

        let slot = self
            .slot(&tick.instrument)
            .ok_or_else(|| TickError::UnknownInstrument(tick.instrument.clone()))?;

        slot.sender
            .send(tick)
            .map_err(|rejected| TickError::Closed(rejected.0.instrument))
    }

    /// Drain the inbox, aggregate, and publish candles complete at `now`
    pub fn flush_instrument(
        &self,
        instrument: &InstrumentId,
        now: DateTime<Utc>,
    ) -> Result<FlushReport, PipelineError> {
        let slot = self
            .slot(instrument)
            .ok_or_else(|| PipelineError::NotSubscribed(instrument.clone()))?;

        // Held while publishing so candles reach consumers in bucket order
        let mut core = slot
            .core
            .lock()
            .map_err(|_| PipelineError::StatePoisoned(instrument.clone()))?;

        let ticks = core.drain();
        let completed = core.aggregator.flush(now);
        for candle in &completed {
            self.candles.publish(&PipelineEvent::CandleCompleted {
                candle: candle.clone(),
                as_of: now,
            });
        }

        let report = FlushReport {
            instrument: instrument.clone(),
            ticks,
            completed: completed.len(),
            remainder: core.aggregator.remainder().len(),
        };
        tracing::debug!(
            instrument = %instrument,
            ticks = report.ticks,
            completed = report.completed,
            remainder = report.remainder,
            "Flushed"
        );

        Ok(report)
    }

    /// Stop accepting ticks, wait out any in-flight flush, then publish
    /// everything still held as a best-effort final completion stamped `now`.
    pub fn close(&self, instrument: &InstrumentId, now: DateTime<Utc>) -> Result<FlushReport, PipelineError> {
        let slot = {
            let mut slots = self
                .slots
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slots
                .remove(instrument)
                .ok_or_else(|| PipelineError::NotSubscribed(instrument.clone()))?
        };

        let mut core = slot
            .core
            .lock()
            .map_err(|_| PipelineError::StatePoisoned(instrument.clone()))?;

        core.inbox.close();
        let ticks = core.drain();
        let remaining = core.aggregator.flush_final();
        for candle in &remaining {
            self.candles.publish(&PipelineEvent::CandleCompleted {
                candle: candle.clone(),
                as_of: now,
            });
        }

        tracing::info!(
            instrument = %instrument,
            ticks,
            final_candles = remaining.len(),
            "Feed closed"
        );

        Ok(FlushReport {
            instrument: instrument.clone(),
            ticks,
            completed: remaining.len(),
            remainder: 0,
        })
    }

    fn slot(&self, instrument: &InstrumentId) -> Option<Arc<FeedSlot>> {
        self.slots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(instrument)
            .cloned()
    }
}
