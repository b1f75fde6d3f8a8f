//! Per-instrument pipeline arena.
//!
//! Owns the feed stage, both registries and one slot per subscribed
//! instrument. Subscribing wires an [`IndicatorStage`] into the candle
//! registry; unsubscribing tears it down in drain-before-detach order.

pub mod scheduler;

pub use scheduler::spawn_flush_loop;

use crate::error::{PipelineError, TickError};
use crate::feed::{FeedStage, FlushReport};
use crate::models::{Candle, InstrumentId, StrategyConfig, Tick, TradeSignal};
use crate::persistence::{HistorySource, StrategySource};
use crate::registry::{SubscriptionId, SubscriptionRegistry, Tag};
use crate::strategy::IndicatorStage;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Runtime knobs for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Width of the base candles built from ticks
    pub granularity: Duration,
    /// How far ahead of the flush clock a tick may be stamped
    pub max_clock_skew: Duration,
    /// Upper bound on instruments flushed in parallel
    pub max_concurrent_flushes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            granularity: Duration::minutes(1),
            max_clock_skew: Duration::seconds(5),
            max_concurrent_flushes: 4,
        }
    }
}

/// Outcome of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Aggregating and evaluating indicators
    Active,
    /// Aggregating only; no usable strategy configuration yet
    Degraded,
}

struct IndicatorHandle {
    stage: Arc<IndicatorStage>,
    subscription: SubscriptionId,
}

#[derive(Default)]
struct InstrumentSlot {
    indicator: Option<IndicatorHandle>,
}

impl InstrumentSlot {
    fn state(&self) -> SubscriptionState {
        if self.indicator.is_some() {
            SubscriptionState::Active
        } else {
            SubscriptionState::Degraded
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    feed: Arc<FeedStage>,
    candles: Arc<SubscriptionRegistry>,
    signals: Arc<SubscriptionRegistry>,
    slots: RwLock<HashMap<InstrumentId, InstrumentSlot>>,
    flush_permits: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let candles = Arc::new(SubscriptionRegistry::new());
        let signals = Arc::new(SubscriptionRegistry::new());
        let feed = Arc::new(FeedStage::new(
            config.granularity,
            config.max_clock_skew,
            Arc::clone(&candles),
        ));
        let flush_permits = Arc::new(Semaphore::new(config.max_concurrent_flushes.max(1)));

        Self {
            config,
            feed,
            candles,
            signals,
            slots: RwLock::new(HashMap::new()),
            flush_permits,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Registry carrying `CandleCompleted` events
    pub fn candle_registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.candles
    }

    /// Registry carrying `SignalChanged` events
    pub fn signal_registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.signals
    }

    /// Start aggregating ticks for `instrument`.
    ///
    /// Loads the strategy and pre-warms the window from stored history. A
    /// missing or invalid strategy is not fatal: the instrument still
    /// aggregates (and persists) candles in the `Degraded` state.
    pub async fn subscribe<S, H>(
        &self,
        instrument: InstrumentId,
        strategies: &S,
        history: &H,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionState, PipelineError>
    where
        S: StrategySource,
        H: HistorySource,
    {
        if self.contains(&instrument) {
            return Err(PipelineError::AlreadySubscribed(instrument));
        }

        let config = match strategies.load_strategy(&instrument).await {
            Ok(Some(config)) => match config.validate() {
                Ok(()) => Some(config),
                Err(reason) => {
                    tracing::warn!(instrument = %instrument, %reason, "Invalid strategy, subscribing degraded");
                    None
                }
            },
            Ok(None) => {
                tracing::warn!(instrument = %instrument, "No strategy configured, subscribing degraded");
                None
            }
            Err(e) => {
                tracing::warn!(instrument = %instrument, "Failed to load strategy, subscribing degraded: {}", e);
                None
            }
        };

        let stage = match config {
            Some(config) => {
                let candles = load_history(&instrument, &config, history).await;
                Some(self.build_stage(&instrument, config, &candles, now))
            }
            None => None,
        };

        {
            let mut slots = self.slots_mut();
            if slots.contains_key(&instrument) {
                return Err(PipelineError::AlreadySubscribed(instrument));
            }
            let indicator = stage.map(|stage| self.attach_stage(stage));
            slots.insert(instrument.clone(), InstrumentSlot { indicator });
        }
        self.feed.open(instrument.clone());

        let state = self.state(&instrument).unwrap_or(SubscriptionState::Degraded);
        tracing::info!(instrument = %instrument, state = ?state, "Subscribed");
        Ok(state)
    }

    /// Supply a strategy for a degraded instrument, activating indicator evaluation.
    ///
    /// An instrument that is already active keeps its existing strategy.
    pub async fn configure<H: HistorySource>(
        &self,
        instrument: &InstrumentId,
        config: StrategyConfig,
        history: &H,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionState, PipelineError> {
        config
            .validate()
            .map_err(|reason| PipelineError::InvalidStrategy {
                instrument: instrument.clone(),
                reason,
            })?;

        match self.state(instrument) {
            None => return Err(PipelineError::NotSubscribed(instrument.clone())),
            Some(SubscriptionState::Active) => {
                tracing::debug!(instrument = %instrument, "Already active, configuration ignored");
                return Ok(SubscriptionState::Active);
            }
            Some(SubscriptionState::Degraded) => {}
        }

        let candles = load_history(instrument, &config, history).await;
        let stage = self.build_stage(instrument, config, &candles, now);

        let mut slots = self.slots_mut();
        let slot = slots
            .get_mut(instrument)
            .ok_or_else(|| PipelineError::NotSubscribed(instrument.clone()))?;
        if slot.indicator.is_none() {
            slot.indicator = Some(self.attach_stage(stage));
            tracing::info!(instrument = %instrument, "Strategy configured, instrument active");
        }

        Ok(SubscriptionState::Active)
    }

    /// Hand a tick to the feed stage. Rejected ticks are logged and returned.
    pub fn ingest(&self, tick: Tick) -> Result<(), TickError> {
        let result = if self.contains(&tick.instrument) {
            self.feed.ingest(tick)
        } else if self.feed.is_open(&tick.instrument) {
            Err(TickError::Closed(tick.instrument))
        } else {
            Err(TickError::UnknownInstrument(tick.instrument))
        };

        if let Err(e) = &result {
            tracing::warn!("Dropping tick: {}", e);
        }
        result
    }

    pub fn flush_instrument(
        &self,
        instrument: &InstrumentId,
        now: DateTime<Utc>,
    ) -> Result<FlushReport, PipelineError> {
        self.feed.flush_instrument(instrument, now)
    }

    /// Flush every subscribed instrument at `now`.
    ///
    /// Each instrument is flushed on the blocking pool, at most
    /// `max_concurrent_flushes` at a time. A failure or panic in one
    /// instrument is logged and does not affect the others.
    pub async fn flush_all(&self, now: DateTime<Utc>) -> Vec<FlushReport> {
        let mut tasks = JoinSet::new();

        for instrument in self.instruments() {
            let Ok(permit) = Arc::clone(&self.flush_permits).acquire_owned().await else {
                break;
            };
            let feed = Arc::clone(&self.feed);

            tasks.spawn_blocking(move || {
                let _permit = permit;
                let result = feed.flush_instrument(&instrument, now);
                (instrument, result)
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => reports.push(report),
                Ok((instrument, Err(PipelineError::NotSubscribed(_)))) => {
                    tracing::debug!(instrument = %instrument, "Unsubscribed during flush");
                }
                Ok((instrument, Err(e))) => {
                    tracing::error!(instrument = %instrument, "Flush failed: {}", e);
                }
                Err(e) => tracing::error!("Flush worker panicked: {}", e),
            }
        }

        let ticks: usize = reports.iter().map(|r| r.ticks).sum();
        let completed: usize = reports.iter().map(|r| r.completed).sum();
        tracing::debug!(instruments = reports.len(), ticks, completed, "Flush cycle");

        reports
    }

    /// Stop an instrument and release all of its state.
    ///
    /// New ticks are refused first. The indicator stage is detached, any
    /// in-flight flush is waited out, and whatever is still buffered is
    /// flushed as a final completion to the remaining candle consumers
    /// (persistence) without further evaluation.
    pub fn unsubscribe(&self, instrument: &InstrumentId, now: DateTime<Utc>) -> Result<FlushReport, PipelineError> {
        let slot = self
            .slots_mut()
            .remove(instrument)
            .ok_or_else(|| PipelineError::NotSubscribed(instrument.clone()))?;

        if let Some(handle) = &slot.indicator {
            self.candles
                .detach(&Tag::Instrument(instrument.clone()), handle.subscription);
        }

        let report = self.feed.close(instrument, now);

        let tag = Tag::Instrument(instrument.clone());
        let detached = self.candles.detach_tag(&tag) + self.signals.detach_tag(&tag);
        drop(slot);

        match &report {
            Ok(r) => tracing::info!(
                instrument = %instrument,
                final_candles = r.completed,
                detached,
                "Unsubscribed"
            ),
            Err(e) => tracing::error!(instrument = %instrument, "Unsubscribed with failed final flush: {}", e),
        }

        report
    }

    /// Drain and detach every instrument
    pub fn stop(&self, now: DateTime<Utc>) -> Vec<FlushReport> {
        let mut reports = Vec::new();
        for instrument in self.instruments() {
            match self.unsubscribe(&instrument, now) {
                Ok(report) => reports.push(report),
                Err(PipelineError::NotSubscribed(_)) => {}
                Err(e) => tracing::error!(instrument = %instrument, "Stop failed: {}", e),
            }
        }
        tracing::info!(instruments = reports.len(), "Pipeline stopped");
        reports
    }

    /// Subscribed instruments, sorted
    pub fn instruments(&self) -> Vec<InstrumentId> {
        let mut ids: Vec<InstrumentId> = self
            .slots
            .read()
            .map(|slots| slots.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn state(&self, instrument: &InstrumentId) -> Option<SubscriptionState> {
        self.slots
            .read()
            .ok()
            .and_then(|slots| slots.get(instrument).map(InstrumentSlot::state))
    }

    pub fn is_active(&self, instrument: &InstrumentId) -> bool {
        self.state(instrument) == Some(SubscriptionState::Active)
    }

    /// Last signal emitted for an active instrument
    pub fn last_signal(&self, instrument: &InstrumentId) -> Option<TradeSignal> {
        let stage = self.slots.read().ok().and_then(|slots| {
            slots
                .get(instrument)
                .and_then(|slot| slot.indicator.as_ref().map(|h| Arc::clone(&h.stage)))
        })?;
        stage.last_signal()
    }

    fn contains(&self, instrument: &InstrumentId) -> bool {
        self.slots
            .read()
            .map(|slots| slots.contains_key(instrument))
            .unwrap_or(false)
    }

    fn slots_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<InstrumentId, InstrumentSlot>> {
        self.slots
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn build_stage(
        &self,
        instrument: &InstrumentId,
        config: StrategyConfig,
        history: &[Candle],
        now: DateTime<Utc>,
    ) -> Arc<IndicatorStage> {
        let stage = Arc::new(IndicatorStage::new(
            instrument.clone(),
            config,
            Arc::clone(&self.signals),
        ));
        stage.prewarm(history, now);
        stage
    }

    fn attach_stage(&self, stage: Arc<IndicatorStage>) -> IndicatorHandle {
        let tag = Tag::Instrument(stage.instrument().clone());
        let subscription = self.candles.attach(tag, stage.clone());
        IndicatorHandle {
            stage,
            subscription,
        }
    }
}

async fn load_history<H: HistorySource>(
    instrument: &InstrumentId,
    config: &StrategyConfig,
    history: &H,
) -> Vec<Candle> {
    match history
        .load_recent_history(instrument, config.history_minutes())
        .await
    {
        Ok(candles) => candles,
        Err(e) => {
            tracing::warn!(instrument = %instrument, "Failed to load history, starting cold: {}", e);
            Vec::new()
        }
    }
}
