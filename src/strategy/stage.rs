use super::{SignalDebouncer, Strategy, TrendStrategy};
use crate::models::{Candle, InstrumentId, StrategyConfig, TradeSignal};
use crate::registry::{EventConsumer, PipelineEvent, SubscriptionRegistry};
use crate::window::WindowStore;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

struct StageState {
    store: WindowStore,
    strategy: TrendStrategy,
    debouncer: SignalDebouncer,
}

/// Indicator stage for one instrument
///
/// Attached to the candle registry under the instrument's tag. Each completed
/// one-minute candle is folded into the rolling window; once a timeframe
/// candle lands in a full window the strategy is evaluated and any change in
/// the combined signal is published to the signal registry.
pub struct IndicatorStage {
    instrument: InstrumentId,
    state: Mutex<StageState>,
    signals: Arc<SubscriptionRegistry>,
}

impl IndicatorStage {
    pub fn new(
        instrument: InstrumentId,
        config: StrategyConfig,
        signals: Arc<SubscriptionRegistry>,
    ) -> Self {
        let state = StageState {
            store: WindowStore::new(instrument.clone(), &config),
            strategy: TrendStrategy::new(config),
            debouncer: SignalDebouncer::new(),
        };

        Self {
            instrument,
            state: Mutex::new(state),
            signals,
        }
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    /// Seed the window from stored one-minute history
    pub fn prewarm(&self, history: &[Candle], now: DateTime<Utc>) -> usize {
        match self.state.lock() {
            Ok(mut state) => state.store.prewarm(history, now),
            Err(_) => {
                tracing::error!(instrument = %self.instrument, "Indicator state poisoned, skipping pre-warm");
                0
            }
        }
    }

    /// Apply one completed candle and publish the signal if it changed.
    ///
    /// Returns the published signal, if any.
    pub fn on_candle(&self, candle: &Candle, as_of: DateTime<Utc>) -> Option<TradeSignal> {
        let changed = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(_) => {
                    tracing::error!(instrument = %self.instrument, "Indicator state poisoned, candle dropped");
                    return None;
                }
            };

            if !state.store.apply_completed(std::slice::from_ref(candle), as_of) {
                return None;
            }

            let window = state.store.window().candles();
            let Some(snapshot) = state.strategy.evaluate(&window) else {
                tracing::debug!(
                    instrument = %self.instrument,
                    "Indicators undefined for current window, no signal"
                );
                return None;
            };

            let signal = snapshot.decide(self.instrument.clone());
            tracing::debug!(
                instrument = %self.instrument,
                close = snapshot.close,
                flags = ?snapshot.flags(),
                fast_level = snapshot.fast.level,
                slow_level = snapshot.slow.level,
                "Indicators evaluated"
            );

            let changed = state.debouncer.observe(signal);
            if changed.is_none() {
                tracing::debug!(instrument = %self.instrument, "Signal unchanged, suppressed");
            }
            changed
        };

        let signal = changed?;
        tracing::info!(
            instrument = %self.instrument,
            action = ?signal.action,
            side = ?signal.option_side,
            "Signal changed"
        );
        self.signals.publish(&PipelineEvent::SignalChanged(signal.clone()));
        Some(signal)
    }

    pub fn last_signal(&self) -> Option<TradeSignal> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.debouncer.last().cloned())
    }

    pub fn window_len(&self) -> usize {
        self.state.lock().map(|s| s.store.window().len()).unwrap_or(0)
    }
}

impl EventConsumer for IndicatorStage {
    fn on_event(&self, event: &PipelineEvent) {
        if let PipelineEvent::CandleCompleted { candle, as_of } = event {
            if candle.instrument == self.instrument {
                self.on_candle(candle, *as_of);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, OptionSide};
    use crate::registry::tests::RecordingConsumer;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 15, 0).unwrap()
    }

    fn candle(minute: i64, close: f64) -> Candle {
        Candle {
            instrument: InstrumentId::from("X"),
            bucket_start: start() + Duration::minutes(minute),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 100.0,
            open_interest: 0.0,
        }
    }

    fn config() -> StrategyConfig {
        StrategyConfig {
            timeframe: 1,
            sma_period: 2,
            rsi_period: 2,
            fast_period: 1,
            fast_multiplier: 1.0,
            slow_period: 2,
            slow_multiplier: 2.0,
        }
    }

    fn completed(minute: i64, close: f64) -> PipelineEvent {
        PipelineEvent::CandleCompleted {
            candle: candle(minute, close),
            as_of: start() + Duration::minutes(minute + 2),
        }
    }

    fn setup() -> (IndicatorStage, Arc<RecordingConsumer>) {
        let signals = Arc::new(SubscriptionRegistry::new());
        let recorder = Arc::new(RecordingConsumer::default());
        signals.attach("execution", recorder.clone());
        (IndicatorStage::new(InstrumentId::from("X"), config(), signals), recorder)
    }

    #[test]
    fn test_no_signal_until_window_full() {
        let (stage, recorder) = setup();

        stage.on_event(&completed(0, 100.0));
        stage.on_event(&completed(1, 102.0));
        stage.on_event(&completed(2, 104.0));

        assert_eq!(stage.window_len(), 3);
        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn test_uptrend_emits_call_once() {
        let (stage, recorder) = setup();

        for (minute, close) in [(0, 100.0), (1, 102.0), (2, 104.0), (3, 106.0)] {
            stage.on_event(&completed(minute, close));
        }

        let signals = recorder.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, Action::Buy);
        assert_eq!(signals[0].option_side, Some(OptionSide::Call));
        assert_eq!(stage.window_len(), 4);
    }

    #[test]
    fn test_dip_flattens() {
        let (stage, recorder) = setup();

        for (minute, close) in [(0, 100.0), (1, 102.0), (2, 104.0), (3, 106.0), (4, 105.0)] {
            stage.on_event(&completed(minute, close));
        }

        // Close sits on its average while RSI stays bullish: mixed flags
        let signals = recorder.signals();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[1], TradeSignal::flat(InstrumentId::from("X")));
        assert_eq!(stage.last_signal(), Some(TradeSignal::flat(InstrumentId::from("X"))));
    }

    #[test]
    fn test_reversal_buys_put() {
        let (stage, recorder) = setup();

        for (minute, close) in [(0, 100.0), (1, 102.0), (2, 104.0), (3, 106.0), (4, 90.0)] {
            stage.on_event(&completed(minute, close));
        }

        let signals = recorder.signals();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[1], TradeSignal::buy_put(InstrumentId::from("X")));
    }

    #[test]
    fn test_prewarm_makes_first_live_candle_evaluate() {
        let (stage, recorder) = setup();
        let history = vec![candle(0, 100.0), candle(1, 102.0), candle(2, 104.0)];

        assert_eq!(stage.prewarm(&history, start() + Duration::minutes(4)), 3);
        stage.on_event(&completed(3, 106.0));

        assert_eq!(recorder.signals().len(), 1);
    }

    #[test]
    fn test_ignores_foreign_and_signal_events() {
        let (stage, recorder) = setup();

        let mut foreign = candle(0, 100.0);
        foreign.instrument = InstrumentId::from("Y");
        stage.on_event(&PipelineEvent::CandleCompleted {
            candle: foreign,
            as_of: start() + Duration::minutes(2),
        });
        stage.on_event(&PipelineEvent::SignalChanged(TradeSignal::flat(InstrumentId::from("X"))));

        assert_eq!(stage.window_len(), 0);
        assert_eq!(recorder.count(), 0);
    }
}
