// Stand-in for the order layer: turns signal changes into logged position intents
use crate::models::{Action, InstrumentId, OptionSide, TradeSignal};
use crate::registry::{EventConsumer, PipelineEvent};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    /// Open a position in `side`, closing `replaces` first if one is held
    Open {
        side: OptionSide,
        replaces: Option<OptionSide>,
    },
    Close { side: OptionSide },
    Skip,
}

#[derive(Debug, Default)]
struct Book {
    positions: HashMap<InstrumentId, OptionSide>,
    received: usize,
}

/// Signal registry consumer that tracks the intended option position per
/// instrument and logs every decision. Nothing is sent to a broker.
#[derive(Debug, Default)]
pub struct LoggingExecutor {
    book: Mutex<Book>,
}

impl LoggingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide what a signal means for the current position and record it
    pub fn process_signal(&self, signal: &TradeSignal) -> ExecutionAction {
        let mut book = self
            .book
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        book.received += 1;

        let held = book.positions.get(&signal.instrument).copied();
        let action = match (signal.action, signal.option_side) {
            (Action::Buy, Some(side)) if held == Some(side) => ExecutionAction::Skip,
            (Action::Buy, Some(side)) => {
                book.positions.insert(signal.instrument.clone(), side);
                ExecutionAction::Open {
                    side,
                    replaces: held,
                }
            }
            (Action::Sell, _) | (Action::Buy, None) => match book.positions.remove(&signal.instrument) {
                Some(side) => ExecutionAction::Close { side },
                None => ExecutionAction::Skip,
            },
        };

        tracing::info!(
            instrument = %signal.instrument,
            signal = %signal,
            decision = ?action,
            "Execution decision"
        );

        action
    }

    pub fn position(&self, instrument: &InstrumentId) -> Option<OptionSide> {
        self.book
            .lock()
            .ok()
            .and_then(|book| book.positions.get(instrument).copied())
    }

    /// Signals received so far
    pub fn received(&self) -> usize {
        self.book.lock().map(|book| book.received).unwrap_or(0)
    }
}

impl EventConsumer for LoggingExecutor {
    fn on_event(&self, event: &PipelineEvent) {
        if let PipelineEvent::SignalChanged(signal) = event {
            self.process_signal(signal);
        }
    }
}
