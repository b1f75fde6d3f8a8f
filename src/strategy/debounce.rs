use crate::models::TradeSignal;

/// Remembers the last emitted signal for one instrument
#[derive(Debug, Clone, Default)]
pub struct SignalDebouncer {
    last: Option<TradeSignal>,
}

impl SignalDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the signal if it differs from the last one emitted.
    ///
    /// An unchanged signal leaves the state untouched.
    pub fn observe(&mut self, signal: TradeSignal) -> Option<TradeSignal> {
        if self.last.as_ref() == Some(&signal) {
            return None;
        }
        self.last = Some(signal.clone());
        Some(signal)
    }

    pub fn last(&self) -> Option<&TradeSignal> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InstrumentId;

    #[test]
    fn test_first_signal_is_emitted() {
        let mut debouncer = SignalDebouncer::new();
        let signal = TradeSignal::buy_call(InstrumentId::from("X"));

        assert_eq!(debouncer.observe(signal.clone()), Some(signal.clone()));
        assert_eq!(debouncer.last(), Some(&signal));
    }

    #[test]
    fn test_repeated_signal_is_suppressed() {
        let mut debouncer = SignalDebouncer::new();
        let signal = TradeSignal::buy_put(InstrumentId::from("X"));

        assert!(debouncer.observe(signal.clone()).is_some());
        assert!(debouncer.observe(signal.clone()).is_none());
        assert!(debouncer.observe(signal).is_none());
    }

    #[test]
    fn test_change_then_change_back() {
        let mut debouncer = SignalDebouncer::new();
        let id = InstrumentId::from("X");

        assert!(debouncer.observe(TradeSignal::buy_call(id.clone())).is_some());
        assert!(debouncer.observe(TradeSignal::flat(id.clone())).is_some());
        assert!(debouncer.observe(TradeSignal::buy_call(id.clone())).is_some());
        assert_eq!(debouncer.last(), Some(&TradeSignal::buy_call(id)));
    }
}
