use crate::indicators::SupertrendPoint;
use crate::models::{InstrumentId, TradeSignal};

/// Indicator outputs for the latest bar of a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub close: f64,
    /// Latest close above the SMA
    pub sma_above: bool,
    /// RSI at or above 50
    pub rsi_bullish: bool,
    pub fast: SupertrendPoint,
    pub slow: SupertrendPoint,
}

impl IndicatorSnapshot {
    /// The six flags that vote on the signal, in a fixed order:
    /// SMA cross, RSI threshold, fast/slow close above trend level,
    /// fast/slow trend direction.
    pub fn flags(&self) -> [bool; 6] {
        [
            self.sma_above,
            self.rsi_bullish,
            self.fast.price_above(),
            self.slow.price_above(),
            self.fast.is_uptrend,
            self.slow.is_uptrend,
        ]
    }

    /// Combine the flags into a discrete signal
    ///
    /// - all bullish: buy a call
    /// - all bearish: buy a put
    /// - anything mixed: flatten (sell call/put)
    pub fn decide(&self, instrument: InstrumentId) -> TradeSignal {
        let flags = self.flags();

        if flags.iter().all(|&f| f) {
            TradeSignal::buy_call(instrument)
        } else if flags.iter().all(|&f| !f) {
            TradeSignal::buy_put(instrument)
        } else {
            TradeSignal::flat(instrument)
        }
    }
}
