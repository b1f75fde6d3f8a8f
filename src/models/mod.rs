use crate::error::TickError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a subscribed instrument (exchange instrument token)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for InstrumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single trade tick as delivered by the live feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub instrument: InstrumentId,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    /// Cumulative traded quantity reported by the feed
    pub quantity: f64,
    pub open_interest: f64,
}

impl Tick {
    pub fn new(
        instrument: impl Into<InstrumentId>,
        timestamp: DateTime<Utc>,
        price: f64,
        quantity: f64,
        open_interest: f64,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            timestamp,
            price,
            quantity,
            open_interest,
        }
    }

    /// Reject ticks that would corrupt a candle
    pub fn validate(&self) -> Result<(), TickError> {
        let instrument = self.instrument.clone();

        if !self.price.is_finite() || !self.quantity.is_finite() || !self.open_interest.is_finite()
        {
            return Err(TickError::NonFinite { instrument });
        }
        if self.price <= 0.0 {
            return Err(TickError::NonPositivePrice {
                instrument,
                price: self.price,
            });
        }
        if self.quantity < 0.0 {
            return Err(TickError::NegativeQuantity {
                instrument,
                quantity: self.quantity,
            });
        }
        if self.open_interest < 0.0 {
            return Err(TickError::NegativeOpenInterest {
                instrument,
                open_interest: self.open_interest,
            });
        }

        Ok(())
    }
}

/// OHLCV + open interest candle for one time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub instrument: InstrumentId,
    pub bucket_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub open_interest: f64,
}

impl Candle {
    /// Start a candle from the first tick seen in a bucket
    pub fn from_tick(bucket_start: DateTime<Utc>, tick: &Tick) -> Self {
        Self {
            instrument: tick.instrument.clone(),
            bucket_start,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.quantity,
            open_interest: tick.open_interest,
        }
    }

    /// Fold a later candle for the same bucket into this one.
    ///
    /// Open is first-wins, high/low are extremes, close, volume and
    /// open interest are last-wins.
    pub fn absorb(&mut self, later: &Candle) {
        self.high = self.high.max(later.high);
        self.low = self.low.min(later.low);
        self.close = later.close;
        self.volume = later.volume;
        self.open_interest = later.open_interest;
    }

    /// Same candle, re-keyed to a coarser bucket
    pub fn rebucket(&self, bucket_start: DateTime<Utc>) -> Self {
        Self {
            bucket_start,
            ..self.clone()
        }
    }

    /// Validate candle integrity (OHLC invariants)
    pub fn is_valid(&self) -> bool {
        self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
    }

    /// Midpoint of the bar's range
    pub fn mid_price(&self) -> f64 {
        (self.high + self.low) / 2.0
    }
}

/// Per-instrument indicator parameters loaded at subscription time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Strategy timeframe in minutes (one-minute candles per bucket)
    pub timeframe: u32,
    pub sma_period: usize,
    pub rsi_period: usize,
    pub fast_period: usize,
    pub fast_multiplier: f64,
    pub slow_period: usize,
    pub slow_multiplier: f64,
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.timeframe == 0 {
            return Err("timeframe must be at least one minute".to_string());
        }

        let periods = [
            ("sma_period", self.sma_period),
            ("rsi_period", self.rsi_period),
            ("fast_period", self.fast_period),
            ("slow_period", self.slow_period),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, p)| *p == 0) {
            return Err(format!("{} must be positive", name));
        }

        for (name, m) in [
            ("fast_multiplier", self.fast_multiplier),
            ("slow_multiplier", self.slow_multiplier),
        ] {
            if !m.is_finite() || m <= 0.0 {
                return Err(format!("{} must be a positive number, got {}", name, m));
            }
        }

        Ok(())
    }

    /// Number of timeframe candles kept in the rolling window.
    ///
    /// Two more than the longest period, so even the longest supertrend
    /// fold has a previous bar to break out of or ratchet against.
    pub fn window_capacity(&self) -> usize {
        self.sma_period
            .max(self.rsi_period)
            .max(self.fast_period)
            .max(self.slow_period)
            + 2
    }

    pub fn timeframe_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.timeframe))
    }

    /// One-minute candles needed to pre-warm a full window
    pub fn history_minutes(&self) -> usize {
        self.window_capacity() * self.timeframe as usize
    }
}

/// Order direction carried by a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
}

/// Option leg requested by a buy signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionSide {
    Call,
    Put,
}

/// Discrete trading signal handed to the execution layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeSignal {
    pub instrument: InstrumentId,
    pub action: Action,
    pub option_side: Option<OptionSide>,
}

impl TradeSignal {
    pub fn buy_call(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            action: Action::Buy,
            option_side: Some(OptionSide::Call),
        }
    }

    pub fn buy_put(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            action: Action::Buy,
            option_side: Some(OptionSide::Put),
        }
    }

    pub fn flat(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            action: Action::Sell,
            option_side: None,
        }
    }
}

impl fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.action, self.option_side) {
            (Action::Buy, Some(OptionSide::Call)) => write!(f, "{} BUY call", self.instrument),
            (Action::Buy, Some(OptionSide::Put)) => write!(f, "{} BUY put", self.instrument),
            (Action::Buy, None) => write!(f, "{} BUY", self.instrument),
            (Action::Sell, _) => write!(f, "{} SELL call/put", self.instrument),
        }
    }
}
