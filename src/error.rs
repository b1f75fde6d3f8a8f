use crate::models::InstrumentId;
use thiserror::Error;

/// Reasons a single tick is rejected at ingestion.
///
/// A rejected tick is dropped and logged; the stream keeps flowing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TickError {
    #[error("tick for {instrument} has a non-finite field")]
    NonFinite { instrument: InstrumentId },

    #[error("tick for {instrument} has non-positive price {price}")]
    NonPositivePrice { instrument: InstrumentId, price: f64 },

    #[error("tick for {instrument} has negative quantity {quantity}")]
    NegativeQuantity {
        instrument: InstrumentId,
        quantity: f64,
    },

    #[error("tick for {instrument} has negative open interest {open_interest}")]
    NegativeOpenInterest {
        instrument: InstrumentId,
        open_interest: f64,
    },

    #[error("instrument {0} is not subscribed")]
    UnknownInstrument(InstrumentId),

    #[error("instrument {0} is closing and no longer accepts ticks")]
    Closed(InstrumentId),
}

/// Errors raised by the subscription pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("instrument {0} is already subscribed")]
    AlreadySubscribed(InstrumentId),

    #[error("instrument {0} is not subscribed")]
    NotSubscribed(InstrumentId),

    #[error("invalid strategy for {instrument}: {reason}")]
    InvalidStrategy {
        instrument: InstrumentId,
        reason: String,
    },

    #[error("state for {0} is poisoned by an earlier panic")]
    StatePoisoned(InstrumentId),

    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    #[error(transparent)]
    Tick(#[from] TickError),
}
