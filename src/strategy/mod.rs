// Trading strategy module
pub mod debounce;
pub mod signals;
pub mod stage;
pub mod trend;

pub use debounce::SignalDebouncer;
pub use signals::IndicatorSnapshot;
pub use stage::IndicatorStage;
pub use trend::TrendStrategy;

use crate::models::Candle;

/// Base trait for indicator strategies
pub trait Strategy: Send + Sync {
    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;

    /// Evaluate the indicators over a window of timeframe candles.
    ///
    /// Returns `None` when the window is too short or an indicator has no
    /// defined value; no signal is produced in that case.
    fn evaluate(&self, candles: &[Candle]) -> Option<IndicatorSnapshot>;
}
