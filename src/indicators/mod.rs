// Technical indicators module
// SMA crossover, RSI threshold, ATR and Supertrend over a candle window

pub mod atr;
pub mod moving_average;
pub mod rsi;
pub mod supertrend;

pub use atr::{calculate_atr, rolling_atr, true_range};
pub use moving_average::{calculate_sma, sma_crossover};
pub use rsi::{calculate_rsi, rsi_threshold};
pub use supertrend::{supertrend, supertrend_series, SupertrendPoint};
