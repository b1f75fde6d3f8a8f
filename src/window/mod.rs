// Bounded per-instrument candle history at the strategy timeframe
pub mod store;

pub use store::WindowStore;

use crate::models::Candle;
use std::collections::VecDeque;

/// Rolling window of completed candles
///
/// Keeps at most `capacity` candles; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    candles: VecDeque<Candle>,
    capacity: usize,
}

impl RollingWindow {
    /// Create an empty window
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of candles to keep
    pub fn new(capacity: usize) -> Self {
        Self {
            candles: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a candle, evicting the oldest if the window is full
    pub fn push(&mut self, candle: Candle) {
        self.candles.push_back(candle);

        while self.candles.len() > self.capacity {
            self.candles.pop_front();
        }
    }

    /// All candles, oldest first
    pub fn candles(&self) -> Vec<Candle> {
        self.candles.iter().cloned().collect()
    }

    /// The N most recent candles, oldest first
    pub fn recent(&self, n: usize) -> Vec<Candle> {
        self.candles.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.candles.len() >= self.capacity
    }
}
