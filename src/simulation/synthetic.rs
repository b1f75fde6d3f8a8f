use crate::models::{InstrumentId, Tick};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::str::FromStr;

/// Market scenario types for synthetic tick generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend, every tick higher than the last
    Uptrend,
    /// Steady downtrend, every tick lower than the last
    Downtrend,
    /// Mean-reverting chop around the base price
    Sideways,
    /// Large swings in both directions
    Volatile,
    /// Random walk with whole minutes missing
    WithGaps,
    /// Uptrend followed by a sharp sell-off
    Crash,
}

impl FromStr for MarketScenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uptrend" => Ok(Self::Uptrend),
            "downtrend" => Ok(Self::Downtrend),
            "sideways" => Ok(Self::Sideways),
            "volatile" => Ok(Self::Volatile),
            "gaps" | "withgaps" | "with-gaps" => Ok(Self::WithGaps),
            "crash" => Ok(Self::Crash),
            other => Err(format!("unknown scenario: {}", other)),
        }
    }
}

/// Generates a reproducible tick stream
pub struct SyntheticTickGenerator {
    rng: StdRng,
    base_price: f64,
    ticks_per_minute: usize,
}

impl SyntheticTickGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 100.0,
            ticks_per_minute: 6,
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    pub fn with_ticks_per_minute(mut self, ticks_per_minute: usize) -> Self {
        self.ticks_per_minute = ticks_per_minute.max(1);
        self
    }

    /// Generate `minutes` minutes of ticks starting at `start`, oldest first
    pub fn generate(
        &mut self,
        instrument: &InstrumentId,
        scenario: MarketScenario,
        start: DateTime<Utc>,
        minutes: usize,
    ) -> Vec<Tick> {
        let mut ticks = Vec::with_capacity(minutes * self.ticks_per_minute);
        let mut price = self.base_price;
        let mut quantity = 0.0;
        let mut open_interest = 10_000.0;
        let crash_at = minutes * 2 / 3;

        for minute in 0..minutes {
            if scenario == MarketScenario::WithGaps && self.rng.gen_bool(0.2) {
                continue;
            }

            let minute_start = start + Duration::minutes(minute as i64);
            let mut offsets: Vec<i64> = (0..self.ticks_per_minute)
                .map(|_| self.rng.gen_range(0..60_000))
                .collect();
            offsets.sort_unstable();

            for offset in offsets {
                let step = match scenario {
                    // Drift dominates noise so the direction is strict
                    MarketScenario::Uptrend => 0.0005 + self.rng.gen_range(-0.0002..0.0002),
                    MarketScenario::Downtrend => -0.0005 + self.rng.gen_range(-0.0002..0.0002),
                    MarketScenario::Sideways => {
                        let pull = (self.base_price - price) / self.base_price * 0.05;
                        pull + self.rng.gen_range(-0.001..0.001)
                    }
                    MarketScenario::Volatile => self.rng.gen_range(-0.01..0.01),
                    MarketScenario::WithGaps => self.rng.gen_range(-0.002..0.002),
                    MarketScenario::Crash if minute < crash_at => 0.0005 + self.rng.gen_range(-0.0002..0.0002),
                    MarketScenario::Crash => -0.004 + self.rng.gen_range(-0.001..0.001),
                };
                price = (price * (1.0 + step)).max(0.01);
                quantity += self.rng.gen_range(1.0..50.0_f64).round();
                open_interest = (open_interest + self.rng.gen_range(-20.0..20.0_f64).round()).max(0.0);

                ticks.push(Tick::new(
                    instrument.clone(),
                    minute_start + Duration::milliseconds(offset),
                    price,
                    quantity,
                    open_interest,
                ));
            }
        }

        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::bucket_start;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 3, 45, 0).unwrap()
    }

    fn id() -> InstrumentId {
        InstrumentId::from("SIM")
    }

    #[test]
    fn test_same_seed_same_ticks() {
        let a = SyntheticTickGenerator::new(7).generate(&id(), MarketScenario::Volatile, start(), 30);
        let b = SyntheticTickGenerator::new(7).generate(&id(), MarketScenario::Volatile, start(), 30);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ticks_are_valid_and_ordered() {
        let ticks = SyntheticTickGenerator::new(1).generate(&id(), MarketScenario::Volatile, start(), 60);

        assert_eq!(ticks.len(), 60 * 6);
        assert!(ticks.iter().all(|t| t.validate().is_ok()));
        assert!(ticks.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(ticks.windows(2).all(|w| w[0].quantity < w[1].quantity));
        assert!(ticks.last().unwrap().timestamp < start() + Duration::minutes(60));
    }

    #[test]
    fn test_uptrend_rises_downtrend_falls() {
        let up = SyntheticTickGenerator::new(3).generate(&id(), MarketScenario::Uptrend, start(), 20);
        let down = SyntheticTickGenerator::new(3).generate(&id(), MarketScenario::Downtrend, start(), 20);

        assert!(up.windows(2).all(|w| w[1].price > w[0].price));
        assert!(down.windows(2).all(|w| w[1].price < w[0].price));
    }

    #[test]
    fn test_gaps_skip_minutes() {
        let ticks = SyntheticTickGenerator::new(11).generate(&id(), MarketScenario::WithGaps, start(), 100);
        let minutes: BTreeSet<_> = ticks
            .iter()
            .map(|t| bucket_start(t.timestamp, Duration::minutes(1)))
            .collect();

        assert!(minutes.len() < 100);
        assert!(!minutes.is_empty());
    }

    #[test]
    fn test_crash_ends_below_peak() {
        let ticks = SyntheticTickGenerator::new(5).generate(&id(), MarketScenario::Crash, start(), 60);
        let peak = ticks.iter().map(|t| t.price).fold(f64::MIN, f64::max);
        assert!(ticks.last().unwrap().price < peak * 0.95);
    }

    #[test]
    fn test_parse_scenario() {
        assert_eq!("Uptrend".parse::<MarketScenario>(), Ok(MarketScenario::Uptrend));
        assert_eq!("with-gaps".parse::<MarketScenario>(), Ok(MarketScenario::WithGaps));
        assert!("moon".parse::<MarketScenario>().is_err());
    }
}
