//! Exchange trading-session guard.
//!
//! Subscribing outside the session would only aggregate an empty feed, so the
//! binary refuses to start on weekends, listed holidays, and outside the
//! configured local trading hours.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session settings as they appear in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Exchange offset from UTC in minutes (IST = 330)
    pub utc_offset_minutes: i32,
    /// Local opening time, `HH:MM`
    pub open: String,
    /// Local closing time, `HH:MM`
    pub close: String,
    /// Exchange holidays, `YYYY-MM-DD`
    pub holidays: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 330,
            open: "09:15".to_string(),
            close: "15:30".to_string(),
            holidays: Vec::new(),
        }
    }
}

/// Why the market is closed at a given instant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionClosed {
    #[error("today is a weekend ({0})")]
    Weekend(Weekday),

    #[error("{0} is a market holiday")]
    Holiday(NaiveDate),

    #[error("market opens at {0}")]
    BeforeOpen(NaiveTime),

    #[error("market closed at {0}")]
    AfterClose(NaiveTime),
}

#[derive(Debug, Error)]
#[error("invalid session setting {field}: {value:?}")]
pub struct InvalidSession {
    field: &'static str,
    value: String,
}

#[derive(Debug, Clone)]
pub struct MarketSession {
    offset: FixedOffset,
    open: NaiveTime,
    close: NaiveTime,
    holidays: Vec<NaiveDate>,
}

impl MarketSession {
    pub fn from_config(config: &SessionConfig) -> Result<Self, InvalidSession> {
        let invalid = |field: &'static str, value: &str| InvalidSession {
            field,
            value: value.to_string(),
        };

        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60)
            .ok_or_else(|| invalid("utc_offset_minutes", &config.utc_offset_minutes.to_string()))?;
        let open = NaiveTime::parse_from_str(&config.open, "%H:%M")
            .map_err(|_| invalid("open", &config.open))?;
        let close = NaiveTime::parse_from_str(&config.close, "%H:%M")
            .map_err(|_| invalid("close", &config.close))?;
        if close <= open {
            return Err(invalid("close", &config.close));
        }

        let holidays = config
            .holidays
            .iter()
            .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|_| invalid("holidays", d)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            offset,
            open,
            close,
            holidays,
        })
    }

    /// `Ok` while the market is open at `now`
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), SessionClosed> {
        let local = now.with_timezone(&self.offset);
        let date = local.date_naive();
        let time = local.time();

        if let day @ (Weekday::Sat | Weekday::Sun) = date.weekday() {
            return Err(SessionClosed::Weekend(day));
        }
        if self.holidays.contains(&date) {
            return Err(SessionClosed::Holiday(date));
        }
        if time < self.open {
            return Err(SessionClosed::BeforeOpen(self.open));
        }
        if time > self.close {
            return Err(SessionClosed::AfterClose(self.close));
        }

        Ok(())
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.check(now).is_ok()
    }
}
