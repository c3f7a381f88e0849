//! Clock + calendar collaborators (SPEC_FULL §6: "returns today's date in a configured
//! timezone and answers `is_trading_day(date)`"). Kept as traits so tests can pin both
//! without touching the system clock.

use chrono::{NaiveDate, Utc, Weekday};

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub trait Calendar: Send + Sync {
    fn is_trading_day(&self, date: NaiveDate) -> bool;
}

/// Reads the system clock in UTC. `PipelineConfig::timezone` names the intended zone;
/// converting to it is left to an embedding binary, matching SPEC_FULL §6's "library
/// entry point" scoping.
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Weekday-only calendar: Saturday and Sunday are non-trading days, every other day is.
/// No holiday table — a real deployment would inject one via a different `Calendar` impl.
pub struct WeekdayCalendar;

impl Calendar for WeekdayCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

/// A clock and calendar pinned to fixed values, for deterministic tests.
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

pub struct FixedCalendar(pub bool);

impl Calendar for FixedCalendar {
    fn is_trading_day(&self, _date: NaiveDate) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_calendar_rejects_saturday_and_sunday() {
        let saturday = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        assert!(!WeekdayCalendar.is_trading_day(saturday));
        assert!(WeekdayCalendar.is_trading_day(monday));
    }
}
