//! §4.1 Clock & Market Calendar — pure calendar math. The process-wide clock
//! correction (NTP-style drift, atomic-time polling) is an I/O concern and
//! lives in `infrastructure::clock::SystemClock`, which implements
//! `domain::ports::Clock` and delegates the open/close/weekday arithmetic
//! here.

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;
use chrono_tz::US::Eastern;

/// Regular session boundaries. Holidays are intentionally not modeled: the
/// spec's testable properties only constrain weekday/time-of-day behavior,
/// and a holiday calendar is ambient data best sourced from the broker
/// (`HistoricalBars` already returns no data on holidays), not hardcoded.
pub struct MarketCalendar;

impl MarketCalendar {
    pub const OPEN: NaiveTime = NaiveTime::from_hms_opt(9, 30, 0).expect("valid time");
    pub const CLOSE: NaiveTime = NaiveTime::from_hms_opt(16, 0, 0).expect("valid time");

    /// True only on weekdays between 09:30 and 16:00 US/Eastern.
    pub fn is_market_open(now_eastern: DateTime<Tz>) -> bool {
        if matches!(now_eastern.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let t = now_eastern.time();
        t >= Self::OPEN && t < Self::CLOSE
    }

    /// Today's open boundary, in US/Eastern.
    pub fn market_open(now_eastern: DateTime<Tz>) -> DateTime<Tz> {
        Eastern
            .from_local_datetime(&now_eastern.date_naive().and_time(Self::OPEN))
            .single()
            .unwrap_or(now_eastern)
    }

    /// Today's close boundary, in US/Eastern.
    pub fn market_close(now_eastern: DateTime<Tz>) -> DateTime<Tz> {
        Eastern
            .from_local_datetime(&now_eastern.date_naive().and_time(Self::CLOSE))
            .single()
            .unwrap_or(now_eastern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn eastern(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        Eastern.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn closed_before_open() {
        assert!(!MarketCalendar::is_market_open(eastern(2026, 7, 27, 9, 0)));
    }

    #[test]
    fn open_during_session() {
        assert!(MarketCalendar::is_market_open(eastern(2026, 7, 27, 12, 0)));
    }

    #[test]
    fn closed_at_close_boundary() {
        assert!(!MarketCalendar::is_market_open(eastern(2026, 7, 27, 16, 0)));
    }

    #[test]
    fn closed_on_weekend() {
        // 2026-07-25 is a Saturday.
        assert!(!MarketCalendar::is_market_open(eastern(2026, 7, 25, 12, 0)));
    }
}
