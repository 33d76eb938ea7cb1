//! §4.1 Clock & Market Calendar: a `std::time` + `chrono` clock corrected
//! by a drift offset measured against an external time source, with all
//! market-hours logic delegated to the pure `domain::market::MarketCalendar`.

use crate::domain::market::MarketCalendar;
use crate::domain::ports::Clock;
use chrono::{DateTime, Utc};
use chrono_tz::US::Eastern;
use std::sync::atomic::{AtomicI64, Ordering};

/// System clock with a correctable drift offset (milliseconds, signed).
/// §5 lists "atomic clock sync" as a suspension point; `sync_drift` is the
/// call site a periodic background task uses to apply a measurement from
/// an external time source (e.g. the broker's own server time).
pub struct SystemClock {
    drift_millis: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            drift_millis: AtomicI64::new(0),
        }
    }

    /// Applies a fresh drift measurement: `authoritative - observed_now`.
    pub fn sync_drift(&self, authoritative: DateTime<Utc>) {
        let observed = Utc::now();
        let drift = authoritative.signed_duration_since(observed).num_milliseconds();
        self.drift_millis.store(drift, Ordering::Relaxed);
    }

    pub fn drift_millis(&self) -> i64 {
        self.drift_millis.load(Ordering::Relaxed)
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let drift = chrono::Duration::milliseconds(self.drift_millis());
        Utc::now() + drift
    }

    fn now_eastern(&self) -> DateTime<chrono_tz::Tz> {
        self.now().with_timezone(&Eastern)
    }

    fn is_market_open(&self) -> bool {
        MarketCalendar::is_market_open(self.now_eastern())
    }

    fn market_open(&self) -> DateTime<chrono_tz::Tz> {
        MarketCalendar::market_open(self.now_eastern())
    }

    fn market_close(&self) -> DateTime<chrono_tz::Tz> {
        MarketCalendar::market_close(self.now_eastern())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_defaults_to_zero() {
        let clock = SystemClock::new();
        assert_eq!(clock.drift_millis(), 0);
    }

    #[test]
    fn sync_drift_applies_a_correction() {
        let clock = SystemClock::new();
        let authoritative = Utc::now() + chrono::Duration::seconds(5);
        clock.sync_drift(authoritative);
        // The correction should be roughly +5000ms, modulo the small gap
        // between computing `authoritative` above and the call inside sync_drift.
        assert!(clock.drift_millis() > 4000 && clock.drift_millis() < 6000);
    }
}
