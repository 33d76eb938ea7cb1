//! Gate 3: earnings blackout. Reject if an earnings announcement falls
//! within `earnings_blackout_hours`, unless the short strike sits outside
//! the expected move.

use crate::domain::errors::RiskGateError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub fn check(
    next_earnings: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    blackout_hours: i64,
    short_strike: Decimal,
    price: Decimal,
    expected_move: Decimal,
) -> Result<(), RiskGateError> {
    let Some(earnings_ts) = next_earnings else {
        return Ok(());
    };
    let hours_until = (earnings_ts - now).num_hours();
    if hours_until < 0 || hours_until > blackout_hours {
        return Ok(());
    }
    if (short_strike - price).abs() > expected_move {
        return Ok(());
    }
    Err(RiskGateError::EarningsBlackout {
        hours_until,
        blackout_hours,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn blocks_within_blackout_window_and_inside_expected_move() {
        let now = Utc::now();
        let earnings = now + Duration::hours(10);
        let err = check(Some(earnings), now, 48, dec!(450), dec!(450), dec!(20));
        assert!(err.is_err());
    }

    #[test]
    fn allows_when_strike_is_outside_expected_move() {
        let now = Utc::now();
        let earnings = now + Duration::hours(10);
        assert!(check(Some(earnings), now, 48, dec!(500), dec!(450), dec!(20)).is_ok());
    }

    #[test]
    fn allows_when_no_earnings_scheduled() {
        assert!(check(None, Utc::now(), 48, dec!(450), dec!(450), dec!(20)).is_ok());
    }

    #[test]
    fn allows_when_earnings_beyond_blackout_window() {
        let now = Utc::now();
        let earnings = now + Duration::hours(72);
        assert!(check(Some(earnings), now, 48, dec!(450), dec!(450), dec!(20)).is_ok());
    }
}
