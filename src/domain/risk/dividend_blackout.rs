//! Gate 4: dividend blackout. Reject a strategy containing a short CALL
//! whose underlying goes ex-dividend within `blackout_days`.

use crate::domain::errors::RiskGateError;
use chrono::NaiveDate;

pub fn check(
    has_short_call: bool,
    ex_dividend_date: Option<NaiveDate>,
    today: NaiveDate,
    blackout_days: i64,
) -> Result<(), RiskGateError> {
    if !has_short_call {
        return Ok(());
    }
    let Some(ex_date) = ex_dividend_date else {
        return Ok(());
    };
    let days_until = (ex_date - today).num_days();
    if (0..=blackout_days).contains(&days_until) {
        return Err(RiskGateError::DividendBlackout {
            ex_date,
            blackout_days,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn blocks_short_call_within_blackout_window() {
        let today = chrono::Utc::now().date_naive();
        let ex_date = today + Duration::days(2);
        assert!(check(true, Some(ex_date), today, 3).is_err());
    }

    #[test]
    fn allows_long_call_only_strategies() {
        let today = chrono::Utc::now().date_naive();
        let ex_date = today + Duration::days(2);
        assert!(check(false, Some(ex_date), today, 3).is_ok());
    }

    #[test]
    fn allows_when_ex_date_beyond_blackout() {
        let today = chrono::Utc::now().date_naive();
        let ex_date = today + Duration::days(10);
        assert!(check(true, Some(ex_date), today, 3).is_ok());
    }
}
