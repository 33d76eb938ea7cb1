//! Gate 1: circuit breaker. An active (unreset) event blocks every entry
//! path immediately — no other gate runs.

use crate::domain::errors::RiskGateError;
use crate::domain::types::CircuitBreakerEvent;

pub fn check(active_event: Option<&CircuitBreakerEvent>) -> Result<(), RiskGateError> {
    match active_event {
        Some(event) if event.is_active() => Err(RiskGateError::CircuitBreakerActive {
            reason: event.reason.to_string(),
            triggered_ts: event.triggered_ts,
        }),
        _ => Ok(()),
    }
}

/// Daily loss guard (§8 testable property): realized daily P/L at or below
/// `-daily_max_loss_pct * account_size` trips the breaker on the next check.
pub fn daily_loss_breached(
    realized_daily_pnl: rust_decimal::Decimal,
    account_size: rust_decimal::Decimal,
    daily_max_loss_pct: f64,
) -> bool {
    use rust_decimal::prelude::ToPrimitive;
    let threshold = account_size.to_f64().unwrap_or(0.0) * daily_max_loss_pct;
    realized_daily_pnl.to_f64().unwrap_or(0.0) <= -threshold
}

/// Consecutive-loss guard: true when the most recent `limit` closed trades,
/// ordered newest-first, are all losses.
pub fn consecutive_losses_breached(recent_realized_pnls_newest_first: &[rust_decimal::Decimal], limit: usize) -> bool {
    if recent_realized_pnls_newest_first.len() < limit {
        return false;
    }
    recent_realized_pnls_newest_first[..limit]
        .iter()
        .all(|pnl| *pnl < rust_decimal::Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::CircuitBreakerReason;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn active_event() -> CircuitBreakerEvent {
        CircuitBreakerEvent {
            id: 1,
            triggered_ts: Utc::now(),
            reason: CircuitBreakerReason::ConsecutiveLosses,
            threshold_value: 3.0,
            reset_ts: None,
            reset_by: None,
            halt_duration_hours: Some(24),
            notes: None,
        }
    }

    #[test]
    fn blocks_while_active() {
        let event = active_event();
        assert!(check(Some(&event)).is_err());
    }

    #[test]
    fn passes_once_reset() {
        let mut event = active_event();
        event.reset_ts = Some(Utc::now());
        assert!(check(Some(&event)).is_ok());
    }

    #[test]
    fn passes_with_no_event() {
        assert!(check(None).is_ok());
    }

    #[test]
    fn three_consecutive_losses_trip_the_breaker() {
        let pnls = vec![dec!(-50), dec!(-50), dec!(-50)];
        assert!(consecutive_losses_breached(&pnls, 3));
    }

    #[test]
    fn a_win_among_the_recent_trades_does_not_trip() {
        let pnls = vec![dec!(-50), dec!(10), dec!(-50)];
        assert!(!consecutive_losses_breached(&pnls, 3));
    }

    #[test]
    fn daily_loss_guard_trips_at_threshold() {
        assert!(daily_loss_breached(dec!(-1500), dec!(75000), 0.02));
        assert!(!daily_loss_breached(dec!(-1000), dec!(75000), 0.02));
    }
}
