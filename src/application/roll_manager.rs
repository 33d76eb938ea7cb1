//! §4.13 Roll Manager: trigger evaluation and the atomic 4-leg roll combo.
//! Only consulted when the Exit Manager's decision is `STOP_LOSS` or
//! `TRAILING_STOP` — a roll is a request to defer a stop-out, never an
//! alternative to a profit-target or time exit.

use crate::application::order_manager::OrderManager;
use crate::domain::errors::BrokerError;
use crate::domain::ports::{ComboLeg, ComboOrder, OrderPrice, TimeInForce};
use crate::domain::types::{Action, ExitReason, Leg, OptionRight, Position};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const ROLL_FILL_TIMEOUT_SECS_DEFAULT: u64 = 30;
const TESTED_DELTA_THRESHOLD: f64 = 0.40;

pub struct RollManager {
    order_manager: Arc<OrderManager>,
    roll_forward_days: i64,
    fill_timeout: Duration,
    max_debit: Decimal,
}

impl RollManager {
    pub fn new(order_manager: Arc<OrderManager>, roll_forward_days: i64, fill_timeout_secs: u64, max_debit: Decimal) -> Self {
        Self {
            order_manager,
            roll_forward_days,
            fill_timeout: Duration::from_secs(fill_timeout_secs.max(1)),
            max_debit,
        }
    }

    /// §4.13 trigger rules. `short_leg_delta` is the live |delta| of the
    /// tested short leg.
    pub fn should_trigger(current_price: Decimal, short_call_strike: Option<Decimal>, short_put_strike: Option<Decimal>, short_leg_delta: f64) -> bool {
        let call_tested = short_call_strike.is_some_and(|k| current_price >= k);
        let put_tested = short_put_strike.is_some_and(|k| current_price <= k);
        call_tested || put_tested || short_leg_delta.abs() > TESTED_DELTA_THRESHOLD
    }

    /// Attempts the roll. On success, returns the new Position (status OPEN)
    /// to be stored in place of the old one (marked ROLLED by the caller).
    /// On timeout or broker rejection, returns `Ok(None)` so the caller falls
    /// through to the original exit decision.
    pub async fn attempt_roll(&self, position: &Position, width: Decimal, new_short_quote: &crate::domain::types::OptionQuote, new_long_quote: &crate::domain::types::OptionQuote) -> Result<Option<Position>, BrokerError> {
        let Some(short_leg) = position.legs.iter().find(|l| l.action == Action::Sell) else {
            return Ok(None);
        };
        let Some(long_leg) = position.legs.iter().find(|l| l.action == Action::Buy) else {
            return Ok(None);
        };

        let legs = vec![
            ComboLeg { con_id: long_leg.con_id, action: Action::Sell, ratio: long_leg.quantity }, // close old long
            ComboLeg { con_id: short_leg.con_id, action: Action::Buy, ratio: short_leg.quantity }, // close old short
            ComboLeg { con_id: new_short_quote.con_id, action: Action::Sell, ratio: position.contracts }, // open new short
            ComboLeg { con_id: new_long_quote.con_id, action: Action::Buy, ratio: position.contracts },   // open new long
        ];

        let net_credit = new_short_quote.mid() - new_long_quote.mid();
        let limit_price = if net_credit >= Decimal::ZERO { net_credit } else { net_credit.max(-self.max_debit) };

        let trade = crate::domain::types::Trade {
            id: uuid::Uuid::new_v4(),
            position_id: Some(position.id),
            symbol: position.symbol.clone(),
            kind: crate::domain::types::TradeKind::Roll,
            status: crate::domain::types::TradeStatus::Submitted,
            requested_quantity: position.contracts,
            filled_quantity: 0,
            fill_price: None,
            vix_at_entry: position.vix_entry,
            regime_at_entry: position.regime_entry,
            submitted_at: chrono::Utc::now(),
            notes: Some("roll".to_string()),
        };
        let order = ComboOrder {
            action: Action::Sell,
            quantity: position.contracts,
            price: OrderPrice::Limit(limit_price),
            time_in_force: TimeInForce::Day,
        };

        let handle = self.order_manager.submit(trade, &legs, order).await?;
        let filled = self.order_manager.await_fill(&handle.order_id, self.fill_timeout).await?;

        let Some(filled_handle) = filled else {
            warn!(position_id = %position.id, "roll did not fill within the window, abandoning and falling through to original exit");
            return Ok(None);
        };
        if !matches!(filled_handle.status, crate::domain::types::TradeStatus::Filled) {
            warn!(position_id = %position.id, status = ?filled_handle.status, "roll resolved without a fill");
            return Ok(None);
        }

        let new_expiration = next_monthly_expiration(position.expiration, self.roll_forward_days);
        let new_legs = vec![
            Leg {
                position_id: position.id,
                contract_symbol: new_short_quote.symbol.clone(),
                action: Action::Sell,
                strike: new_short_quote.strike,
                option_type: new_short_quote.right,
                quantity: position.contracts,
                entry_price: new_short_quote.mid(),
                con_id: new_short_quote.con_id,
            },
            Leg {
                position_id: position.id,
                contract_symbol: new_long_quote.symbol.clone(),
                action: Action::Buy,
                strike: new_long_quote.strike,
                option_type: new_long_quote.right,
                quantity: position.contracts,
                entry_price: new_long_quote.mid(),
                con_id: new_long_quote.con_id,
            },
        ];

        info!(position_id = %position.id, new_expiration = %new_expiration, "roll filled");
        Ok(Some(Position {
            id: uuid::Uuid::new_v4(),
            symbol: position.symbol.clone(),
            strategy: position.strategy,
            entry_ts: chrono::Utc::now(),
            expiration: new_expiration,
            contracts: position.contracts,
            entry_credit: net_credit,
            max_risk: (width - net_credit.max(Decimal::ZERO)) * dec!(100) * Decimal::from(position.contracts),
            status: crate::domain::types::PositionStatus::Open,
            exit_ts: None,
            exit_price: None,
            exit_reason: None,
            realized_pnl: None,
            vix_entry: position.vix_entry,
            regime_entry: position.regime_entry,
            legs: new_legs,
            trailing_stop: net_credit.max(Decimal::ZERO) * Decimal::try_from(2.5).unwrap_or_default(),
            trailing_profit: net_credit.max(Decimal::ZERO) * dec!(0.5),
            highest_profit_seen: Decimal::ZERO,
            stop_multiplier: dec!(2.5),
            profit_target_pct: dec!(0.5),
            ml_confidence: None,
            ml_last_update: None,
        }))
    }

    /// Strike-shift-by-one-width proposal for the tested side; the other
    /// side's strike is unchanged.
    pub fn proposed_strikes(tested_strike: Decimal, width: Decimal, right: OptionRight) -> Decimal {
        match right {
            OptionRight::Call => tested_strike + width,
            OptionRight::Put => tested_strike - width,
        }
    }

    /// The next monthly expiration a roll would target, exposed so callers
    /// can fetch quotes for it before committing to [`Self::attempt_roll`].
    pub fn propose_new_expiration(&self, current_expiration: NaiveDate) -> NaiveDate {
        next_monthly_expiration(current_expiration, self.roll_forward_days)
    }
}

/// The next monthly (third-Friday) expiration at least `roll_forward_days`
/// out from `from`.
fn next_monthly_expiration(from: NaiveDate, roll_forward_days: i64) -> NaiveDate {
    let target = from.checked_add_days(Days::new(roll_forward_days.max(0) as u64)).unwrap_or(from);
    let mut candidate = NaiveDate::from_ymd_opt(target.year(), target.month(), 1).unwrap_or(target);
    let mut fridays_seen = 0;
    loop {
        if candidate.weekday() == Weekday::Fri {
            fridays_seen += 1;
            if fridays_seen == 3 {
                break;
            }
        }
        candidate = match candidate.succ_opt() {
            Some(next) => next,
            None => return target,
        };
    }
    if candidate < target {
        let (y, m) = if target.month() == 12 { (target.year() + 1, 1) } else { (target.year(), target.month() + 1) };
        return next_monthly_expiration(NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(target), 0);
    }
    candidate
}

pub const DEFAULT_ROLL_FILL_TIMEOUT_SECS: u64 = ROLL_FILL_TIMEOUT_SECS_DEFAULT;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_tested_triggers_roll() {
        assert!(RollManager::should_trigger(dec!(461), Some(dec!(460)), None, 0.10));
    }

    #[test]
    fn put_tested_triggers_roll() {
        assert!(RollManager::should_trigger(dec!(99), None, Some(dec!(100)), 0.10));
    }

    #[test]
    fn deep_delta_alone_triggers_roll() {
        assert!(RollManager::should_trigger(dec!(450), Some(dec!(460)), Some(dec!(440)), 0.45));
    }

    #[test]
    fn untested_and_shallow_delta_does_not_trigger() {
        assert!(!RollManager::should_trigger(dec!(450), Some(dec!(460)), Some(dec!(440)), 0.10));
    }

    #[test]
    fn proposed_strike_shifts_one_width_in_tested_direction() {
        assert_eq!(RollManager::proposed_strikes(dec!(100), dec!(5), OptionRight::Put), dec!(95));
        assert_eq!(RollManager::proposed_strikes(dec!(460), dec!(5), OptionRight::Call), dec!(465));
    }

    #[test]
    fn next_monthly_expiration_lands_on_a_friday_at_least_30_days_out() {
        let from = NaiveDate::from_ymd_opt(2026, 7, 17).unwrap();
        let next = next_monthly_expiration(from, 30);
        assert_eq!(next.weekday(), Weekday::Fri);
        assert!(next >= from + chrono::Duration::days(30));
    }
}
