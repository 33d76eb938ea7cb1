//! §4.12 Exit Manager decision function and trailing-level update — pure, no
//! I/O. The orchestration (broker reads, AI override calls, close
//! execution) lives in `application::exit_manager`.

use crate::domain::types::ExitReason;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitDecision {
    Exit(ExitReason),
    Hold,
}

/// `previously_adjusted` distinguishes a level hit on its original static
/// target (`ProfitTarget`/`StopLoss`) from one hit after at least one
/// trailing update has ratcheted it (`TrailingProfit`/`TrailingStop`).
pub fn decide(
    current_price: Decimal,
    trailing_stop: Decimal,
    trailing_profit: Decimal,
    days_to_expiration: i64,
    time_exit_dte: i64,
    previously_adjusted: bool,
) -> ExitDecision {
    if current_price <= trailing_profit {
        ExitDecision::Exit(if previously_adjusted { ExitReason::TrailingProfit } else { ExitReason::ProfitTarget })
    } else if current_price >= trailing_stop {
        ExitDecision::Exit(if previously_adjusted { ExitReason::TrailingStop } else { ExitReason::StopLoss })
    } else if days_to_expiration <= time_exit_dte {
        ExitDecision::Exit(ExitReason::TimeExit)
    } else {
        ExitDecision::Hold
    }
}

pub const STATIC_STOP_MULTIPLIER: f64 = 2.5;
pub const STATIC_PROFIT_TARGET_PCT: f64 = 0.50;
pub const STOP_MULTIPLIER_RANGE: (f64, f64) = (1.5, 3.5);
pub const PROFIT_TARGET_PCT_RANGE: (f64, f64) = (0.4, 0.7);

/// New trailing levels from a (possibly ML-predicted) `(stop_multiplier,
/// profit_target_pct)` pair. Stops only tighten: the new stop is the
/// tighter of the existing level and the freshly computed one.
pub fn update_trailing(entry_credit: Decimal, old_trailing_stop: Decimal, stop_multiplier: f64, profit_target_pct: f64) -> (Decimal, Decimal) {
    let candidate_stop = entry_credit * Decimal::try_from(stop_multiplier).unwrap_or_default();
    let new_stop = old_trailing_stop.min(candidate_stop);
    let new_profit = entry_credit * Decimal::try_from(profit_target_pct).unwrap_or_default();
    (new_stop, new_profit)
}

/// Dollar P/L on a close: the per-share credit/debit spread between entry
/// and exit, scaled to contracts at the standard 100-share multiplier —
/// the same scaling `max_risk` uses at entry.
pub fn realized_pnl(entry_credit: Decimal, exit_price: Decimal, contracts: u32) -> Decimal {
    (entry_credit - exit_price) * Decimal::from(100) * Decimal::from(contracts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn profit_target_hit_before_any_adjustment() {
        let d = decide(dec!(0.30), dec!(1.5625), dec!(0.3125), 30, 21, false);
        assert_eq!(d, ExitDecision::Exit(ExitReason::ProfitTarget));
    }

    #[test]
    fn trailing_profit_hit_after_an_adjustment() {
        let d = decide(dec!(0.20), dec!(1.5625), dec!(0.25), 30, 21, true);
        assert_eq!(d, ExitDecision::Exit(ExitReason::TrailingProfit));
    }

    #[test]
    fn stop_loss_before_any_adjustment() {
        let d = decide(dec!(1.60), dec!(1.5625), dec!(0.3125), 30, 21, false);
        assert_eq!(d, ExitDecision::Exit(ExitReason::StopLoss));
    }

    #[test]
    fn time_exit_when_dte_reached() {
        let d = decide(dec!(0.80), dec!(1.5625), dec!(0.3125), 18, 21, false);
        assert_eq!(d, ExitDecision::Exit(ExitReason::TimeExit));
    }

    #[test]
    fn holds_between_levels() {
        let d = decide(dec!(0.80), dec!(1.5625), dec!(0.3125), 30, 21, false);
        assert_eq!(d, ExitDecision::Hold);
    }

    #[test]
    fn trailing_stop_only_tightens() {
        let (new_stop, _) = update_trailing(dec!(0.625), dec!(1.5625), 3.0, 0.5);
        assert!(new_stop <= dec!(1.5625));
        let (tighter_stop, _) = update_trailing(dec!(0.625), dec!(1.0), 3.0, 0.5);
        assert_eq!(tighter_stop, dec!(1.0), "a wider candidate must not loosen an already-tight stop");
    }

    #[test]
    fn realized_pnl_is_the_credit_spread_scaled_to_contracts() {
        assert_eq!(realized_pnl(dec!(0.625), dec!(0.20), 2), dec!(85));
        assert_eq!(realized_pnl(dec!(0.625), dec!(1.60), 2), dec!(-195));
    }
}
