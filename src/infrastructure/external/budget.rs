//! Per-UTC-day USD budget shared by every rate-limited external client
//! (§4.5). Crossing `daily_limit_usd` flips the client into silent mode
//! until the next UTC day; `can_request` is synchronous so it can be
//! called from non-async call sites without awaiting a lock.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Mutex;

struct BudgetState {
    day: NaiveDate,
    spent_usd: Decimal,
}

pub struct DailyBudget {
    limit_usd: Decimal,
    state: Mutex<BudgetState>,
}

impl DailyBudget {
    pub fn new(limit_usd: Decimal) -> Self {
        Self {
            limit_usd,
            state: Mutex::new(BudgetState { day: Utc::now().date_naive(), spent_usd: Decimal::ZERO }),
        }
    }

    fn roll_if_new_day(state: &mut BudgetState) {
        let today = Utc::now().date_naive();
        if state.day != today {
            state.day = today;
            state.spent_usd = Decimal::ZERO;
        }
    }

    pub fn can_request(&self) -> bool {
        let mut state = self.state.lock().expect("budget mutex poisoned");
        Self::roll_if_new_day(&mut state);
        state.spent_usd < self.limit_usd
    }

    pub fn record_usage(&self, cost_usd: Decimal) {
        let mut state = self.state.lock().expect("budget mutex poisoned");
        Self::roll_if_new_day(&mut state);
        state.spent_usd += cost_usd;
    }

    pub fn spent_today(&self) -> Decimal {
        let mut state = self.state.lock().expect("budget mutex poisoned");
        Self::roll_if_new_day(&mut state);
        state.spent_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn allows_requests_under_budget() {
        let budget = DailyBudget::new(dec!(5.00));
        assert!(budget.can_request());
        budget.record_usage(dec!(2.00));
        assert!(budget.can_request());
    }

    #[test]
    fn enters_silent_mode_once_budget_crossed() {
        let budget = DailyBudget::new(dec!(5.00));
        budget.record_usage(dec!(5.00));
        assert!(!budget.can_request());
    }

    #[test]
    fn spent_today_reflects_recorded_usage() {
        let budget = DailyBudget::new(dec!(10.00));
        budget.record_usage(dec!(1.50));
        budget.record_usage(dec!(0.75));
        assert_eq!(budget.spent_today(), dec!(2.25));
    }
}
