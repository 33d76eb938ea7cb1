//! §4.12 Exit Manager orchestration: gathers the current fair value via
//! [`super::position_tracker`], applies the pure
//! [`crate::domain::risk::exit_decision`] function, escalates to the AI
//! advisor for a second opinion once the P/L-to-risk ratio crosses the
//! configured trigger, and executes the close through the Order Manager.

use crate::application::order_manager::OrderManager;
use crate::application::position_tracker::PositionTracker;
use crate::domain::errors::BrokerError;
use crate::domain::ports::{AdvisorRequest, AiAdvisor, ComboLeg, ComboOrder, OrderPrice, RateLimitedClient, Store, TimeInForce};
use crate::domain::risk::circuit_breaker;
use crate::domain::risk::exit_decision::{self, ExitDecision};
use crate::domain::types::{AdvisorVerdict, AiDecision, CircuitBreakerEvent, CircuitBreakerReason, ExitAdjustment, ExitReason, Position, PositionStatus, Trade, TradeKind, TradeStatus};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const CLOSE_FILL_TIMEOUT_SECS: u64 = 30;

pub struct ExitManager {
    tracker: Arc<PositionTracker>,
    order_manager: Arc<OrderManager>,
    store: Arc<dyn Store>,
    ai_advisor: Option<Arc<dyn AiAdvisor>>,
    ai_exit_trigger_pl_ratio: f64,
    time_exit_dte: i64,
    account_size: Decimal,
    daily_max_loss_pct: f64,
    consecutive_loss_limit: usize,
    halt_duration_hours: i64,
}

impl ExitManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracker: Arc<PositionTracker>,
        order_manager: Arc<OrderManager>,
        store: Arc<dyn Store>,
        ai_advisor: Option<Arc<dyn AiAdvisor>>,
        ai_exit_trigger_pl_ratio: f64,
        time_exit_dte: i64,
        account_size: Decimal,
        daily_max_loss_pct: f64,
        consecutive_loss_limit: usize,
        halt_duration_hours: i64,
    ) -> Self {
        Self {
            tracker,
            order_manager,
            store,
            ai_advisor,
            ai_exit_trigger_pl_ratio,
            time_exit_dte,
            account_size,
            daily_max_loss_pct,
            consecutive_loss_limit,
            halt_duration_hours,
        }
    }

    /// Runs one evaluation pass for a single OPEN position. Returns `true`
    /// if a close was submitted. Does not give the caller a chance to
    /// divert a stop-out into a roll; use [`Self::decide`] +
    /// [`Self::execute`] directly when that matters (see
    /// `super::scheduler`'s exit-monitor tick).
    pub async fn evaluate(&self, position: &Position, today: NaiveDate) -> Result<bool, BrokerError> {
        let (decision, current_price) = self.decide(position, today).await?;
        match decision {
            ExitDecision::Hold => Ok(false),
            ExitDecision::Exit(_) => {
                self.execute(position, decision, current_price).await?;
                Ok(true)
            }
        }
    }

    /// Current fair value plus the exit decision it implies, without
    /// executing anything. Lets the caller consult the Roll Manager before
    /// committing to a close on a stop-loss / trailing-stop.
    pub async fn decide(&self, position: &Position, today: NaiveDate) -> Result<(ExitDecision, Decimal), BrokerError> {
        let current_price = self.tracker.refresh_price(position).await?;
        let days_to_expiration = (position.expiration - today).num_days();
        let previously_adjusted = position.highest_profit_seen > Decimal::ZERO;

        let mut decision = exit_decision::decide(
            current_price,
            position.trailing_stop,
            position.trailing_profit,
            days_to_expiration,
            self.time_exit_dte,
            previously_adjusted,
        );

        if decision == ExitDecision::Hold {
            decision = self.maybe_ai_override(position, current_price).await;
        }

        Ok((decision, current_price))
    }

    /// Submits the close implied by a non-`Hold` decision. A no-op (but not
    /// an error) if `decision` is `Hold`.
    pub async fn execute(&self, position: &Position, decision: ExitDecision, current_price: Decimal) -> Result<(), BrokerError> {
        if let ExitDecision::Exit(reason) = decision {
            self.close(position, reason, current_price).await?;
        }
        Ok(())
    }

    /// §4.12 AI override: once `|P/L| / max_risk` crosses
    /// `ai_exit_trigger_pl_ratio`, ask for a second opinion. `REJECT` ==
    /// `EXIT_NOW` (forces an immediate exit); `ADJUST` == `TIGHTEN_STOP` /
    /// `ADJUST_PROFIT` (advisory, folded into the next trailing update, not
    /// flow control here); `APPROVE` == `AGREE` (logged, ignored).
    async fn maybe_ai_override(&self, position: &Position, current_price: Decimal) -> ExitDecision {
        let Some(advisor) = &self.ai_advisor else {
            return ExitDecision::Hold;
        };
        if position.max_risk.is_zero() {
            return ExitDecision::Hold;
        }
        let pl_ratio = ((position.entry_credit - current_price).abs() / position.max_risk).to_f64().unwrap_or(0.0);
        if pl_ratio < self.ai_exit_trigger_pl_ratio || !advisor.can_request() {
            return ExitDecision::Hold;
        }

        let prompt = format!(
            "Position {} on {}: entry_credit={}, current_price={}, pl_ratio={:.2}. EXIT_NOW, TIGHTEN_STOP, ADJUST_PROFIT, or AGREE?",
            position.id, position.symbol, position.entry_credit, current_price, pl_ratio
        );
        let response = match advisor.evaluate(AdvisorRequest { prompt }).await {
            Ok(r) => r,
            Err(e) => {
                warn!(position_id = %position.id, error = %e, "AI exit override unavailable, holding");
                return ExitDecision::Hold;
            }
        };
        advisor.record_usage(dec!(0)).await;

        if let Err(e) = self
            .store
            .log_ai_decision(&AiDecision {
                id: Uuid::new_v4(),
                model_id: advisor.name().to_string(),
                decision_type: "exit_override".to_string(),
                recommendation: format!("{:?}", response.verdict),
                confidence: response.confidence_score as f64 / 10.0,
                vix: position.vix_entry,
                regime: position.regime_entry,
                created_at: Utc::now(),
            })
            .await
        {
            warn!(position_id = %position.id, error = %e, "failed to log AI exit-override decision");
        }

        match response.verdict {
            AdvisorVerdict::Reject => ExitDecision::Exit(ExitReason::AiOverrideExit),
            AdvisorVerdict::Adjust | AdvisorVerdict::Approve => ExitDecision::Hold,
        }
    }

    /// Persists a trailing-level update (ML-assisted or static fallback).
    pub async fn apply_trailing_update(&self, position: &Position, stop_multiplier: f64, profit_target_pct: f64, reason: &str) -> Result<(), crate::domain::errors::StoreError> {
        let (new_stop, new_profit) = exit_decision::update_trailing(position.entry_credit, position.trailing_stop, stop_multiplier, profit_target_pct);
        let highest_profit_seen = position.highest_profit_seen.max(position.entry_credit - new_profit);
        self.store.update_position_trailing(position.id, new_stop, new_profit, highest_profit_seen).await?;
        self.store
            .log_exit_adjustment(&ExitAdjustment {
                id: 0,
                position_id: position.id,
                ts: Utc::now(),
                old_stop: position.trailing_stop,
                new_stop,
                old_profit_target: position.trailing_profit,
                new_profit_target: new_profit,
                reason: reason.to_string(),
            })
            .await
    }

    /// Submits the closing combo and, only once the broker confirms a fill,
    /// transitions the Position to CLOSED with its realized P/L (§4.11:
    /// "Only Filled transitions a Position into ... CLOSED"). A combo that
    /// times out or resolves without filling leaves the position OPEN for
    /// the next exit-monitor tick to re-evaluate.
    async fn close(&self, position: &Position, reason: ExitReason, current_price: Decimal) -> Result<(), BrokerError> {
        let legs: Vec<ComboLeg> = position
            .legs
            .iter()
            .map(|leg| ComboLeg {
                con_id: leg.con_id,
                action: leg.action.reverse(),
                ratio: leg.quantity,
            })
            .collect();
        let price = match reason {
            ExitReason::TimeExit | ExitReason::AiOverrideExit => OrderPrice::Market,
            _ => OrderPrice::Limit(current_price),
        };
        let trade_id = Uuid::new_v4();
        let trade = Trade {
            id: trade_id,
            position_id: Some(position.id),
            symbol: position.symbol.clone(),
            kind: TradeKind::Close,
            status: TradeStatus::Submitted,
            requested_quantity: position.contracts,
            filled_quantity: 0,
            fill_price: None,
            vix_at_entry: position.vix_entry,
            regime_at_entry: position.regime_entry,
            submitted_at: Utc::now(),
            notes: Some(reason.to_string()),
        };
        let order = ComboOrder {
            action: crate::domain::types::Action::Sell,
            quantity: position.contracts,
            price,
            time_in_force: TimeInForce::Day,
        };
        let handle = self.order_manager.submit(trade, &legs, order).await?;
        info!(position_id = %position.id, %reason, "close combo submitted");

        let filled = self.order_manager.await_fill(&handle.order_id, Duration::from_secs(CLOSE_FILL_TIMEOUT_SECS)).await?;
        let Some(filled_handle) = filled else {
            warn!(position_id = %position.id, "close combo did not fill within the window, position stays open");
            return Ok(());
        };
        if !matches!(filled_handle.status, TradeStatus::Filled) {
            warn!(position_id = %position.id, status = ?filled_handle.status, "close combo resolved without a fill, position stays open");
            return Ok(());
        }

        let pnl = exit_decision::realized_pnl(position.entry_credit, current_price, position.contracts);

        if let Err(e) = self.store.close_trade(trade_id, TradeStatus::Filled, Some(current_price), position.contracts).await {
            warn!(position_id = %position.id, error = %e, "failed to record close trade fill");
        }
        if let Err(e) = self
            .store
            .mark_position_closed(position.id, PositionStatus::Closed, Some(current_price), Some(reason), Some(pnl))
            .await
        {
            warn!(position_id = %position.id, error = %e, "failed to mark position closed");
        }
        info!(position_id = %position.id, %reason, realized_pnl = %pnl, "position closed");

        self.check_circuit_breaker().await;

        Ok(())
    }

    /// §4.10.1 / §8: re-evaluates both circuit breaker guards against the
    /// realized P/L of recently closed positions. Trips the breaker — if it
    /// isn't already tripped — by persisting a fresh, unreset
    /// `CircuitBreakerEvent`. Runs after every confirmed close so a string
    /// of losses or a bad day halts new entries on the very next gate 1
    /// check.
    async fn check_circuit_breaker(&self) {
        let already_active = match self.store.active_circuit_breaker_event().await {
            Ok(event) => event.map(|e| e.is_active()).unwrap_or(false),
            Err(e) => {
                warn!(error = %e, "failed to read active circuit breaker event");
                return;
            }
        };
        if already_active {
            return;
        }

        match self.store.recent_realized_pnls(self.consecutive_loss_limit).await {
            Ok(recent) => {
                if circuit_breaker::consecutive_losses_breached(&recent, self.consecutive_loss_limit) {
                    self.trip_circuit_breaker(CircuitBreakerReason::ConsecutiveLosses, self.consecutive_loss_limit as f64).await;
                    return;
                }
            }
            Err(e) => warn!(error = %e, "failed to read recent realized P/L for circuit breaker check"),
        }

        let since = Utc::now() - chrono::Duration::days(1);
        match self.store.daily_realized_pnl(since).await {
            Ok(daily_pnl) => {
                if circuit_breaker::daily_loss_breached(daily_pnl, self.account_size, self.daily_max_loss_pct) {
                    self.trip_circuit_breaker(CircuitBreakerReason::DailyMaxLoss, self.daily_max_loss_pct).await;
                }
            }
            Err(e) => warn!(error = %e, "failed to read daily realized P/L for circuit breaker check"),
        }
    }

    async fn trip_circuit_breaker(&self, reason: CircuitBreakerReason, threshold_value: f64) {
        let event = CircuitBreakerEvent {
            id: 0,
            triggered_ts: Utc::now(),
            reason,
            threshold_value,
            reset_ts: None,
            reset_by: None,
            halt_duration_hours: Some(self.halt_duration_hours),
            notes: None,
        };
        match self.store.log_circuit_breaker_event(&event).await {
            Ok(id) => warn!(circuit_breaker_event_id = id, %reason, "circuit breaker tripped"),
            Err(e) => warn!(error = %e, %reason, "circuit breaker tripped but failed to persist the event"),
        }
    }
}
