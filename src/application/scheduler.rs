//! §4.15 Scheduler: a single deadline-driven heartbeat rather than one
//! naive `sleep` loop per cadence, so a slow iteration never lets any one
//! cadence drift (REDESIGN FLAGS: "Scheduler drift from naive sleep
//! loops"). Every cadence is a "have I fired since X" check against the
//! current Eastern wall clock, evaluated on each tick of a fixed 60 s
//! `tokio::time::interval` with `MissedTickBehavior::Skip`.

use crate::application::chain_fetcher::ChainFetcher;
use crate::application::exit_manager::ExitManager;
use crate::application::pipeline::EntryPipeline;
use crate::application::order_manager::OrderManager;
use crate::application::reconciler::Reconciler;
use crate::application::roll_manager::RollManager;
use crate::domain::config::StrategyConfig;
use crate::domain::market::calendar::MarketCalendar;
use crate::domain::ports::{Clock, Notifier, NotifierEvent, Store};
use crate::domain::risk::exit_decision::ExitDecision;
use crate::domain::types::{Action, ExitReason, OptionRight, Position, PositionStatus};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const TICK: std::time::Duration = std::time::Duration::from_secs(60);
const PREMARKET_TIME: NaiveTime = NaiveTime::from_hms_opt(8, 45, 0).expect("valid time");
const SHADOW_EVAL_TIME: NaiveTime = NaiveTime::from_hms_opt(16, 15, 0).expect("valid time");
const WEEKLY_SUMMARY_TIME: NaiveTime = NaiveTime::from_hms_opt(17, 0, 0).expect("valid time");
const NIGHTLY_RECONCILE_TIME: NaiveTime = NaiveTime::from_hms_opt(0, 5, 0).expect("valid time");

/// Market-hours scan cadence, §4.15: `(start, end, interval_minutes)`.
const SCAN_BANDS: [(NaiveTime, NaiveTime, i64); 4] = [
    (MarketCalendar::OPEN, NaiveTime::from_hms_opt(10, 30, 0).unwrap(), 15),
    (NaiveTime::from_hms_opt(10, 30, 0).unwrap(), NaiveTime::from_hms_opt(11, 0, 0).unwrap(), 30),
    (NaiveTime::from_hms_opt(11, 0, 0).unwrap(), NaiveTime::from_hms_opt(14, 30, 0).unwrap(), 60),
    (NaiveTime::from_hms_opt(14, 30, 0).unwrap(), MarketCalendar::CLOSE, 30),
];

#[derive(Default)]
struct ScheduleState {
    last_premarket_scan: Option<NaiveDate>,
    last_scan_at: Option<DateTime<Utc>>,
    last_ttl_sweep_at: Option<DateTime<Utc>>,
    last_shadow_eval: Option<NaiveDate>,
    last_weekly_summary: Option<NaiveDate>,
    last_monthly_retrain: Option<(i32, u32)>,
    last_nightly_reconcile: Option<NaiveDate>,
}

pub struct Scheduler {
    clock: Arc<dyn Clock>,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    entry_pipeline: Arc<EntryPipeline>,
    exit_manager: Arc<ExitManager>,
    roll_manager: Arc<RollManager>,
    chain_fetcher: Arc<ChainFetcher>,
    order_manager: Arc<OrderManager>,
    reconciler: Arc<Reconciler>,
    strategy_cfg: StrategyConfig,
    cleanup_interval_minutes: i64,
    order_ttl_minutes: i64,
    shutdown: Arc<Notify>,
    state: Mutex<ScheduleState>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Arc<dyn Clock>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        entry_pipeline: Arc<EntryPipeline>,
        exit_manager: Arc<ExitManager>,
        roll_manager: Arc<RollManager>,
        chain_fetcher: Arc<ChainFetcher>,
        order_manager: Arc<OrderManager>,
        reconciler: Arc<Reconciler>,
        strategy_cfg: StrategyConfig,
        cleanup_interval_minutes: i64,
        order_ttl_minutes: i64,
    ) -> Self {
        Self {
            clock,
            store,
            notifier,
            entry_pipeline,
            exit_manager,
            roll_manager,
            chain_fetcher,
            order_manager,
            reconciler,
            strategy_cfg,
            cleanup_interval_minutes,
            order_ttl_minutes,
            shutdown: Arc::new(Notify::new()),
            state: Mutex::new(ScheduleState::default()),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Runs until `shutdown_handle().notify_one()` is called. Every tick is
    /// self-contained: one cadence's failure is logged and the next tick
    /// still evaluates every other cadence (§4.15: "a single failure never
    /// corrupts state; the next tick retries").
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("scheduler shutdown signal received");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        let now_eastern = self.clock.now_eastern();
        let today = now_eastern.date_naive();
        let time = now_eastern.time();
        let market_open = self.clock.is_market_open();

        let mut state = self.state.lock().await;

        if time >= PREMARKET_TIME && time < MarketCalendar::OPEN && state.last_premarket_scan != Some(today) {
            state.last_premarket_scan = Some(today);
            drop(state);
            self.run_scan("premarket").await;
            state = self.state.lock().await;
        }

        if market_open {
            if let Some(interval_minutes) = scan_band_interval(time) {
                let due = match state.last_scan_at {
                    None => true,
                    Some(last) => (Utc::now() - last).num_minutes() >= interval_minutes,
                };
                if due {
                    state.last_scan_at = Some(Utc::now());
                    drop(state);
                    self.run_scan("market-hours").await;
                    self.run_exit_monitor(today).await;
                    state = self.state.lock().await;
                }
            }

            let ttl_due = match state.last_ttl_sweep_at {
                None => true,
                Some(last) => (Utc::now() - last).num_minutes() >= self.cleanup_interval_minutes,
            };
            if ttl_due {
                state.last_ttl_sweep_at = Some(Utc::now());
                drop(state);
                self.run_ttl_sweep().await;
                state = self.state.lock().await;
            }
        }

        if time >= SHADOW_EVAL_TIME && state.last_shadow_eval != Some(today) {
            state.last_shadow_eval = Some(today);
            drop(state);
            self.run_shadow_evaluation(today).await;
            state = self.state.lock().await;
        }

        if now_eastern.weekday() == chrono::Weekday::Mon && time >= WEEKLY_SUMMARY_TIME && state.last_weekly_summary != Some(today) {
            state.last_weekly_summary = Some(today);
            drop(state);
            self.run_weekly_summary().await;
            state = self.state.lock().await;
        }

        let this_month = (today.year(), today.month());
        if today.day() == 1 && state.last_monthly_retrain != Some(this_month) {
            state.last_monthly_retrain = Some(this_month);
            drop(state);
            self.run_monthly_retrain_signal();
            state = self.state.lock().await;
        }

        if time >= NIGHTLY_RECONCILE_TIME && time < PREMARKET_TIME && state.last_nightly_reconcile != Some(today) {
            state.last_nightly_reconcile = Some(today);
            drop(state);
            self.run_reconcile().await;
        }
    }

    async fn run_scan(&self, label: &str) {
        let report = self.entry_pipeline.run_once().await;
        info!(label, scanned = report.scanned, opened = report.opened, rejected = report.rejected, "scan tick complete");
    }

    /// §4.12/§4.13: evaluates every open position; a `STOP_LOSS` or
    /// `TRAILING_STOP` decision is first offered to the Roll Manager before
    /// falling through to a close.
    async fn run_exit_monitor(&self, today: NaiveDate) {
        let positions = match self.store.open_positions().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "open_positions unavailable, skipping exit-monitor tick");
                return;
            }
        };
        for position in positions {
            if let Err(e) = self.evaluate_one_position(&position, today).await {
                warn!(position_id = %position.id, error = %e, "exit evaluation failed");
            }
        }
    }

    async fn evaluate_one_position(&self, position: &Position, today: NaiveDate) -> Result<(), crate::domain::errors::BrokerError> {
        let (decision, current_price) = self.exit_manager.decide(position, today).await?;
        let rollable = matches!(decision, ExitDecision::Exit(ExitReason::StopLoss) | ExitDecision::Exit(ExitReason::TrailingStop));

        if rollable {
            if let Some(new_position) = self.attempt_roll(position).await {
                if let Err(e) = self.store.mark_position_closed(position.id, PositionStatus::Rolled, None, None, None).await {
                    warn!(position_id = %position.id, error = %e, "failed to mark rolled position closed");
                }
                if let Err(e) = self.store.save_position(&new_position).await {
                    warn!(position_id = %new_position.id, error = %e, "failed to persist rolled position");
                }
                info!(old_position_id = %position.id, new_position_id = %new_position.id, "position rolled");
                return Ok(());
            }
        }

        self.exit_manager.execute(position, decision, current_price).await
    }

    /// Attempts a roll; returns `None` if the position doesn't qualify, a
    /// fresh quote can't be obtained, or the roll itself didn't fill.
    async fn attempt_roll(&self, position: &Position) -> Option<Position> {
        let width = self.strategy_cfg.default_width;
        let short_call_strike = position.legs.iter().find(|l| l.action == Action::Sell && l.option_type == OptionRight::Call).map(|l| l.strike);
        let short_put_strike = position.legs.iter().find(|l| l.action == Action::Sell && l.option_type == OptionRight::Put).map(|l| l.strike);

        let (underlying_price, _) = self.chain_fetcher.underlying_quote(&position.symbol).await.ok()?;

        let mut max_short_delta = 0.0_f64;
        for leg in position.legs.iter().filter(|l| l.action == Action::Sell) {
            if let Ok(q) = self.short_leg_quote(leg.con_id).await {
                max_short_delta = max_short_delta.max(q.delta.abs());
            }
        }

        if !RollManager::should_trigger(underlying_price, short_call_strike, short_put_strike, max_short_delta) {
            return None;
        }

        let call_tested = short_call_strike.is_some_and(|k| underlying_price >= k);
        let (tested_strike, right) = if call_tested {
            (short_call_strike?, OptionRight::Call)
        } else {
            (short_put_strike?, OptionRight::Put)
        };

        let new_expiration = self.roll_manager.propose_new_expiration(position.expiration);
        let new_short_strike = RollManager::proposed_strikes(tested_strike, width, right);
        let new_long_strike = match right {
            OptionRight::Call => new_short_strike + width,
            OptionRight::Put => new_short_strike - width,
        };

        let new_short_quote = self.chain_fetcher.fetch_single_leg(&position.symbol, new_short_strike, right, new_expiration).await.ok()?;
        let new_long_quote = self.chain_fetcher.fetch_single_leg(&position.symbol, new_long_strike, right, new_expiration).await.ok()?;

        match self.roll_manager.attempt_roll(position, width, &new_short_quote, &new_long_quote).await {
            Ok(result) => result,
            Err(e) => {
                warn!(position_id = %position.id, error = %e, "roll attempt failed");
                None
            }
        }
    }

    async fn short_leg_quote(&self, con_id: i64) -> Result<crate::domain::types::OptionQuote, crate::domain::errors::BrokerError> {
        self.chain_fetcher.fetch_single_leg_by_con_id(con_id).await
    }

    async fn run_ttl_sweep(&self) {
        match self.order_manager.cancel_stale_orders(self.order_ttl_minutes).await {
            Ok(cancelled) if !cancelled.is_empty() => info!(count = cancelled.len(), "TTL sweep cancelled stale orders"),
            Ok(_) => debug!("TTL sweep found nothing stale"),
            Err(e) => warn!(error = %e, "TTL sweep failed"),
        }
    }

    async fn run_shadow_evaluation(&self, today: NaiveDate) {
        let pending = match self.store.pending_shadow_trades().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "pending_shadow_trades unavailable, skipping shadow evaluation");
                return;
            }
        };
        for shadow in pending.into_iter().filter(|s| s.candidate_expiration <= today) {
            let outcome = self.evaluate_shadow_outcome(&shadow).await;
            if let Err(e) = self.store.update_shadow_outcome(shadow.id, outcome).await {
                warn!(shadow_id = %shadow.id, error = %e, "failed to persist shadow outcome");
            }
        }
    }

    /// Approximates whether a rejected candidate's short strike would have
    /// been breached by expiration, using the latest available underlying
    /// price as a stand-in for the price on `candidate_expiration` (no
    /// historical-on-date broker query exists).
    async fn evaluate_shadow_outcome(&self, shadow: &crate::domain::types::ShadowTrade) -> crate::domain::types::ShadowOutcome {
        use crate::domain::types::{ShadowOutcome, StrategyKind};

        let Ok(features) = serde_json::from_str::<serde_json::Value>(&shadow.features_json) else {
            return ShadowOutcome::Neutral;
        };
        let Some(short_strike) = features.get("short_strike").and_then(|v| v.as_str()).and_then(|s| s.parse::<Decimal>().ok()) else {
            return ShadowOutcome::Neutral;
        };
        let Ok((price, _)) = self.chain_fetcher.underlying_quote(&shadow.symbol).await else {
            return ShadowOutcome::Neutral;
        };

        let breached = if shadow.strategy == StrategyKind::VerticalCreditPut { price < short_strike } else { price > short_strike };
        if breached {
            ShadowOutcome::GoodReject
        } else {
            ShadowOutcome::MissedOpportunity
        }
    }

    async fn run_weekly_summary(&self) {
        let losing = self.store.losing_trades(7, 500).await.unwrap_or_else(|e| {
            warn!(error = %e, "losing_trades unavailable for weekly summary");
            Vec::new()
        });
        let realized_pnl: Decimal = losing.iter().filter_map(|t| t.fill_price).sum();
        let open_positions = self.store.open_positions().await.map(|p| p.len()).unwrap_or(0);
        self.notifier.publish(NotifierEvent::DailySummary { realized_pnl, open_positions }).await;
        info!(losing_trades = losing.len(), "weekly loss-analysis summary published");
    }

    /// No dedicated retrain-trigger port or `NotifierEvent` variant exists
    /// (§4.17's event list is exhaustive and doesn't include one); this is
    /// logged as a structured event for the external retraining job to
    /// pick up from the log stream.
    fn run_monthly_retrain_signal(&self) {
        info!(event = "retrain_signal", "first-of-month retraining signal");
    }

    async fn run_reconcile(&self) {
        if let Err(e) = self.reconciler.reconcile().await {
            warn!(error = %e, "nightly reconciliation failed");
        }
    }
}

fn scan_band_interval(time: NaiveTime) -> Option<i64> {
    SCAN_BANDS.iter().find(|(start, end, _)| time >= *start && time < *end).map(|(_, _, interval)| *interval)
}
