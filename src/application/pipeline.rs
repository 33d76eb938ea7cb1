//! §2 entry data flow: Screener -> AI batch ranker -> Strategy Builder ->
//! Risk Gates -> Order Manager -> Store + Notifier. One [`EntryPipeline::run_once`]
//! call is one scheduler tick's worth of scanning.

use crate::application::chain_fetcher::ChainFetcher;
use crate::application::order_manager::OrderManager;
use crate::application::portfolio_exposure::PortfolioExposureTracker;
use crate::application::risk_gates::{GateContext, Pipeline as RiskGatePipeline};
use crate::application::screener::Screener;
use crate::domain::config::{RiskConfig, StrategyConfig};
use crate::domain::errors::BrokerError;
use crate::domain::market::features::{trailing_return, FeatureVector};
use crate::domain::market::regime_classifier::{preferred_strategies, Classifier};
use crate::domain::ports::{AdvisorRequest, AiAdvisor, BrokerAdapter, Clock, ComboLeg, ComboOrder, Notifier, NotifierEvent, OrderPrice, Store, TimeInForce};
use crate::domain::risk::exit_decision::{STATIC_PROFIT_TARGET_PCT, STATIC_STOP_MULTIPLIER};
use crate::domain::strategy::builder::{self, BuiltStrategy, ProposedLeg};
use crate::domain::types::{Action, Candidate, ClassifierMode, Leg, OptionQuote, OptionRight, Position, PositionStatus, StrategyKind, TermStructure, Trade, TradeKind, TradeStatus};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const ENTRY_FILL_TIMEOUT_SECS: u64 = 30;
const SPY_SYMBOL: &str = "SPY";
const VIX_SYMBOL: &str = "VIX";
const VIX3M_SYMBOL: &str = "VIX3M";
const SMA_PERIOD: usize = 50;

pub struct EntryPipeline {
    broker: Arc<dyn BrokerAdapter>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    screener: Arc<Screener>,
    chain_fetcher: Arc<ChainFetcher>,
    classifier: Arc<Classifier>,
    order_manager: Arc<OrderManager>,
    risk_gates: Arc<RiskGatePipeline>,
    exposure: Arc<PortfolioExposureTracker>,
    ai_advisor: Option<Arc<dyn AiAdvisor>>,
    risk_cfg: RiskConfig,
    strategy_cfg: StrategyConfig,
    allow_delayed_data: bool,
}

#[derive(Debug, Default)]
pub struct EntryReport {
    pub scanned: usize,
    pub opened: usize,
    pub rejected: usize,
}

impl EntryPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        broker: Arc<dyn BrokerAdapter>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        screener: Arc<Screener>,
        chain_fetcher: Arc<ChainFetcher>,
        classifier: Arc<Classifier>,
        order_manager: Arc<OrderManager>,
        risk_gates: Arc<RiskGatePipeline>,
        exposure: Arc<PortfolioExposureTracker>,
        ai_advisor: Option<Arc<dyn AiAdvisor>>,
        risk_cfg: RiskConfig,
        strategy_cfg: StrategyConfig,
        allow_delayed_data: bool,
    ) -> Self {
        Self {
            broker,
            store,
            clock,
            notifier,
            screener,
            chain_fetcher,
            classifier,
            order_manager,
            risk_gates,
            exposure,
            ai_advisor,
            risk_cfg,
            strategy_cfg,
            allow_delayed_data,
        }
    }

    /// Runs one full scan-to-entry pass. Never returns an error: a single
    /// candidate's failure is logged and the scan continues, per §9 ("a
    /// single component failure must not halt the process").
    pub async fn run_once(&self) -> EntryReport {
        let mut report = EntryReport::default();
        let today = self.clock.now_eastern().date_naive();

        let (regime, vix) = match self.market_regime().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "market regime snapshot unavailable, skipping this scan");
                self.notifier.publish(NotifierEvent::PipelineError { detail: format!("regime snapshot failed: {e}") }).await;
                return report;
            }
        };
        let vix_f64 = vix.to_f64().unwrap_or(0.0);
        let preferred = preferred_strategies(regime, vix_f64, self.risk_cfg.vix_panic_threshold.to_f64().unwrap_or(f64::MAX));
        if preferred.is_empty() {
            info!(%regime, %vix, "no preferred strategies this regime/VIX combination, skipping scan");
            return report;
        }

        let account = match self.broker.account_summary().await {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "account summary unavailable, skipping this scan");
                return report;
            }
        };

        let candidates = self.screener.scan().await;
        report.scanned = candidates.len();

        for candidate in candidates {
            if let Some(advisor) = &self.ai_advisor {
                if !advisor.can_request() {
                    info!(remaining = report.scanned - report.opened - report.rejected, "AI advisor budget exhausted, stopping scan early");
                    break;
                }
            }
            match self.evaluate_candidate(&candidate, &preferred, today, vix, regime, account.available_funds).await {
                Ok(true) => report.opened += 1,
                Ok(false) => report.rejected += 1,
                Err(e) => warn!(symbol = %candidate.symbol, error = %e, "candidate evaluation failed"),
            }
        }

        info!(scanned = report.scanned, opened = report.opened, rejected = report.rejected, "scan complete");
        report
    }

    async fn evaluate_candidate(
        &self,
        candidate: &Candidate,
        preferred: &[StrategyKind],
        today: chrono::NaiveDate,
        vix: Decimal,
        regime: crate::domain::types::Regime,
        available_funds: Decimal,
    ) -> Result<bool, BrokerError> {
        let chain = self
            .chain_fetcher
            .fetch_chain(&candidate.symbol, candidate.price, self.strategy_cfg.default_width, today, self.strategy_cfg.min_dte, self.strategy_cfg.max_dte, 4)
            .await;
        if chain.is_empty() {
            debug!(symbol = %candidate.symbol, "no qualifiable chain, skipping");
            return Ok(false);
        }

        let Some(built) = preferred.iter().find_map(|kind| try_build(*kind, &candidate.symbol, &chain, candidate.price, today, available_funds, &self.risk_cfg, &self.strategy_cfg)) else {
            debug!(symbol = %candidate.symbol, "no preferred strategy could be built from this chain");
            return Ok(false);
        };

        let term_structure = self.term_structure().await;
        let advisor_response = self.ask_advisor(candidate, &built).await;

        let Some(short_leg) = built.legs.iter().find(|l| l.action == Action::Sell) else {
            debug!(symbol = %candidate.symbol, "built strategy has no short leg, skipping");
            return Ok(false);
        };
        let Some(short_quote) = chain.iter().find(|q| q.con_id == short_leg.con_id) else {
            debug!(symbol = %candidate.symbol, "short leg quote missing from chain, skipping");
            return Ok(false);
        };
        let has_short_call = built.legs.iter().any(|l| l.action == Action::Sell && l.option_type == OptionRight::Call);
        let expected_move = candidate.price * Decimal::try_from(short_quote.implied_vol).unwrap_or_default() * Decimal::try_from(((built.expiration - today).num_days().max(0) as f64 / 365.0).sqrt()).unwrap_or_default();

        let current_bwd = self.exposure.current_bwd().await;
        let proposed_bwd_contribution = self.exposure.proposed_contribution(&candidate.symbol, &chain, &built.legs).await;

        let ctx = GateContext {
            symbol: candidate.symbol.clone(),
            strategy: built.kind,
            price: candidate.price,
            today,
            now: self.clock.now(),
            vix,
            term_structure,
            has_short_call,
            short_strike: short_leg.strike,
            expected_move,
            short_quote,
            current_bwd,
            proposed_bwd_contribution,
            advisor_response: advisor_response.as_ref(),
            chain: &chain,
            candidate_expiration: built.expiration,
        };

        if let Err(e) = self.risk_gates.evaluate(ctx).await {
            debug!(symbol = %candidate.symbol, error = %e, "candidate rejected by risk gates");
            return Ok(false);
        }

        self.open_position(candidate, &built, vix, regime).await?;
        Ok(true)
    }

    async fn open_position(&self, candidate: &Candidate, built: &BuiltStrategy, vix: Decimal, regime: crate::domain::types::Regime) -> Result<(), BrokerError> {
        let legs: Vec<ComboLeg> = built.legs.iter().map(|l| ComboLeg { con_id: l.con_id, action: l.action, ratio: l.quantity }).collect();
        let overall_action = if built.net_credit >= Decimal::ZERO { Action::Sell } else { Action::Buy };
        let trade = Trade {
            id: Uuid::new_v4(),
            position_id: None,
            symbol: candidate.symbol.clone(),
            kind: TradeKind::Open,
            status: TradeStatus::Submitted,
            requested_quantity: built.contracts,
            filled_quantity: 0,
            fill_price: None,
            vix_at_entry: vix,
            regime_at_entry: regime,
            submitted_at: chrono::Utc::now(),
            notes: Some(built.kind.to_string()),
        };
        let order = ComboOrder {
            action: overall_action,
            quantity: built.contracts,
            price: OrderPrice::Limit(built.net_credit.abs()),
            time_in_force: TimeInForce::Day,
        };

        let handle = self.order_manager.submit(trade, &legs, order).await?;
        let filled = self.order_manager.await_fill(&handle.order_id, Duration::from_secs(ENTRY_FILL_TIMEOUT_SECS)).await?;
        let Some(filled_handle) = filled else {
            warn!(symbol = %candidate.symbol, "entry combo did not fill within the window, abandoning");
            return Ok(());
        };
        if !matches!(filled_handle.status, TradeStatus::Filled) {
            warn!(symbol = %candidate.symbol, status = ?filled_handle.status, "entry combo resolved without a fill");
            return Ok(());
        }

        let credit_basis = built.net_credit.abs();
        let position_id = Uuid::new_v4();
        let position = Position {
            id: position_id,
            symbol: candidate.symbol.clone(),
            strategy: built.kind,
            entry_ts: chrono::Utc::now(),
            expiration: built.expiration,
            contracts: built.contracts,
            entry_credit: built.net_credit,
            max_risk: (built.width - built.net_credit.max(Decimal::ZERO)) * dec!(100) * Decimal::from(built.contracts),
            status: PositionStatus::Open,
            exit_ts: None,
            exit_price: None,
            exit_reason: None,
            realized_pnl: None,
            vix_entry: vix,
            regime_entry: regime,
            legs: proposed_legs_to_legs(position_id, &built.legs),
            trailing_stop: credit_basis * Decimal::try_from(STATIC_STOP_MULTIPLIER).unwrap_or_default(),
            trailing_profit: credit_basis * Decimal::try_from(STATIC_PROFIT_TARGET_PCT).unwrap_or_default(),
            highest_profit_seen: Decimal::ZERO,
            stop_multiplier: Decimal::try_from(STATIC_STOP_MULTIPLIER).unwrap_or_default(),
            profit_target_pct: Decimal::try_from(STATIC_PROFIT_TARGET_PCT).unwrap_or_default(),
            ml_confidence: None,
            ml_last_update: None,
        };

        if let Err(e) = self.store.save_position(&position).await {
            warn!(symbol = %candidate.symbol, error = %e, "failed to persist newly opened position");
        }
        self.notifier
            .publish(NotifierEvent::TradeOpened { symbol: candidate.symbol.clone(), strategy: built.kind.to_string(), credit: built.net_credit })
            .await;
        info!(symbol = %candidate.symbol, strategy = %built.kind, credit = %built.net_credit, "position opened");
        Ok(())
    }

    /// §2 AI batch ranker stage: asks the advisor for a second opinion on the
    /// already-built candidate structure; its response also feeds gate 9
    /// (AI sanity check). `None` propagates through unchanged when no
    /// advisor is configured or the call fails — gate 9 then correctly
    /// refuses to auto-approve.
    async fn ask_advisor(&self, candidate: &Candidate, built: &BuiltStrategy) -> Option<crate::domain::ports::AdvisorResponse> {
        let advisor = self.ai_advisor.as_ref()?;
        if !advisor.can_request() {
            return None;
        }
        let prompt = format!(
            "Evaluate candidate {} strategy={} expiration={} contracts={} net_credit={}. Approve, reject, or suggest an adjustment.",
            candidate.symbol, built.kind, built.expiration, built.contracts, built.net_credit
        );
        match advisor.evaluate(AdvisorRequest { prompt }).await {
            Ok(response) => {
                advisor.record_usage(dec!(0)).await;
                Some(response)
            }
            Err(e) => {
                warn!(symbol = %candidate.symbol, error = %e, "AI advisor call failed");
                None
            }
        }
    }

    /// VIX/VIX3M ratio and SPY trend, classified once per scan (market-wide,
    /// not per-candidate). Returns `(regime, vix)`.
    async fn market_regime(&self) -> Result<(crate::domain::types::Regime, Decimal), BrokerError> {
        let (vix_price, _) = self.chain_fetcher.underlying_quote(VIX_SYMBOL).await?;
        let spy_closes = self.chain_fetcher.recent_closes(SPY_SYMBOL, SMA_PERIOD + 20).await.unwrap_or_default();
        let return_20d = trailing_return(&spy_closes, 20).unwrap_or(0.0);
        let price_above_sma50 = match (crate::domain::market::features::sma(&spy_closes, SMA_PERIOD), spy_closes.last()) {
            (Some(sma), Some(last)) => *last >= sma,
            _ => false,
        };
        let features = FeatureVector {
            vix: vix_price.to_f64().unwrap_or(0.0),
            return_20d,
            price_above_sma50,
            ..Default::default()
        };
        let (regime, mode) = self.classifier.classify(&features);
        if mode == ClassifierMode::RuleBased {
            debug!(%regime, vix = %vix_price, "classified via rule-based fallback");
        }
        Ok((regime, vix_price))
    }

    async fn term_structure(&self) -> TermStructure {
        let vix = self.chain_fetcher.underlying_quote(VIX_SYMBOL).await;
        let vix3m = self.chain_fetcher.underlying_quote(VIX3M_SYMBOL).await;
        match (vix, vix3m) {
            (Ok((v, _)), Ok((v3, _))) if !v3.is_zero() => {
                if v / v3 > Decimal::ONE {
                    TermStructure::Backwardation
                } else {
                    TermStructure::Contango
                }
            }
            _ => TermStructure::Unknown,
        }
    }
}

/// Dispatches to the matching pure builder. `VerticalDebitCall`/`Put`,
/// `Pmcc` and `JadeLizard` have no builder (§4.9 only describes credit
/// vertical/iron condor/iron butterfly/calendar construction) and are
/// skipped here rather than built.
fn try_build(kind: StrategyKind, symbol: &str, chain: &[OptionQuote], price: Decimal, today: chrono::NaiveDate, available_funds: Decimal, risk_cfg: &RiskConfig, strategy_cfg: &StrategyConfig) -> Option<BuiltStrategy> {
    match kind {
        StrategyKind::IronCondor => builder::build_iron_condor(symbol, chain, today, available_funds, risk_cfg, strategy_cfg),
        StrategyKind::IronButterfly => builder::build_iron_butterfly(symbol, chain, price, today, available_funds, risk_cfg, strategy_cfg),
        StrategyKind::VerticalCreditCall => builder::build_vertical_credit(symbol, chain, OptionRight::Call, today, available_funds, risk_cfg, strategy_cfg),
        StrategyKind::VerticalCreditPut => builder::build_vertical_credit(symbol, chain, OptionRight::Put, today, available_funds, risk_cfg, strategy_cfg),
        StrategyKind::Calendar => try_build_calendar(symbol, chain, price, available_funds, risk_cfg),
        StrategyKind::VerticalDebitCall | StrategyKind::VerticalDebitPut | StrategyKind::Pmcc | StrategyKind::JadeLizard => None,
    }
}

/// Picks the nearest two distinct expirations in the chain and the ATM
/// call strike at the near one, then defers to [`builder::build_calendar`].
fn try_build_calendar(symbol: &str, chain: &[OptionQuote], price: Decimal, available_funds: Decimal, risk_cfg: &RiskConfig) -> Option<BuiltStrategy> {
    let mut expirations: Vec<chrono::NaiveDate> = chain.iter().map(|q| q.expiration).collect();
    expirations.sort();
    expirations.dedup();
    let near = *expirations.first()?;
    let far = *expirations.iter().find(|&&e| e > near)?;
    let strike = chain.iter().filter(|q| q.expiration == near && q.right == OptionRight::Call).min_by_key(|q| (q.strike - price).abs())?.strike;
    builder::build_calendar(symbol, chain, strike, OptionRight::Call, near, far, available_funds, risk_cfg)
}

fn proposed_legs_to_legs(position_id: Uuid, legs: &[ProposedLeg]) -> Vec<Leg> {
    legs.iter()
        .map(|l| Leg {
            position_id,
            contract_symbol: l.contract_symbol.clone(),
            action: l.action,
            strike: l.strike,
            option_type: l.option_type,
            quantity: l.quantity,
            entry_price: l.limit_price,
            con_id: l.con_id,
        })
        .collect()
}
