//! §4.10 Risk Gates orchestration. `domain::risk` holds nine pure predicate
//! functions; this `Pipeline` gathers the I/O each one needs (store reads,
//! rate-limited external clients) and runs them in the mandated order,
//! short-circuiting on the first failure and recording the rejection as a
//! `ShadowTrade` for later evaluation (§4.10: "Rejected candidates are
//! recorded as ShadowTrades").

use crate::domain::config::{RiskConfig, StrategyConfig};
use crate::domain::errors::RiskGateError;
use crate::domain::ports::{AdvisorResponse, DividendSource, EarningsSource, Store};
use crate::domain::risk::{
    circuit_breaker, dividend_blackout, earnings_blackout, greeks_validation, liquidity, portfolio_exposure, sanity_check,
    vix_gate,
};
use crate::domain::types::{OptionQuote, ShadowOutcome, ShadowTrade, StrategyKind, TermStructure};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything the nine gates need, assembled by the caller (the
/// screener/strategy-builder stage of [`super::pipeline`]) before a single
/// [`Pipeline::evaluate`] call.
pub struct GateContext<'a> {
    pub symbol: String,
    pub strategy: StrategyKind,
    pub price: Decimal,
    pub today: NaiveDate,
    pub now: DateTime<Utc>,
    pub vix: Decimal,
    pub term_structure: TermStructure,
    pub has_short_call: bool,
    pub short_strike: Decimal,
    pub expected_move: Decimal,
    /// The short leg's live quote — liquidity and Greeks gates key off it.
    pub short_quote: &'a OptionQuote,
    /// Current portfolio beta-weighted delta before this candidate.
    pub current_bwd: f64,
    /// This candidate's beta-weighted delta contribution if accepted.
    pub proposed_bwd_contribution: f64,
    /// `None` means the AI advisor is unavailable this pass; per §7
    /// (`ErrAIUnavailable`) a mandatory gate with no advisor never
    /// auto-approves.
    pub advisor_response: Option<&'a AdvisorResponse>,
    pub chain: &'a [OptionQuote],
    pub candidate_expiration: NaiveDate,
}

pub struct Pipeline {
    store: Arc<dyn Store>,
    dividend_source: Option<Arc<dyn DividendSource>>,
    earnings_source: Option<Arc<dyn EarningsSource>>,
    risk_cfg: RiskConfig,
    strategy_cfg: StrategyConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        dividend_source: Option<Arc<dyn DividendSource>>,
        earnings_source: Option<Arc<dyn EarningsSource>>,
        risk_cfg: RiskConfig,
        strategy_cfg: StrategyConfig,
    ) -> Self {
        Self {
            store,
            dividend_source,
            earnings_source,
            risk_cfg,
            strategy_cfg,
        }
    }

    /// Runs all nine gates in order. On failure, persists a `ShadowTrade`
    /// and returns the failing gate's error; `Ok(())` means the candidate
    /// is clear for the Order Manager.
    pub async fn evaluate(&self, ctx: GateContext<'_>) -> Result<(), RiskGateError> {
        match self.run_gates(&ctx).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.record_shadow_trade(&ctx, &e).await;
                Err(e)
            }
        }
    }

    async fn run_gates(&self, ctx: &GateContext<'_>) -> Result<(), RiskGateError> {
        // Gate 1: circuit breaker.
        let active = self
            .store
            .active_circuit_breaker_event()
            .await
            .map_err(|e| RiskGateError::CircuitBreakerActive {
                reason: format!("store read failed: {e}"),
                triggered_ts: ctx.now,
            })?;
        circuit_breaker::check(active.as_ref())?;

        // Gate 2: VIX.
        vix_gate::check(ctx.strategy, ctx.vix, self.risk_cfg.vix_panic_threshold, ctx.term_structure)?;

        // Gate 3: earnings blackout.
        let next_earnings = match &self.earnings_source {
            Some(src) => src.next_earnings(&ctx.symbol).await.unwrap_or_else(|e| {
                warn!(symbol = %ctx.symbol, error = %e, "earnings source unavailable, proceeding without it");
                None
            }),
            None => None,
        };
        earnings_blackout::check(
            next_earnings,
            ctx.now,
            self.risk_cfg.earnings_blackout_hours,
            ctx.short_strike,
            ctx.price,
            ctx.expected_move,
        )?;

        // Gate 4: dividend blackout.
        let ex_dividend = match &self.dividend_source {
            Some(src) => src.next_ex_dividend_date(&ctx.symbol).await.unwrap_or_else(|e| {
                warn!(symbol = %ctx.symbol, error = %e, "dividend source unavailable, proceeding without it");
                None
            }),
            None => None,
        };
        dividend_blackout::check(ctx.has_short_call, ex_dividend, ctx.today, self.risk_cfg.dividend_blackout_days)?;

        // Gate 5: liquidity.
        liquidity::check(ctx.short_quote, self.risk_cfg.max_bid_ask_spread, self.risk_cfg.min_volume_oi_ratio_pct)?;

        // Gates 6/7: Greeks validation.
        if ctx.strategy.is_credit() {
            greeks_validation::check_credit(ctx.short_quote, &self.risk_cfg)?;
        } else {
            greeks_validation::check_debit(ctx.short_quote, &self.risk_cfg)?;
        }

        // Gate 8: portfolio beta-weighted delta.
        portfolio_exposure::check(ctx.current_bwd, ctx.proposed_bwd_contribution, self.risk_cfg.max_bw_delta)?;

        // Gate 9: AI sanity check. No response at all is never an approval.
        let response = ctx.advisor_response.ok_or_else(|| RiskGateError::SanityCheck {
            reason: "AI advisor unavailable; mandatory gate cannot auto-approve".to_string(),
        })?;
        sanity_check::check(response, ctx.chain, ctx.price, ctx.strategy, &self.risk_cfg, &self.strategy_cfg, ctx.today)?;

        info!(symbol = %ctx.symbol, strategy = %ctx.strategy, "candidate cleared all risk gates");
        Ok(())
    }

    async fn record_shadow_trade(&self, ctx: &GateContext<'_>, err: &RiskGateError) {
        let shadow = ShadowTrade {
            id: Uuid::new_v4(),
            symbol: ctx.symbol.clone(),
            strategy: ctx.strategy,
            rejection_reason: err.to_string(),
            features_json: serde_json::json!({
                "price": ctx.price.to_string(),
                "vix": ctx.vix.to_string(),
                "short_strike": ctx.short_strike.to_string(),
            })
            .to_string(),
            candidate_expiration: ctx.candidate_expiration,
            outcome: ShadowOutcome::Pending,
            created_at: ctx.now,
        };
        if let Err(e) = self.store.log_shadow_trade(&shadow).await {
            warn!(symbol = %ctx.symbol, error = %e, "failed to persist shadow trade");
        }
    }
}
