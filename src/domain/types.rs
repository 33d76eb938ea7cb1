//! Core data model: positions, legs, trades and the transient value types that
//! flow between the screener, strategy builder and risk gates.
//!
//! All monetary values are USD `Decimal`. Strikes and prices are per-share
//! contract-quote units; the contract multiplier is 100 unless noted on the
//! field. Timestamps are stored in UTC; callers convert to US/Eastern only at
//! the display or market-calendar boundary.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionRight {
    Call,
    Put,
}

impl fmt::Display for OptionRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionRight::Call => write!(f, "C"),
            OptionRight::Put => write!(f, "P"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
        }
    }
}

impl Action {
    /// The reversing action used to close or roll a leg.
    pub fn reverse(self) -> Action {
        match self {
            Action::Buy => Action::Sell,
            Action::Sell => Action::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    IronCondor,
    IronButterfly,
    VerticalCreditCall,
    VerticalCreditPut,
    VerticalDebitCall,
    VerticalDebitPut,
    Calendar,
    Pmcc,
    JadeLizard,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyKind::IronCondor => "IRON_CONDOR",
            StrategyKind::IronButterfly => "IRON_BUTTERFLY",
            StrategyKind::VerticalCreditCall => "VERTICAL_CREDIT_CALL",
            StrategyKind::VerticalCreditPut => "VERTICAL_CREDIT_PUT",
            StrategyKind::VerticalDebitCall => "VERTICAL_DEBIT_CALL",
            StrategyKind::VerticalDebitPut => "VERTICAL_DEBIT_PUT",
            StrategyKind::Calendar => "CALENDAR",
            StrategyKind::Pmcc => "PMCC",
            StrategyKind::JadeLizard => "JADE_LIZARD",
        };
        write!(f, "{s}")
    }
}

impl StrategyKind {
    /// Credit strategies record `entry_credit >= 0`; debit strategies record
    /// a negative `entry_credit` (i.e. the debit paid).
    pub fn is_credit(self) -> bool {
        matches!(
            self,
            StrategyKind::IronCondor
                | StrategyKind::IronButterfly
                | StrategyKind::VerticalCreditCall
                | StrategyKind::VerticalCreditPut
                | StrategyKind::JadeLizard
        )
    }

    /// True for strategies that are net short vega (premium sellers).
    pub fn is_short_vega(self) -> bool {
        self.is_credit()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
    ClosedExternally,
    Rolled,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::Closed => "CLOSED",
            PositionStatus::ClosedExternally => "CLOSED_EXTERNALLY",
            PositionStatus::Rolled => "ROLLED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TrailingProfit,
    ProfitTarget,
    TrailingStop,
    StopLoss,
    TimeExit,
    AiOverrideExit,
    Reconciliation,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::TrailingProfit => "TRAILING_PROFIT",
            ExitReason::ProfitTarget => "PROFIT_TARGET",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TimeExit => "TIME_EXIT",
            ExitReason::AiOverrideExit => "AI_OVERRIDE_EXIT",
            ExitReason::Reconciliation => "Reconciliation",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitBreakerReason {
    DailyMaxLoss,
    ConsecutiveLosses,
    Manual,
}

impl fmt::Display for CircuitBreakerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitBreakerReason::DailyMaxLoss => "DAILY_MAX_LOSS",
            CircuitBreakerReason::ConsecutiveLosses => "CONSECUTIVE_LOSSES",
            CircuitBreakerReason::Manual => "MANUAL",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowOutcome {
    Pending,
    GoodReject,
    MissedOpportunity,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    BullTrending,
    BearTrending,
    HighVolNeutral,
    LowVolNeutral,
    ExtremeStress,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Regime::BullTrending => "BULL_TRENDING",
            Regime::BearTrending => "BEAR_TRENDING",
            Regime::HighVolNeutral => "HIGH_VOL_NEUTRAL",
            Regime::LowVolNeutral => "LOW_VOL_NEUTRAL",
            Regime::ExtremeStress => "EXTREME_STRESS",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierMode {
    Ml,
    RuleBased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermStructure {
    Contango,
    Backwardation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    RealTime,
    Frozen,
    Delayed,
    DelayedFrozen,
}

impl DataType {
    pub fn is_delayed(self) -> bool {
        matches!(self, DataType::Delayed | DataType::DelayedFrozen)
    }
}

/// Advisor verdicts as returned from AI advisor JSON, after the
/// mixed-language enum (`SCHVÁLENO`/`APPROVE`, `ZAMÍTNUTO`/`REJECT`, etc.) is
/// normalized to its canonical English form at the parsing edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvisorVerdict {
    Approve,
    Reject,
    Adjust,
}

/// One leg of a multi-leg options position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leg {
    pub position_id: Uuid,
    pub contract_symbol: String,
    pub action: Action,
    pub strike: Decimal,
    pub option_type: OptionRight,
    pub quantity: u32,
    pub entry_price: Decimal,
    pub con_id: i64,
}

/// A live or historical multi-leg options position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub strategy: StrategyKind,
    pub entry_ts: DateTime<Utc>,
    pub expiration: NaiveDate,
    pub contracts: u32,
    /// >= 0 for credit strategies; negative (recorded as a debit) otherwise.
    pub entry_credit: Decimal,
    pub max_risk: Decimal,
    pub status: PositionStatus,
    pub exit_ts: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
    pub realized_pnl: Option<Decimal>,
    pub vix_entry: Decimal,
    pub regime_entry: Regime,
    pub legs: Vec<Leg>,
    pub trailing_stop: Decimal,
    pub trailing_profit: Decimal,
    pub highest_profit_seen: Decimal,
    pub stop_multiplier: Decimal,
    pub profit_target_pct: Decimal,
    pub ml_confidence: Option<f64>,
    pub ml_last_update: Option<DateTime<Utc>>,
}

impl Position {
    /// Position delta: sum of leg deltas signed by `action` (short legs
    /// contribute negatively). Callers supply per-leg deltas keyed by
    /// `con_id` from the latest `OptionQuote` snapshot.
    pub fn signed_delta(&self, leg_deltas: &std::collections::HashMap<i64, f64>) -> f64 {
        self.legs
            .iter()
            .map(|leg| {
                let d = leg_deltas.get(&leg.con_id).copied().unwrap_or(0.0);
                match leg.action {
                    Action::Buy => d * leg.quantity as f64,
                    Action::Sell => -d * leg.quantity as f64,
                }
            })
            .sum()
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

/// Audit record for one submitted combo (open, close or roll).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub position_id: Option<Uuid>,
    pub symbol: String,
    pub kind: TradeKind,
    pub status: TradeStatus,
    pub requested_quantity: u32,
    pub filled_quantity: u32,
    pub fill_price: Option<Decimal>,
    pub vix_at_entry: Decimal,
    pub regime_at_entry: Regime,
    pub submitted_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeKind {
    Open,
    Close,
    Roll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Inactive,
}

/// A rejected candidate, retained to later label whether the rejection was
/// correct (`GOOD_REJECT`) or cost an opportunity (`MISSED_OPPORTUNITY`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowTrade {
    pub id: Uuid,
    pub symbol: String,
    pub strategy: StrategyKind,
    pub rejection_reason: String,
    pub features_json: String,
    pub candidate_expiration: NaiveDate,
    pub outcome: ShadowOutcome,
    pub created_at: DateTime<Utc>,
}

/// One advisor call record, written whenever an advisor influenced a
/// decision (approval, rejection, or a sizing/strike adjustment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiDecision {
    pub id: Uuid,
    pub model_id: String,
    pub decision_type: String,
    pub recommendation: String,
    pub confidence: f64,
    pub vix: Decimal,
    pub regime: Regime,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerEvent {
    pub id: i64,
    pub triggered_ts: DateTime<Utc>,
    pub reason: CircuitBreakerReason,
    pub threshold_value: f64,
    pub reset_ts: Option<DateTime<Utc>>,
    pub reset_by: Option<String>,
    pub halt_duration_hours: Option<i64>,
    pub notes: Option<String>,
}

impl CircuitBreakerEvent {
    pub fn is_active(&self) -> bool {
        self.reset_ts.is_none()
    }
}

/// One row per trailing-level change on an open position, for auditability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitAdjustment {
    pub id: i64,
    pub position_id: Uuid,
    pub ts: DateTime<Utc>,
    pub old_stop: Decimal,
    pub new_stop: Decimal,
    pub old_profit_target: Decimal,
    pub new_profit_target: Decimal,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ts: DateTime<Utc>,
    pub vix: Decimal,
    pub vix3m: Option<Decimal>,
    pub ratio: Option<Decimal>,
    pub term_structure: TermStructure,
    pub regime: Regime,
}

/// Transient screener output; never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub price: Decimal,
    pub iv_rank: f64,
    pub volume: u64,
    pub sector: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionQuote {
    pub con_id: i64,
    pub symbol: String,
    pub strike: Decimal,
    pub right: OptionRight,
    pub expiration: NaiveDate,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: u64,
    pub open_interest: u64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub implied_vol: f64,
    pub vanna: Option<f64>,
    pub data_type: DataType,
}

impl OptionQuote {
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountSummary {
    pub net_liquidation: Decimal,
    pub available_funds: Decimal,
    pub buying_power: Decimal,
    pub total_cash: Decimal,
    pub gross_position_value: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_reverse_is_involution() {
        assert_eq!(Action::Buy.reverse(), Action::Sell);
        assert_eq!(Action::Sell.reverse(), Action::Buy);
        assert_eq!(Action::Buy.reverse().reverse(), Action::Buy);
    }

    #[test]
    fn credit_strategies_match_spec_enumeration() {
        assert!(StrategyKind::IronCondor.is_credit());
        assert!(StrategyKind::IronButterfly.is_credit());
        assert!(StrategyKind::VerticalCreditCall.is_credit());
        assert!(StrategyKind::VerticalCreditPut.is_credit());
        assert!(!StrategyKind::VerticalDebitCall.is_credit());
        assert!(!StrategyKind::Calendar.is_credit());
    }

    #[test]
    fn data_type_delayed_flags() {
        assert!(DataType::Delayed.is_delayed());
        assert!(DataType::DelayedFrozen.is_delayed());
        assert!(!DataType::RealTime.is_delayed());
        assert!(!DataType::Frozen.is_delayed());
    }

    #[test]
    fn circuit_breaker_event_active_iff_unreset() {
        let ev = CircuitBreakerEvent {
            id: 1,
            triggered_ts: Utc::now(),
            reason: CircuitBreakerReason::ConsecutiveLosses,
            threshold_value: 3.0,
            reset_ts: None,
            reset_by: None,
            halt_duration_hours: Some(24),
            notes: None,
        };
        assert!(ev.is_active());
    }
}
