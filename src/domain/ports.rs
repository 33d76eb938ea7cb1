//! Port traits: the seams `application` depends on and `infrastructure`
//! implements. Kept narrow and capability-shaped per component so a caller
//! (e.g. the Exit Manager) only depends on the slice of the broker it
//! actually uses.

use crate::domain::errors::{BrokerError, ExternalClientError, StoreError};
use crate::domain::types::{
    AccountSummary, AiDecision, CircuitBreakerEvent, ExitAdjustment, OptionQuote, Position,
    ShadowOutcome, ShadowTrade, Trade,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// §4.1 Clock & Market Calendar.
pub trait Clock: Send + Sync {
    /// Current instant, corrected by the last successful drift measurement.
    fn now(&self) -> DateTime<Utc>;
    /// Current wall time in US/Eastern.
    fn now_eastern(&self) -> chrono::DateTime<chrono_tz::Tz>;
    fn is_market_open(&self) -> bool;
    /// Today's open/close boundary, in US/Eastern.
    fn market_open(&self) -> chrono::DateTime<chrono_tz::Tz>;
    fn market_close(&self) -> chrono::DateTime<chrono_tz::Tz>;
}

/// A leg specification for a combo/BAG order.
#[derive(Debug, Clone, Copy)]
pub struct ComboLeg {
    pub con_id: i64,
    pub action: crate::domain::types::Action,
    pub ratio: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum OrderPrice {
    Limit(Decimal),
    Market,
}

#[derive(Debug, Clone, Copy)]
pub struct ComboOrder {
    pub action: crate::domain::types::Action,
    pub quantity: u32,
    pub price: OrderPrice,
    pub time_in_force: TimeInForce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    Day,
    Gtc,
}

#[derive(Debug, Clone)]
pub struct TradeHandle {
    pub order_id: String,
    pub status: crate::domain::types::TradeStatus,
}

#[derive(Debug, Clone)]
pub struct PortfolioPosition {
    pub symbol: String,
    pub con_id: i64,
    pub strike: Decimal,
    pub right: crate::domain::types::OptionRight,
    pub expiration: chrono::NaiveDate,
    pub quantity: i32,
    pub market_value: Decimal,
    pub average_cost: Decimal,
}

#[derive(Debug, Clone)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// §4.4 Broker Adapter.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn connect(&self) -> Result<(), BrokerError>;
    async fn disconnect(&self) -> Result<(), BrokerError>;
    async fn ensure_connected(&self) -> Result<(), BrokerError>;

    async fn account_summary(&self) -> Result<AccountSummary, BrokerError>;

    async fn qualify(&self, symbol: &str) -> Result<i64, BrokerError>;

    async fn snapshot_option(
        &self,
        con_id: i64,
        allow_delayed_data: bool,
    ) -> Result<OptionQuote, BrokerError>;

    async fn place_combo(
        &self,
        legs: &[ComboLeg],
        order: ComboOrder,
    ) -> Result<TradeHandle, BrokerError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;

    async fn open_orders(&self) -> Result<Vec<TradeHandle>, BrokerError>;

    async fn portfolio(&self) -> Result<Vec<PortfolioPosition>, BrokerError>;

    async fn historical_bars(
        &self,
        symbol: &str,
        duration_days: u32,
        bar_size: &str,
    ) -> Result<Vec<Candle>, BrokerError>;

    async fn fundamental_xml(&self, symbol: &str, report: &str) -> Result<String, BrokerError>;

    async fn risk_free_rate(&self) -> Result<Decimal, BrokerError>;

    async fn scan(&self, code: &str, min_price: Decimal, max_price: Decimal)
        -> Result<Vec<String>, BrokerError>;
}

/// §4.5 rate-limited external clients (AI advisors, news, prediction
/// markets, dividend source) share this capability shape.
#[async_trait]
pub trait RateLimitedClient: Send + Sync {
    fn name(&self) -> &str;
    /// True unless today's USD budget is exhausted (silent mode).
    fn can_request(&self) -> bool;
    async fn record_usage(&self, cost_usd: Decimal);
}

#[derive(Debug, Clone)]
pub struct AdvisorRequest {
    pub prompt: String,
}

#[derive(Debug, Clone)]
pub struct AdvisorResponse {
    pub verdict: crate::domain::types::AdvisorVerdict,
    pub confidence_score: u8,
    pub strategy: Option<String>,
    pub short_strike: Option<Decimal>,
    pub long_strike: Option<Decimal>,
    pub expiration: Option<chrono::NaiveDate>,
    pub limit_price: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub reasoning: String,
}

#[async_trait]
pub trait AiAdvisor: RateLimitedClient {
    async fn evaluate(&self, request: AdvisorRequest) -> Result<AdvisorResponse, ExternalClientError>;
}

#[async_trait]
pub trait DividendSource: RateLimitedClient {
    async fn next_ex_dividend_date(&self, symbol: &str) -> Result<Option<chrono::NaiveDate>, ExternalClientError>;
}

#[async_trait]
pub trait EarningsSource: RateLimitedClient {
    async fn next_earnings(&self, symbol: &str) -> Result<Option<DateTime<Utc>>, ExternalClientError>;
}

/// §4.17 Notifier façade. Delivery is best-effort; implementations must
/// never propagate a transport failure back into the trading pipeline.
#[derive(Debug, Clone)]
pub enum NotifierEvent {
    TradeOpened { symbol: String, strategy: String, credit: Decimal },
    TradeClosed { symbol: String, reason: String, pnl: Decimal },
    VixPanic { vix: Decimal },
    Backwardation { ratio: Decimal },
    PipelineError { detail: String },
    ReconciliationDiff { closed_externally: usize, new_in_broker: usize },
    WatchdogRestart { reason: String },
    DailySummary { realized_pnl: Decimal, open_positions: usize },
    Startup,
    Shutdown,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: NotifierEvent);
}

/// §4.3 Store. Append operations are one row per call; update-by-id
/// operations mutate a single existing row addressed by its primary key.
#[async_trait]
pub trait Store: Send + Sync {
    async fn log_trade(&self, trade: &Trade) -> Result<(), StoreError>;
    async fn close_trade(
        &self,
        trade_id: Uuid,
        status: crate::domain::types::TradeStatus,
        fill_price: Option<Decimal>,
        filled_quantity: u32,
    ) -> Result<(), StoreError>;

    async fn save_position(&self, position: &Position) -> Result<(), StoreError>;
    async fn mark_position_closed(
        &self,
        position_id: Uuid,
        status: crate::domain::types::PositionStatus,
        exit_price: Option<Decimal>,
        exit_reason: Option<crate::domain::types::ExitReason>,
        realized_pnl: Option<Decimal>,
    ) -> Result<(), StoreError>;
    async fn update_position_trailing(
        &self,
        position_id: Uuid,
        trailing_stop: Decimal,
        trailing_profit: Decimal,
        highest_profit_seen: Decimal,
    ) -> Result<(), StoreError>;
    async fn open_positions(&self) -> Result<Vec<Position>, StoreError>;
    async fn position_by_id(&self, id: Uuid) -> Result<Option<Position>, StoreError>;

    async fn log_ai_decision(&self, decision: &AiDecision) -> Result<(), StoreError>;

    async fn log_shadow_trade(&self, shadow: &ShadowTrade) -> Result<(), StoreError>;
    async fn update_shadow_outcome(&self, id: Uuid, outcome: ShadowOutcome) -> Result<(), StoreError>;
    async fn pending_shadow_trades(&self) -> Result<Vec<ShadowTrade>, StoreError>;

    async fn log_circuit_breaker_event(&self, event: &CircuitBreakerEvent) -> Result<i64, StoreError>;
    async fn reset_circuit_breaker(&self, id: i64, reset_by: &str, notes: &str) -> Result<(), StoreError>;
    async fn active_circuit_breaker_event(&self) -> Result<Option<CircuitBreakerEvent>, StoreError>;

    async fn log_exit_adjustment(&self, adjustment: &ExitAdjustment) -> Result<(), StoreError>;

    async fn trade_history(&self, limit: usize) -> Result<Vec<Trade>, StoreError>;
    async fn losing_trades(&self, days: i64, limit: usize) -> Result<Vec<Trade>, StoreError>;

    /// Realized P/L of the most recently closed positions, newest-first —
    /// feeds the consecutive-loss circuit breaker guard.
    async fn recent_realized_pnls(&self, limit: usize) -> Result<Vec<Decimal>, StoreError>;
    /// Sum of realized P/L for positions closed at or after `since` — feeds
    /// the daily-max-loss circuit breaker guard.
    async fn daily_realized_pnl(&self, since: DateTime<Utc>) -> Result<Decimal, StoreError>;

    async fn log_new_in_broker_diff(&self, symbol: &str, con_id: i64, detected_at: DateTime<Utc>) -> Result<(), StoreError>;
}
