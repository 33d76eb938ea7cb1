use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the broker adapter (§4.4 of the broker contract).
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unreachable after {attempts} attempts: {reason}")]
    Unreachable { attempts: u32, reason: String },

    #[error("quote for {symbol} is delayed (data_type={data_type:?}) and allow_delayed_data is false")]
    DelayedData {
        symbol: String,
        data_type: crate::domain::types::DataType,
    },

    #[error("broker pacing violation on {operation}, retried {attempts} times")]
    Pacing { operation: String, attempts: u32 },

    #[error("order {order_id} rejected: {reason}")]
    OrderRejected { order_id: String, reason: String },

    #[error("partial fill on BAG order {order_id}: broker returned an inconsistent fill state")]
    PartialFill { order_id: String },

    #[error("contract qualification failed for {symbol}: {reason}")]
    QualificationFailed { symbol: String, reason: String },

    #[error("wire protocol error: {0}")]
    Protocol(String),

    #[error("connection closed")]
    ConnectionClosed,
}

/// Errors raised while validating a candidate through the risk-gate chain
/// (§4.10). Each variant corresponds to one gate; the `reason` text is both
/// logged and persisted onto the resulting `ShadowTrade`.
#[derive(Debug, Error)]
pub enum RiskGateError {
    #[error("circuit breaker active: {reason} (triggered {triggered_ts})")]
    CircuitBreakerActive {
        reason: String,
        triggered_ts: chrono::DateTime<chrono::Utc>,
    },

    #[error("VIX gate: {reason}")]
    VixGate { reason: String },

    #[error("earnings blackout: announcement within {hours_until}h (limit {blackout_hours}h)")]
    EarningsBlackout { hours_until: i64, blackout_hours: i64 },

    #[error("dividend blackout: ex-dividend date {ex_date} within {blackout_days} days")]
    DividendBlackout {
        ex_date: chrono::NaiveDate,
        blackout_days: i64,
    },

    #[error("liquidity gate failed for {symbol}: {reason}")]
    Liquidity { symbol: String, reason: String },

    #[error("greeks validation failed: {reason}")]
    GreeksValidation { reason: String },

    #[error(
        "portfolio beta-weighted delta would reach {projected_bwd:.2}, limit {max_bwd:.2}"
    )]
    PortfolioExposure { projected_bwd: f64, max_bwd: f64 },

    #[error("AI sanity check failed: {reason}")]
    SanityCheck { reason: String },
}

/// Errors from the rate-limited external client layer (AI advisors, news,
/// prediction markets, dividend source).
#[derive(Debug, Error)]
pub enum ExternalClientError {
    #[error("{client} is in silent mode: daily budget ${daily_limit_usd} exhausted")]
    SilentMode {
        client: String,
        daily_limit_usd: Decimal,
    },

    #[error("{client} request failed: {reason}")]
    RequestFailed { client: String, reason: String },

    #[error("{client} response did not parse: {reason}")]
    UnparsableResponse { client: String, reason: String },
}

/// Configuration validation failures (§4.2), always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("{var}={value} is not a valid {expected}")]
    Malformed {
        var: String,
        value: String,
        expected: String,
    },
}

/// Store (persistence) errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("position {0} not found")]
    PositionNotFound(Uuid),

    #[error("trade {0} not found")]
    TradeNotFound(Uuid),

    #[error("circuit breaker event {0} not found")]
    CircuitBreakerEventNotFound(i64),
}

/// Top-level pipeline/reconciliation errors that are reported but never stop
/// the service.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("reconciliation mismatch: {0}")]
    ReconciliationMismatch(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    RiskGate(#[from] RiskGateError),

    #[error(transparent)]
    ExternalClient(#[from] ExternalClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_gate_error_messages_carry_reason() {
        let err = RiskGateError::Liquidity {
            symbol: "SPY".into(),
            reason: "bid/ask spread 0.80 exceeds max_bid_ask_spread 0.50".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("SPY"));
        assert!(msg.contains("0.80"));
    }

    #[test]
    fn broker_error_delayed_data_formats_symbol_and_type() {
        let err = BrokerError::DelayedData {
            symbol: "AAPL".into(),
            data_type: crate::domain::types::DataType::Delayed,
        };
        assert!(err.to_string().contains("AAPL"));
    }

    #[test]
    fn pipeline_error_wraps_broker_error() {
        let broker = BrokerError::ConnectionClosed;
        let pipeline: PipelineError = broker.into();
        assert!(matches!(pipeline, PipelineError::Broker(_)));
    }
}
