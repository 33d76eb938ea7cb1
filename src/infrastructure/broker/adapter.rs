//! §4.4 Broker Adapter: a TCP session to a TWS/Gateway-style broker,
//! framed with [`super::wire`] and paced with [`super::pacing::Pacer`].
//! The wire vocabulary is our own (first field names the operation) rather
//! than a replica of the real TWS numbered message catalogue — see
//! `wire.rs`'s doc comment.

use super::pacing::Pacer;
use super::wire::{encode_frame, FrameReader};
use crate::domain::config::BrokerConfig;
use crate::domain::errors::BrokerError;
use crate::domain::ports::{
    BrokerAdapter, Candle, ComboLeg, ComboOrder, OrderPrice, PortfolioPosition, TimeInForce,
    TradeHandle,
};
use crate::domain::types::{AccountSummary, DataType, OptionQuote, OptionRight, TradeStatus};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const FUNDAMENTAL_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct IbkrBrokerAdapter {
    config: BrokerConfig,
    stream: Mutex<Option<TcpStream>>,
    pacer: Pacer,
}

impl IbkrBrokerAdapter {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            pacer: Pacer::standard(),
        }
    }

    async fn request(&self, fields: &[&str], timeout: Duration) -> Result<Vec<String>, BrokerError> {
        let operation = fields.first().copied().unwrap_or("UNKNOWN").to_string();
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(BrokerError::ConnectionClosed)?;

        let frame = encode_frame(fields);
        stream.write_all(&frame).await.map_err(|e| BrokerError::Protocol(e.to_string()))?;

        let mut reader = FrameReader::new();
        let mut chunk = [0u8; 4096];
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(response) = reader.next_frame() {
                return Self::interpret(&operation, response);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(BrokerError::Protocol(format!("{operation} timed out after {timeout:?}")));
            }
            match tokio::time::timeout(remaining, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => return Err(BrokerError::ConnectionClosed),
                Ok(Ok(n)) => reader.feed(&chunk[..n]),
                Ok(Err(e)) => return Err(BrokerError::Protocol(e.to_string())),
                Err(_) => return Err(BrokerError::Protocol(format!("{operation} timed out after {timeout:?}"))),
            }
        }
    }

    fn interpret(operation: &str, mut fields: Vec<String>) -> Result<Vec<String>, BrokerError> {
        if fields.is_empty() {
            return Err(BrokerError::Protocol(format!("{operation}: empty response")));
        }
        let status = fields.remove(0);
        match status.as_str() {
            "OK" => Ok(fields),
            "PACING" => Err(BrokerError::Pacing { operation: operation.to_string(), attempts: 0 }),
            "ERR" => Err(BrokerError::Protocol(fields.join(" "))),
            other => Err(BrokerError::Protocol(format!("{operation}: unrecognized status {other}"))),
        }
    }

    fn field<'a>(fields: &'a [String], idx: usize, what: &str) -> Result<&'a str, BrokerError> {
        fields.get(idx).map(String::as_str).ok_or_else(|| BrokerError::Protocol(format!("missing field {idx} ({what})")))
    }

    fn parse_decimal(fields: &[String], idx: usize, what: &str) -> Result<Decimal, BrokerError> {
        let raw = Self::field(fields, idx, what)?;
        Decimal::from_str(raw).map_err(|_| BrokerError::Protocol(format!("invalid decimal for {what}: {raw}")))
    }

    fn parse_data_type(raw: &str) -> Result<DataType, BrokerError> {
        match raw {
            "REAL_TIME" => Ok(DataType::RealTime),
            "FROZEN" => Ok(DataType::Frozen),
            "DELAYED" => Ok(DataType::Delayed),
            "DELAYED_FROZEN" => Ok(DataType::DelayedFrozen),
            other => Err(BrokerError::Protocol(format!("unrecognized data_type: {other}"))),
        }
    }
}

#[async_trait]
impl BrokerAdapter for IbkrBrokerAdapter {
    async fn connect(&self) -> Result<(), BrokerError> {
        let mut last_reason = String::new();
        for attempt in 1..=self.config.max_connect_attempts {
            let addr = format!("{}:{}", self.config.host, self.config.port);
            match tokio::time::timeout(
                Duration::from_secs(self.config.connect_timeout_secs),
                TcpStream::connect(&addr),
            )
            .await
            {
                Ok(Ok(stream)) => {
                    *self.stream.lock().await = Some(stream);
                    info!(host = %self.config.host, port = self.config.port, "connected to broker");
                    let market_data_type = self.config.market_data_type.to_string();
                    self.request(&["REQ_MARKET_DATA_TYPE", &market_data_type], REQUEST_TIMEOUT).await?;
                    return Ok(());
                }
                Ok(Err(e)) => last_reason = e.to_string(),
                Err(_) => last_reason = "connect timed out".to_string(),
            }
            warn!(attempt, max = self.config.max_connect_attempts, reason = %last_reason, "broker connect attempt failed");
            if attempt < self.config.max_connect_attempts {
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt - 1))).await;
            }
        }
        Err(BrokerError::Unreachable { attempts: self.config.max_connect_attempts, reason: last_reason })
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        *self.stream.lock().await = None;
        Ok(())
    }

    async fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.stream.lock().await.is_some() {
            return Ok(());
        }
        self.connect().await
    }

    async fn account_summary(&self) -> Result<AccountSummary, BrokerError> {
        let fields = self.pacer.with_retry("ACCOUNT_SUMMARY", || self.request(&["ACCOUNT_SUMMARY"], REQUEST_TIMEOUT)).await?;
        Ok(AccountSummary {
            net_liquidation: Self::parse_decimal(&fields, 0, "net_liquidation")?,
            available_funds: Self::parse_decimal(&fields, 1, "available_funds")?,
            buying_power: Self::parse_decimal(&fields, 2, "buying_power")?,
            total_cash: Self::parse_decimal(&fields, 3, "total_cash")?,
            gross_position_value: Self::parse_decimal(&fields, 4, "gross_position_value")?,
        })
    }

    async fn qualify(&self, symbol: &str) -> Result<i64, BrokerError> {
        let fields = self.pacer.with_retry("QUALIFY", || self.request(&["QUALIFY", symbol], REQUEST_TIMEOUT)).await?;
        let raw = Self::field(&fields, 0, "con_id")?;
        raw.parse::<i64>().map_err(|_| BrokerError::QualificationFailed { symbol: symbol.to_string(), reason: format!("non-numeric conId: {raw}") })
    }

    async fn snapshot_option(&self, con_id: i64, allow_delayed_data: bool) -> Result<OptionQuote, BrokerError> {
        let con_id_s = con_id.to_string();
        let allow_s = allow_delayed_data.to_string();
        let fields = self
            .pacer
            .with_retry("SNAPSHOT", || self.request(&["SNAPSHOT", &con_id_s, &allow_s], REQUEST_TIMEOUT))
            .await?;

        let symbol = Self::field(&fields, 0, "symbol")?.to_string();
        let strike = Self::parse_decimal(&fields, 1, "strike")?;
        let right = match Self::field(&fields, 2, "right")? {
            "C" => OptionRight::Call,
            "P" => OptionRight::Put,
            other => return Err(BrokerError::Protocol(format!("unrecognized right: {other}"))),
        };
        let expiration = NaiveDate::parse_from_str(Self::field(&fields, 3, "expiration")?, "%Y-%m-%d")
            .map_err(|e| BrokerError::Protocol(format!("invalid expiration: {e}")))?;
        let bid = Self::parse_decimal(&fields, 4, "bid")?;
        let ask = Self::parse_decimal(&fields, 5, "ask")?;
        let last = Self::parse_decimal(&fields, 6, "last")?;
        let volume: u64 = Self::field(&fields, 7, "volume")?.parse().map_err(|_| BrokerError::Protocol("invalid volume".into()))?;
        let open_interest: u64 = Self::field(&fields, 8, "open_interest")?.parse().map_err(|_| BrokerError::Protocol("invalid open_interest".into()))?;
        let delta: f64 = Self::field(&fields, 9, "delta")?.parse().map_err(|_| BrokerError::Protocol("invalid delta".into()))?;
        let gamma: f64 = Self::field(&fields, 10, "gamma")?.parse().map_err(|_| BrokerError::Protocol("invalid gamma".into()))?;
        let theta: f64 = Self::field(&fields, 11, "theta")?.parse().map_err(|_| BrokerError::Protocol("invalid theta".into()))?;
        let vega: f64 = Self::field(&fields, 12, "vega")?.parse().map_err(|_| BrokerError::Protocol("invalid vega".into()))?;
        let implied_vol: f64 = Self::field(&fields, 13, "implied_vol")?.parse().map_err(|_| BrokerError::Protocol("invalid implied_vol".into()))?;
        let data_type = Self::parse_data_type(Self::field(&fields, 14, "data_type")?)?;

        if data_type.is_delayed() && !allow_delayed_data {
            return Err(BrokerError::DelayedData { symbol, data_type });
        }

        Ok(OptionQuote {
            con_id,
            symbol,
            strike,
            right,
            expiration,
            bid,
            ask,
            last,
            volume,
            open_interest,
            delta,
            gamma,
            theta,
            vega,
            implied_vol,
            vanna: None,
            data_type,
        })
    }

    async fn place_combo(&self, legs: &[ComboLeg], order: ComboOrder) -> Result<TradeHandle, BrokerError> {
        let legs_field = legs
            .iter()
            .map(|leg| format!("{}:{}:{}", leg.con_id, leg.action, leg.ratio))
            .collect::<Vec<_>>()
            .join(",");
        let action = order.action.to_string();
        let quantity = order.quantity.to_string();
        let price_field = match order.price {
            OrderPrice::Limit(price) => format!("LIMIT:{price}"),
            OrderPrice::Market => "MARKET".to_string(),
        };
        let tif = match order.time_in_force {
            TimeInForce::Day => "DAY",
            TimeInForce::Gtc => "GTC",
        };

        let fields = self
            .pacer
            .with_retry("PLACE_COMBO", || {
                self.request(&["PLACE_COMBO", &legs_field, &action, &quantity, &price_field, tif], REQUEST_TIMEOUT)
            })
            .await?;

        let order_id = Self::field(&fields, 0, "order_id")?.to_string();
        let status = match Self::field(&fields, 1, "status")? {
            "SUBMITTED" => TradeStatus::Submitted,
            "FILLED" => TradeStatus::Filled,
            "PARTIALLY_FILLED" => return Err(BrokerError::PartialFill { order_id }),
            "CANCELLED" => TradeStatus::Cancelled,
            other => return Err(BrokerError::Protocol(format!("unrecognized order status: {other}"))),
        };
        Ok(TradeHandle { order_id, status })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        self.pacer.with_retry("CANCEL_ORDER", || self.request(&["CANCEL_ORDER", order_id], REQUEST_TIMEOUT)).await?;
        Ok(())
    }

    async fn open_orders(&self) -> Result<Vec<TradeHandle>, BrokerError> {
        let fields = self.pacer.with_retry("OPEN_ORDERS", || self.request(&["OPEN_ORDERS"], REQUEST_TIMEOUT)).await?;
        fields
            .chunks(2)
            .map(|chunk| {
                let order_id = chunk.first().cloned().unwrap_or_default();
                let status = match chunk.get(1).map(String::as_str) {
                    Some("SUBMITTED") => TradeStatus::Submitted,
                    Some("PARTIALLY_FILLED") => TradeStatus::PartiallyFilled,
                    Some("FILLED") => TradeStatus::Filled,
                    Some("CANCELLED") => TradeStatus::Cancelled,
                    _ => TradeStatus::Inactive,
                };
                Ok(TradeHandle { order_id, status })
            })
            .collect()
    }

    async fn portfolio(&self) -> Result<Vec<PortfolioPosition>, BrokerError> {
        let fields = self.pacer.with_retry("PORTFOLIO", || self.request(&["PORTFOLIO"], REQUEST_TIMEOUT)).await?;
        fields
            .chunks(8)
            .map(|chunk| {
                if chunk.len() < 8 {
                    return Err(BrokerError::Protocol("truncated portfolio row".into()));
                }
                Ok(PortfolioPosition {
                    symbol: chunk[0].clone(),
                    con_id: chunk[1].parse().map_err(|_| BrokerError::Protocol("invalid con_id".into()))?,
                    strike: Decimal::from_str(&chunk[2]).map_err(|_| BrokerError::Protocol("invalid strike".into()))?,
                    right: if chunk[3] == "C" { OptionRight::Call } else { OptionRight::Put },
                    expiration: NaiveDate::parse_from_str(&chunk[4], "%Y-%m-%d").map_err(|_| BrokerError::Protocol("invalid expiration".into()))?,
                    quantity: chunk[5].parse().map_err(|_| BrokerError::Protocol("invalid quantity".into()))?,
                    market_value: Decimal::from_str(&chunk[6]).map_err(|_| BrokerError::Protocol("invalid market_value".into()))?,
                    average_cost: Decimal::from_str(&chunk[7]).map_err(|_| BrokerError::Protocol("invalid average_cost".into()))?,
                })
            })
            .collect()
    }

    async fn historical_bars(&self, symbol: &str, duration_days: u32, bar_size: &str) -> Result<Vec<Candle>, BrokerError> {
        let duration_s = duration_days.to_string();
        let fields = self
            .pacer
            .with_retry("HISTORICAL_BARS", || self.request(&["HISTORICAL_BARS", symbol, &duration_s, bar_size], REQUEST_TIMEOUT))
            .await?;
        fields
            .chunks(6)
            .map(|chunk| {
                if chunk.len() < 6 {
                    return Err(BrokerError::Protocol("truncated candle row".into()));
                }
                Ok(Candle {
                    ts: DateTime::<Utc>::from_str(&chunk[0]).map_err(|_| BrokerError::Protocol("invalid candle ts".into()))?,
                    open: Decimal::from_str(&chunk[1]).map_err(|_| BrokerError::Protocol("invalid open".into()))?,
                    high: Decimal::from_str(&chunk[2]).map_err(|_| BrokerError::Protocol("invalid high".into()))?,
                    low: Decimal::from_str(&chunk[3]).map_err(|_| BrokerError::Protocol("invalid low".into()))?,
                    close: Decimal::from_str(&chunk[4]).map_err(|_| BrokerError::Protocol("invalid close".into()))?,
                    volume: chunk[5].parse().map_err(|_| BrokerError::Protocol("invalid volume".into()))?,
                })
            })
            .collect()
    }

    async fn fundamental_xml(&self, symbol: &str, report: &str) -> Result<String, BrokerError> {
        let fields = self
            .pacer
            .with_retry("FUNDAMENTAL_XML", || self.request(&["FUNDAMENTAL_XML", symbol, report], FUNDAMENTAL_REQUEST_TIMEOUT))
            .await?;
        Ok(Self::field(&fields, 0, "xml")?.to_string())
    }

    async fn risk_free_rate(&self) -> Result<Decimal, BrokerError> {
        let fields = self.pacer.with_retry("RISK_FREE_RATE", || self.request(&["RISK_FREE_RATE"], REQUEST_TIMEOUT)).await?;
        Self::parse_decimal(&fields, 0, "risk_free_rate")
    }

    async fn scan(&self, code: &str, min_price: Decimal, max_price: Decimal) -> Result<Vec<String>, BrokerError> {
        let min_s = min_price.to_string();
        let max_s = max_price.to_string();
        let fields = self.pacer.with_retry("SCAN", || self.request(&["SCAN", code, &min_s, &max_s], REQUEST_TIMEOUT)).await?;
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn fake_broker(listener: TcpListener, responses: Vec<(&'static str, Vec<&'static str>)>) {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut reader = FrameReader::new();
        let mut chunk = [0u8; 4096];
        for (_expected_op, response_fields) in responses {
            loop {
                if let Some(_request) = reader.next_frame() {
                    break;
                }
                let n = socket.read(&mut chunk).await.unwrap();
                reader.feed(&chunk[..n]);
            }
            socket.write_all(&encode_frame(&response_fields)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn connect_sends_market_data_type_then_account_summary_parses() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(fake_broker(
            listener,
            vec![
                ("REQ_MARKET_DATA_TYPE", vec!["OK"]),
                ("ACCOUNT_SUMMARY", vec!["OK", "100000", "50000", "200000", "40000", "15000"]),
            ],
        ));

        let config = BrokerConfig::new(addr.ip().to_string(), addr.port(), 1, 5, 1, 1).unwrap();
        let adapter = IbkrBrokerAdapter::new(config);
        adapter.connect().await.unwrap();

        let summary = adapter.account_summary().await.unwrap();
        assert_eq!(summary.net_liquidation, Decimal::from_str("100000").unwrap());
        assert_eq!(summary.gross_position_value, Decimal::from_str("15000").unwrap());
    }

    #[tokio::test]
    async fn snapshot_rejects_delayed_data_when_disallowed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(fake_broker(
            listener,
            vec![
                ("REQ_MARKET_DATA_TYPE", vec!["OK"]),
                (
                    "SNAPSHOT",
                    vec![
                        "OK", "SPY", "450", "C", "2026-09-18", "1.10", "1.20", "1.15", "500", "1200", "0.35", "0.02", "-0.05", "0.12", "0.22",
                        "DELAYED",
                    ],
                ),
            ],
        ));

        let config = BrokerConfig::new(addr.ip().to_string(), addr.port(), 1, 5, 1, 1).unwrap();
        let adapter = IbkrBrokerAdapter::new(config);
        adapter.connect().await.unwrap();

        let err = adapter.snapshot_option(111, false).await.unwrap_err();
        assert!(matches!(err, BrokerError::DelayedData { .. }));
    }
}
