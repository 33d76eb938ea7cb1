//! Cached risk-free rate (§4.6): fetched once from the broker's Treasury
//! yield data and reused for the remainder of the process run, re-fetched at
//! most once per 6 h tick. A failed fetch — including the very first one —
//! falls back to the static 4.5% default and does not advance the cache
//! timestamp, so the next tick retries rather than locking in the fallback.

use crate::domain::errors::BrokerError;
use crate::domain::ports::BrokerAdapter;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;

pub const FALLBACK_RATE: Decimal = dec!(0.045);
const REFRESH_INTERVAL_HOURS: i64 = 6;

pub struct RiskFreeRateCache {
    state: RwLock<Option<(Decimal, DateTime<Utc>)>>,
}

impl Default for RiskFreeRateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskFreeRateCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    /// Returns the cached rate if fresher than 6h, otherwise refetches from
    /// the broker. `now` is threaded in (rather than read from a system
    /// clock here) so callers drive it from the already-corrected
    /// `domain::ports::Clock`.
    pub async fn rate(&self, broker: &dyn BrokerAdapter, now: DateTime<Utc>) -> Decimal {
        {
            let cached = self.state.read().await;
            if let Some((rate, fetched_at)) = *cached {
                if now - fetched_at < ChronoDuration::hours(REFRESH_INTERVAL_HOURS) {
                    return rate;
                }
            }
        }
        match broker.risk_free_rate().await {
            Ok(rate) => {
                let mut cached = self.state.write().await;
                *cached = Some((rate, now));
                rate
            }
            Err(BrokerError::Unreachable { .. } | BrokerError::ConnectionClosed) | Err(_) => {
                let cached = self.state.read().await;
                cached.map(|(rate, _)| rate).unwrap_or(FALLBACK_RATE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingBroker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BrokerAdapter for FailingBroker {
        async fn connect(&self) -> Result<(), BrokerError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), BrokerError> {
            Ok(())
        }
        async fn ensure_connected(&self) -> Result<(), BrokerError> {
            Ok(())
        }
        async fn account_summary(&self) -> Result<crate::domain::types::AccountSummary, BrokerError> {
            unimplemented!()
        }
        async fn qualify(&self, _symbol: &str) -> Result<i64, BrokerError> {
            unimplemented!()
        }
        async fn snapshot_option(
            &self,
            _con_id: i64,
            _allow_delayed_data: bool,
        ) -> Result<crate::domain::types::OptionQuote, BrokerError> {
            unimplemented!()
        }
        async fn place_combo(
            &self,
            _legs: &[crate::domain::ports::ComboLeg],
            _order: crate::domain::ports::ComboOrder,
        ) -> Result<crate::domain::ports::TradeHandle, BrokerError> {
            unimplemented!()
        }
        async fn cancel_order(&self, _order_id: &str) -> Result<(), BrokerError> {
            Ok(())
        }
        async fn open_orders(&self) -> Result<Vec<crate::domain::ports::TradeHandle>, BrokerError> {
            Ok(vec![])
        }
        async fn portfolio(&self) -> Result<Vec<crate::domain::ports::PortfolioPosition>, BrokerError> {
            Ok(vec![])
        }
        async fn historical_bars(
            &self,
            _symbol: &str,
            _duration_days: u32,
            _bar_size: &str,
        ) -> Result<Vec<crate::domain::ports::Candle>, BrokerError> {
            Ok(vec![])
        }
        async fn fundamental_xml(&self, _symbol: &str, _report: &str) -> Result<String, BrokerError> {
            Ok(String::new())
        }
        async fn risk_free_rate(&self) -> Result<Decimal, BrokerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BrokerError::ConnectionClosed)
        }
        async fn scan(
            &self,
            _code: &str,
            _min_price: Decimal,
            _max_price: Decimal,
        ) -> Result<Vec<String>, BrokerError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn falls_back_to_static_rate_on_fetch_failure() {
        let broker = FailingBroker { calls: AtomicUsize::new(0) };
        let cache = RiskFreeRateCache::new();
        let rate = cache.rate(&broker, Utc::now()).await;
        assert_eq!(rate, FALLBACK_RATE);
    }
}
