//! §4.11 Order Manager: the single submission primitive for open, close and
//! roll combos. Rolls use the same primitive with a 4-leg BAG (no
//! non-atomic fallback) — see [`super::roll_manager`].

use crate::domain::errors::{BrokerError, StoreError};
use crate::domain::ports::{BrokerAdapter, ComboLeg, ComboOrder, Store, TradeHandle};
use crate::domain::types::{Trade, TradeStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct TrackedOrder {
    trade_id: uuid::Uuid,
    submitted_at: chrono::DateTime<chrono::Utc>,
}

/// Retains `(orderId, Trade, submitted_at)` for every order this process
/// has submitted (§4.11). Orders seen in `open_orders()` with no tracking
/// record predate this process and are conservatively cancelled on the
/// first TTL sweep.
pub struct OrderManager {
    broker: Arc<dyn BrokerAdapter>,
    store: Arc<dyn Store>,
    tracked: Mutex<HashMap<String, TrackedOrder>>,
}

impl OrderManager {
    pub fn new(broker: Arc<dyn BrokerAdapter>, store: Arc<dyn Store>) -> Self {
        Self {
            broker,
            store,
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Submits a combo and records the trade audit row plus the tracking
    /// entry used by [`Self::cancel_stale_orders`]. Used identically for
    /// opens, closes, and (4-leg) rolls.
    pub async fn submit(
        &self,
        trade: Trade,
        legs: &[ComboLeg],
        order: ComboOrder,
    ) -> Result<TradeHandle, BrokerError> {
        self.store.log_trade(&trade).await.map_err(store_err_as_broker)?;

        let handle = self.broker.place_combo(legs, order).await?;

        self.tracked.lock().await.insert(
            handle.order_id.clone(),
            TrackedOrder {
                trade_id: trade.id,
                submitted_at: chrono::Utc::now(),
            },
        );

        info!(order_id = %handle.order_id, trade_id = %trade.id, status = ?handle.status, "combo submitted");
        Ok(handle)
    }

    /// Polls `open_orders()` until `order_id` resolves out of
    /// `Submitted`/`PartiallyFilled`, or `timeout` elapses (used by the
    /// Roll Manager's 30s fill window, §4.13).
    pub async fn await_fill(&self, order_id: &str, timeout: Duration) -> Result<Option<TradeHandle>, BrokerError> {
        let deadline = Instant::now() + timeout;
        loop {
            let open = self.broker.open_orders().await?;
            if let Some(handle) = open.iter().find(|h| h.order_id == order_id) {
                if !matches!(handle.status, TradeStatus::Submitted | TradeStatus::PartiallyFilled) {
                    return Ok(Some(handle.clone()));
                }
            } else {
                // No longer in the broker's open-orders list: either filled
                // and settled, or cancelled out from under us.
                return Ok(None);
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// §4.11 TTL sweep: cancels every tracked order whose age exceeds `ttl`,
    /// and every untracked order outright (pre-startup orders).
    pub async fn cancel_stale_orders(&self, ttl_minutes: i64) -> Result<Vec<String>, BrokerError> {
        let open = self.broker.open_orders().await?;
        let now = chrono::Utc::now();
        let mut cancelled = Vec::new();
        let mut tracked = self.tracked.lock().await;

        for handle in &open {
            let stale = match tracked.get(&handle.order_id) {
                Some(t) => (now - t.submitted_at).num_minutes() > ttl_minutes,
                None => true,
            };
            if stale {
                if let Err(e) = self.broker.cancel_order(&handle.order_id).await {
                    warn!(order_id = %handle.order_id, error = %e, "failed to cancel stale order");
                    continue;
                }
                tracked.remove(&handle.order_id);
                cancelled.push(handle.order_id.clone());
            }
        }
        Ok(cancelled)
    }

    pub async fn open_order_count(&self) -> usize {
        self.tracked.lock().await.len()
    }
}

fn store_err_as_broker(e: StoreError) -> BrokerError {
    BrokerError::Protocol(format!("store write failed before submission: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{OrderPrice, TimeInForce};
    use crate::domain::types::{Action, Regime, TradeKind};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBroker {
        cancel_calls: AtomicUsize,
    }

    #[async_trait]
    impl BrokerAdapter for FakeBroker {
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
        async fn place_combo(&self, _legs: &[ComboLeg], _order: ComboOrder) -> Result<TradeHandle, BrokerError> {
            Ok(TradeHandle {
                order_id: "order-1".to_string(),
                status: TradeStatus::Submitted,
            })
        }
        async fn cancel_order(&self, _order_id: &str) -> Result<(), BrokerError> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn open_orders(&self) -> Result<Vec<TradeHandle>, BrokerError> {
            Ok(vec![TradeHandle {
                order_id: "order-1".to_string(),
                status: TradeStatus::Submitted,
            }])
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
        async fn risk_free_rate(&self) -> Result<rust_decimal::Decimal, BrokerError> {
            Ok(dec!(0.045))
        }
        async fn scan(
            &self,
            _code: &str,
            _min_price: rust_decimal::Decimal,
            _max_price: rust_decimal::Decimal,
        ) -> Result<Vec<String>, BrokerError> {
            Ok(vec![])
        }
    }

    fn sample_trade() -> Trade {
        Trade {
            id: uuid::Uuid::new_v4(),
            position_id: None,
            symbol: "SPY".to_string(),
            kind: TradeKind::Open,
            status: TradeStatus::Submitted,
            requested_quantity: 1,
            filled_quantity: 0,
            fill_price: None,
            vix_at_entry: dec!(18.5),
            regime_at_entry: Regime::LowVolNeutral,
            submitted_at: chrono::Utc::now(),
            notes: None,
        }
    }

    async fn in_memory_store() -> Arc<dyn Store> {
        let db = crate::infrastructure::persistence::Database::new("sqlite::memory:").await.unwrap();
        Arc::new(crate::infrastructure::persistence::SqliteStore::new(db))
    }

    #[tokio::test]
    async fn submit_tracks_order_and_logs_trade() {
        let broker: Arc<dyn BrokerAdapter> = Arc::new(FakeBroker { cancel_calls: AtomicUsize::new(0) });
        let store = in_memory_store().await;
        let manager = OrderManager::new(broker, store);

        let legs = vec![ComboLeg { con_id: 1, action: Action::Sell, ratio: 1 }];
        let order = ComboOrder {
            action: Action::Sell,
            quantity: 1,
            price: OrderPrice::Limit(dec!(0.625)),
            time_in_force: TimeInForce::Day,
        };
        let handle = manager.submit(sample_trade(), &legs, order).await.unwrap();
        assert_eq!(handle.order_id, "order-1");
        assert_eq!(manager.open_order_count().await, 1);
    }

    #[tokio::test]
    async fn untracked_order_is_cancelled_on_first_sweep() {
        let broker: Arc<dyn BrokerAdapter> = Arc::new(FakeBroker { cancel_calls: AtomicUsize::new(0) });
        let store = in_memory_store().await;
        let manager = OrderManager::new(broker, store);

        let cancelled = manager.cancel_stale_orders(30).await.unwrap();
        assert_eq!(cancelled, vec!["order-1".to_string()]);
    }
}
