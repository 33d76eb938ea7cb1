//! Periodic JSON snapshot to stdout, prefixed `METRICS_JSON:` so a log
//! collector (Loki, Fluentd, CloudWatch Logs) can filter it out of the
//! regular `tracing` stream. There is no inbound metrics endpoint; this is
//! the entire observability surface (§2 ADD).

use crate::domain::ports::Store;
use crate::domain::types::AccountSummary;
use crate::infrastructure::observability::metrics::Metrics;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub account: Option<AccountSnapshot>,
    pub open_positions_count: usize,
    pub circuit_breaker_active: bool,
}

#[derive(Serialize)]
pub struct AccountSnapshot {
    pub net_liquidation: f64,
    pub available_funds: f64,
    pub gross_position_value: f64,
}

/// Shared read-through cache for the last fetched account summary (§5: a
/// 1-minute cache backs this so the reporter never itself calls the broker).
pub type AccountCache = Arc<RwLock<Option<AccountSummary>>>;

pub struct MetricsReporter {
    store: Arc<dyn Store>,
    account_cache: AccountCache,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(store: Arc<dyn Store>, account_cache: AccountCache, metrics: Metrics, interval_seconds: u64) -> Self {
        Self {
            store,
            account_cache,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    pub async fn run(self) {
        info!(interval = ?self.interval, "metrics reporter starting");
        loop {
            tokio::time::sleep(self.interval).await;
            match self.collect_snapshot().await {
                Ok(snapshot) => match serde_json::to_string(&snapshot) {
                    Ok(json) => {
                        println!("METRICS_JSON:{json}");
                        info!(
                            open_positions = snapshot.open_positions_count,
                            circuit_breaker_active = snapshot.circuit_breaker_active,
                            "metrics snapshot emitted"
                        );
                    }
                    Err(e) => warn!(error = %e, "failed to serialize metrics snapshot"),
                },
                Err(e) => warn!(error = %e, "failed to collect metrics snapshot"),
            }
        }
    }

    async fn collect_snapshot(&self) -> anyhow::Result<MetricsSnapshot> {
        let uptime = self.start_time.elapsed().as_secs();
        let open_positions = self.store.open_positions().await?;
        let circuit_breaker_active = self.store.active_circuit_breaker_event().await?.is_some();
        let account = self.account_cache.read().await.clone();

        self.metrics.open_positions_count.set(open_positions.len() as f64);
        self.metrics
            .circuit_breaker_status
            .set(if circuit_breaker_active { 1.0 } else { 0.0 });
        self.metrics.uptime_seconds.set(uptime as f64);
        for position in &open_positions {
            self.metrics
                .position_value_usd
                .with_label_values(&[&position.symbol])
                .set(position.max_risk.to_f64().unwrap_or(0.0));
        }
        let account_snapshot = account.map(|a| {
            self.metrics.net_liquidation_usd.set(a.net_liquidation.to_f64().unwrap_or(0.0));
            self.metrics.available_funds_usd.set(a.available_funds.to_f64().unwrap_or(0.0));
            AccountSnapshot {
                net_liquidation: a.net_liquidation.to_f64().unwrap_or(0.0),
                available_funds: a.available_funds.to_f64().unwrap_or(0.0),
                gross_position_value: a.gross_position_value.to_f64().unwrap_or(0.0),
            }
        });

        Ok(MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            account: account_snapshot,
            open_positions_count: open_positions.len(),
            circuit_breaker_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::{Database, SqliteStore};

    #[tokio::test]
    async fn snapshot_reflects_empty_store() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(db));
        let cache: AccountCache = Arc::new(RwLock::new(None));
        let metrics = Metrics::new().unwrap();
        let reporter = MetricsReporter::new(store, cache, metrics, 60);

        let snapshot = reporter.collect_snapshot().await.unwrap();
        assert_eq!(snapshot.open_positions_count, 0);
        assert!(!snapshot.circuit_breaker_active);
        assert!(snapshot.account.is_none());
    }
}
