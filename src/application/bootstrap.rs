//! Wires every adapter and application service into one running
//! `Application`, the way the teacher's `system`/`bootstrap::services`
//! layer composes its own engine: one function builds the whole object
//! graph from a validated `Config`, no component reaches for global state.

use crate::application::chain_fetcher::ChainFetcher;
use crate::application::exit_manager::ExitManager;
use crate::application::order_manager::OrderManager;
use crate::application::pipeline::EntryPipeline;
use crate::application::portfolio_exposure::PortfolioExposureTracker;
use crate::application::position_tracker::PositionTracker;
use crate::application::reconciler::Reconciler;
use crate::application::risk_gates::Pipeline as RiskGatePipeline;
use crate::application::roll_manager::RollManager;
use crate::application::screener::Screener;
use crate::application::scheduler::Scheduler;
use crate::config::Config;
use crate::domain::market::regime_classifier::Classifier;
use crate::domain::ports::{AiAdvisor, BrokerAdapter, Clock, DividendSource, EarningsSource, Notifier, NotifierEvent, Store};
use crate::infrastructure::broker::adapter::IbkrBrokerAdapter;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::external::{HttpAiAdvisor, HttpDividendSource, HttpEarningsSource};
use crate::infrastructure::historical_cache::HistoricalCache;
use crate::infrastructure::notifier::HttpNotifier;
use crate::infrastructure::observability::metrics::Metrics;
use crate::infrastructure::observability::reporter::{AccountCache, MetricsReporter};
use crate::infrastructure::persistence::{Database, SqliteStore};
use crate::infrastructure::time_source::HttpTimeSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

const DRIFT_SYNC_INTERVAL: Duration = Duration::from_secs(6 * 3600);

/// An active circuit breaker event whose `halt_duration_hours` has elapsed
/// auto-resets before the service accepts any entries, so a halt from a
/// prior run doesn't block forever across a restart. Additive to, never a
/// replacement for, an explicit manual reset.
async fn auto_reset_expired_circuit_breaker(store: &Arc<dyn Store>) -> anyhow::Result<()> {
    let Some(event) = store.active_circuit_breaker_event().await? else {
        return Ok(());
    };
    let Some(halt_duration_hours) = event.halt_duration_hours else {
        return Ok(());
    };
    let elapsed = chrono::Utc::now() - event.triggered_ts;
    if elapsed >= chrono::Duration::hours(halt_duration_hours) {
        store
            .reset_circuit_breaker(event.id, "AUTO", &format!("auto-reset after {halt_duration_hours}h halt"))
            .await?;
        info!(circuit_breaker_event_id = event.id, halt_duration_hours, "circuit breaker auto-reset on restart");
    }
    Ok(())
}

/// The fully wired engine. Holding it keeps every `Arc` alive for the
/// process lifetime; `start` hands off the long-running loops and returns
/// once they're spawned.
pub struct Application {
    config: Config,
    system_clock: Arc<SystemClock>,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    broker: Arc<dyn BrokerAdapter>,
    scheduler: Arc<Scheduler>,
    metrics_reporter: Option<MetricsReporter>,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let system_clock = Arc::new(SystemClock::new());
        let clock: Arc<dyn Clock> = system_clock.clone();
        let notifier: Arc<dyn Notifier> = Arc::new(HttpNotifier::new(config.observability.notifier_webhook_url.clone(), config.observability.notifier_chat_id.clone()));

        let database = Database::new(&config.trading.database_url).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(database));
        auto_reset_expired_circuit_breaker(&store).await?;

        let broker: Arc<dyn BrokerAdapter> = Arc::new(IbkrBrokerAdapter::new(config.broker.clone()));

        let call_timeout = Duration::from_secs(config.external.external_call_timeout_secs);
        let ai_advisor: Arc<dyn AiAdvisor> = Arc::new(HttpAiAdvisor::new(
            config.external.ai_advisor_base_url.clone(),
            config.external.ai_advisor_api_key.clone(),
            config.external.ai_advisor_model.clone(),
            config.external.ai_advisor_daily_limit_usd,
            config.external.ai_advisor_cost_per_call_usd,
            call_timeout,
        ));
        let dividend_source: Arc<dyn DividendSource> = Arc::new(HttpDividendSource::new(
            "https://dividend-source.internal".to_string(),
            config.external.dividend_source_api_key.clone(),
            config.external.dividend_source_daily_limit_usd,
            config.external.dividend_source_cost_per_call_usd,
            call_timeout,
        ));
        let earnings_source: Arc<dyn EarningsSource> = Arc::new(HttpEarningsSource::new(
            "https://earnings-source.internal".to_string(),
            config.external.earnings_source_api_key.clone(),
            config.external.earnings_source_daily_limit_usd,
            config.external.earnings_source_cost_per_call_usd,
            call_timeout,
        ));

        let historical_cache = Arc::new(HistoricalCache::new(config.trading.historical_cache_dir.clone()));

        let chain_fetcher = Arc::new(ChainFetcher::with_cache(broker.clone(), config.risk.allow_delayed_data, historical_cache));
        let screener = Arc::new(Screener::new(broker.clone(), chain_fetcher.clone(), config.trading.min_scan_price, config.trading.max_scan_price, config.trading.screener_candidate_limit));
        let order_manager = Arc::new(OrderManager::new(broker.clone(), store.clone()));
        let risk_gates = Arc::new(RiskGatePipeline::new(store.clone(), Some(dividend_source), Some(earnings_source), config.risk.clone(), config.strategy));
        let exposure = Arc::new(PortfolioExposureTracker::new(broker.clone(), store.clone(), chain_fetcher.clone(), config.risk.allow_delayed_data));
        let classifier = Arc::new(Classifier::RuleBased);

        let entry_pipeline = Arc::new(EntryPipeline::new(
            broker.clone(),
            store.clone(),
            clock.clone(),
            notifier.clone(),
            screener,
            chain_fetcher.clone(),
            classifier,
            order_manager.clone(),
            risk_gates,
            exposure,
            Some(ai_advisor.clone()),
            config.risk.clone(),
            config.strategy,
            config.risk.allow_delayed_data,
        ));

        let tracker = Arc::new(PositionTracker::new(broker.clone()));
        let exit_manager = Arc::new(ExitManager::new(
            tracker,
            order_manager.clone(),
            store.clone(),
            Some(ai_advisor),
            config.trading.ai_exit_trigger_pl_ratio,
            config.risk.time_exit_dte,
            config.risk.account_size,
            config.risk.daily_max_loss_pct,
            config.risk.consecutive_loss_limit,
            config.risk.halt_duration_hours,
        ));
        let roll_manager = Arc::new(RollManager::new(order_manager.clone(), config.strategy.roll_forward_days, config.strategy.roll_fill_timeout_secs, config.strategy.roll_max_debit));
        let reconciler = Arc::new(Reconciler::new(broker.clone(), store.clone(), notifier.clone()));

        let scheduler = Arc::new(Scheduler::new(
            clock.clone(),
            store.clone(),
            notifier.clone(),
            entry_pipeline,
            exit_manager,
            roll_manager,
            chain_fetcher,
            order_manager,
            reconciler,
            config.strategy,
            config.trading.cleanup_interval_minutes,
            config.risk.order_ttl_minutes,
        ));

        let metrics = Metrics::new()?;
        let account_cache: AccountCache = Arc::new(RwLock::new(None));
        let metrics_reporter = MetricsReporter::new(store.clone(), account_cache, metrics, config.observability.metrics_report_interval_secs);

        Ok(Self { config, system_clock, store, notifier, broker, scheduler, metrics_reporter: Some(metrics_reporter) })
    }

    /// Connects to the broker, publishes `Startup`, and spawns every
    /// long-running loop. Returns once everything is running; callers
    /// await a shutdown signal separately (see `src/bin/server.rs`).
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.broker.connect().await?;
        info!(host = %self.config.broker.host, port = self.config.broker.port, "broker connected");

        self.notifier.publish(NotifierEvent::Startup).await;

        let scheduler = self.scheduler.clone();
        tokio::spawn(async move { scheduler.run().await });

        if let Some(reporter) = self.metrics_reporter.take() {
            tokio::spawn(reporter.run());
        }

        let drift_clock = self.system_clock.clone();
        tokio::spawn(async move {
            let time_source = HttpTimeSource::default();
            let mut ticker = tokio::time::interval(DRIFT_SYNC_INTERVAL);
            loop {
                ticker.tick().await;
                if let Some(authoritative) = time_source.fetch_authoritative_now().await {
                    drift_clock.sync_drift(authoritative);
                }
            }
        });

        let reconcile_notifier = self.notifier.clone();
        let reconcile_store = self.store.clone();
        let reconcile_broker = self.broker.clone();
        tokio::spawn(async move {
            let reconciler = Reconciler::new(reconcile_broker, reconcile_store, reconcile_notifier);
            if let Err(e) = reconciler.reconcile().await {
                tracing::warn!(error = %e, "startup reconciliation failed");
            }
        });

        Ok(())
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown_handle().notify_one();
        self.notifier.publish(NotifierEvent::Shutdown).await;
    }
}
