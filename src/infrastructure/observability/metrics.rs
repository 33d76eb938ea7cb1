//! Prometheus metric definitions, `rustrade_options_` prefix. Rendered only
//! by [`super::reporter::MetricsReporter`] into the periodic JSON log line —
//! there is no inbound `/metrics` endpoint (§2 ADD: push-based observability
//! only).

use prometheus::{
    core::{AtomicF64, GenericGauge, GenericGaugeVec},
    CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub open_positions_count: GenericGauge<AtomicF64>,
    pub net_liquidation_usd: GenericGauge<AtomicF64>,
    pub available_funds_usd: GenericGauge<AtomicF64>,
    pub realized_pnl_today_usd: GenericGauge<AtomicF64>,
    pub portfolio_beta_weighted_delta: GenericGauge<AtomicF64>,
    pub vix_current: GenericGauge<AtomicF64>,
    pub circuit_breaker_status: GenericGauge<AtomicF64>,
    pub trades_total: CounterVec,
    pub risk_gate_rejections_total: CounterVec,
    pub external_client_calls_total: CounterVec,
    pub external_client_cost_usd_total: CounterVec,
    pub broker_request_latency_seconds: HistogramVec,
    pub shadow_trades_total: CounterVec,
    pub position_value_usd: GenericGaugeVec<AtomicF64>,
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let open_positions_count = Gauge::with_opts(Opts::new(
            "rustrade_options_open_positions_count",
            "Number of currently open positions",
        ))?;
        registry.register(Box::new(open_positions_count.clone()))?;

        let net_liquidation_usd = Gauge::with_opts(Opts::new(
            "rustrade_options_net_liquidation_usd",
            "Account net liquidation value",
        ))?;
        registry.register(Box::new(net_liquidation_usd.clone()))?;

        let available_funds_usd = Gauge::with_opts(Opts::new(
            "rustrade_options_available_funds_usd",
            "Account available funds",
        ))?;
        registry.register(Box::new(available_funds_usd.clone()))?;

        let realized_pnl_today_usd = Gauge::with_opts(Opts::new(
            "rustrade_options_realized_pnl_today_usd",
            "Realized P&L for the current trading day",
        ))?;
        registry.register(Box::new(realized_pnl_today_usd.clone()))?;

        let portfolio_beta_weighted_delta = Gauge::with_opts(Opts::new(
            "rustrade_options_portfolio_beta_weighted_delta",
            "Current portfolio beta-weighted delta",
        ))?;
        registry.register(Box::new(portfolio_beta_weighted_delta.clone()))?;

        let vix_current = Gauge::with_opts(Opts::new(
            "rustrade_options_vix_current",
            "Last observed VIX level",
        ))?;
        registry.register(Box::new(vix_current.clone()))?;

        let circuit_breaker_status = Gauge::with_opts(Opts::new(
            "rustrade_options_circuit_breaker_status",
            "1 if a circuit breaker event is active, 0 otherwise",
        ))?;
        registry.register(Box::new(circuit_breaker_status.clone()))?;

        let trades_total = CounterVec::new(
            Opts::new("rustrade_options_trades_total", "Trades submitted by kind and status"),
            &["kind", "status"],
        )?;
        registry.register(Box::new(trades_total.clone()))?;

        let risk_gate_rejections_total = CounterVec::new(
            Opts::new(
                "rustrade_options_risk_gate_rejections_total",
                "Candidates rejected by risk gate",
            ),
            &["gate"],
        )?;
        registry.register(Box::new(risk_gate_rejections_total.clone()))?;

        let external_client_calls_total = CounterVec::new(
            Opts::new(
                "rustrade_options_external_client_calls_total",
                "External client calls by client and outcome",
            ),
            &["client", "outcome"],
        )?;
        registry.register(Box::new(external_client_calls_total.clone()))?;

        let external_client_cost_usd_total = CounterVec::new(
            Opts::new(
                "rustrade_options_external_client_cost_usd_total",
                "Cumulative USD spend per external client",
            ),
            &["client"],
        )?;
        registry.register(Box::new(external_client_cost_usd_total.clone()))?;

        let broker_request_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "rustrade_options_broker_request_latency_seconds",
                "Broker adapter request latency",
            )
            .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["operation"],
        )?;
        registry.register(Box::new(broker_request_latency_seconds.clone()))?;

        let shadow_trades_total = CounterVec::new(
            Opts::new("rustrade_options_shadow_trades_total", "Shadow trades by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(shadow_trades_total.clone()))?;

        let position_value_usd = GaugeVec::new(
            Opts::new("rustrade_options_position_value_usd", "Per-symbol open position max risk"),
            &["symbol"],
        )?;
        registry.register(Box::new(position_value_usd.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "rustrade_options_uptime_seconds",
            "Process uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            open_positions_count,
            net_liquidation_usd,
            available_funds_usd,
            realized_pnl_today_usd,
            portfolio_beta_weighted_delta,
            vix_current,
            circuit_breaker_status,
            trades_total,
            risk_gate_rejections_total,
            external_client_calls_total,
            external_client_cost_usd_total,
            broker_request_latency_seconds,
            shadow_trades_total,
            position_value_usd,
            uptime_seconds,
        })
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }

    pub fn inc_trade(&self, kind: &str, status: &str) {
        self.trades_total.with_label_values(&[kind, status]).inc();
    }

    pub fn inc_risk_gate_rejection(&self, gate: &str) {
        self.risk_gate_rejections_total.with_label_values(&[gate]).inc();
    }

    pub fn inc_external_call(&self, client: &str, outcome: &str) {
        self.external_client_calls_total.with_label_values(&[client, outcome]).inc();
    }

    pub fn add_external_cost(&self, client: &str, cost_usd: f64) {
        self.external_client_cost_usd_total.with_label_values(&[client]).inc_by(cost_usd);
    }

    pub fn observe_broker_latency(&self, operation: &str, seconds: f64) {
        self.broker_request_latency_seconds.with_label_values(&[operation]).observe(seconds);
    }

    pub fn inc_shadow_trade(&self, outcome: &str) {
        self.shadow_trades_total.with_label_values(&[outcome]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("metric registration with fixed, non-duplicate names never fails")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_render_contains_namespace() {
        let metrics = Metrics::new().unwrap();
        assert!(metrics.render().contains("rustrade_options_"));
    }

    #[test]
    fn position_value_tracked_per_symbol() {
        let metrics = Metrics::new().unwrap();
        metrics.position_value_usd.with_label_values(&["SPY"]).set(500.0);
        let output = metrics.render();
        assert!(output.contains("SPY"));
    }

    #[test]
    fn trade_counter_increments_by_label() {
        let metrics = Metrics::new().unwrap();
        metrics.inc_trade("OPEN", "FILLED");
        metrics.inc_trade("OPEN", "FILLED");
        let output = metrics.render();
        assert!(output.contains("rustrade_options_trades_total"));
    }
}
