//! §4.17 Notifier façade and §6 notifier channel: outbound HTTP POST with
//! JSON `{chat_id, text, parse_mode, disable_notification}`, 10 s timeout,
//! no retry. Delivery is best-effort — a transport failure is logged and
//! dropped, never propagated into the trading pipeline (§7: "failures are
//! logged, never retried").

use crate::domain::ports::{Notifier, NotifierEvent};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

pub struct HttpNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
    chat_id: Option<String>,
}

impl HttpNotifier {
    pub fn new(webhook_url: Option<String>, chat_id: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with a fixed timeout"),
            webhook_url,
            chat_id,
        }
    }

    fn render(event: &NotifierEvent) -> String {
        match event {
            NotifierEvent::TradeOpened { symbol, strategy, credit } => {
                format!("OPENED {symbol} {strategy} credit={credit}")
            }
            NotifierEvent::TradeClosed { symbol, reason, pnl } => {
                format!("CLOSED {symbol} reason={reason} pnl={pnl}")
            }
            NotifierEvent::VixPanic { vix } => format!("VIX PANIC: {vix}"),
            NotifierEvent::Backwardation { ratio } => format!("term structure backwardation, ratio={ratio}"),
            NotifierEvent::PipelineError { detail } => format!("pipeline error: {detail}"),
            NotifierEvent::ReconciliationDiff { closed_externally, new_in_broker } => {
                format!("reconciliation: closed_externally={closed_externally} new_in_broker={new_in_broker}")
            }
            NotifierEvent::WatchdogRestart { reason } => format!("watchdog restarted service: {reason}"),
            NotifierEvent::DailySummary { realized_pnl, open_positions } => {
                format!("daily summary: realized_pnl={realized_pnl} open_positions={open_positions}")
            }
            NotifierEvent::Startup => "service starting".to_string(),
            NotifierEvent::Shutdown => "service shutting down".to_string(),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn publish(&self, event: NotifierEvent) {
        let Some(url) = &self.webhook_url else {
            info!(text = %Self::render(&event), "notifier webhook not configured, logging only");
            return;
        };

        let body = json!({
            "chat_id": self.chat_id,
            "text": Self::render(&event),
            "parse_mode": "Markdown",
            "disable_notification": false,
        });

        if let Err(e) = self.client.post(url).json(&body).send().await {
            warn!(error = %e, "notifier delivery failed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn renders_trade_opened() {
        let text = HttpNotifier::render(&NotifierEvent::TradeOpened {
            symbol: "SPY".into(),
            strategy: "IRON_CONDOR".into(),
            credit: dec!(0.625),
        });
        assert!(text.contains("SPY"));
        assert!(text.contains("0.625"));
    }

    #[tokio::test]
    async fn publish_without_webhook_never_panics() {
        let notifier = HttpNotifier::new(None, None);
        notifier.publish(NotifierEvent::Startup).await;
    }
}
