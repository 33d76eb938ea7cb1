//! §4.16 external watchdog process: polls the trading engine's liveness
//! independently of its own runtime, restarts it through the service
//! manager when it goes dark, and notifies on every restart attempt.

use rustrade_options::application::watchdog::{Watchdog, WatchdogConfig};
use rustrade_options::config::Config;
use rustrade_options::domain::ports::{Notifier, NotifierEvent};
use rustrade_options::infrastructure::notifier::HttpNotifier;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.observability.rust_log).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let notifier = HttpNotifier::new(config.observability.notifier_webhook_url.clone(), config.observability.notifier_chat_id.clone());

    let watchdog_config = WatchdogConfig {
        service_name: config.observability.service_name.clone(),
        log_file_path: PathBuf::from(&config.observability.log_file_path),
        max_log_age_seconds: config.observability.max_log_age_seconds,
        recent_activity_window_seconds: config.observability.recent_activity_window_seconds,
    };
    let mut watchdog = Watchdog::new(watchdog_config);

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        if let Some(reason) = watchdog.check_and_recover().await {
            notifier.publish(NotifierEvent::WatchdogRestart { reason }).await;
        }
    }
}
