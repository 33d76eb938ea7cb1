//! Logging/metrics/notifier plumbing (ADD §2): never gated by the spec's
//! Non-goals, which scope out *features*, not the ambient operational
//! surface.

use anyhow::Result;
use std::env;

#[derive(Debug, Clone)]
pub struct ObservabilityEnvConfig {
    pub rust_log: String,
    pub metrics_report_interval_secs: u64,
    pub notifier_webhook_url: Option<String>,
    pub notifier_chat_id: Option<String>,
    pub max_log_age_seconds: u64,
    /// §4.16 Watchdog: path to the main log file, polled for mtime and
    /// recent-activity content.
    pub log_file_path: String,
    /// Service-manager unit name the Watchdog checks/restarts.
    pub service_name: String,
    /// Window within which the log's last line timestamp must fall for
    /// the "recent-activity" liveness check to pass.
    pub recent_activity_window_seconds: u64,
}

impl ObservabilityEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info,rustrade_options=debug".to_string()),
            metrics_report_interval_secs: env::var("METRICS_REPORT_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            notifier_webhook_url: env::var("NOTIFIER_WEBHOOK_URL").ok(),
            notifier_chat_id: env::var("NOTIFIER_CHAT_ID").ok(),
            max_log_age_seconds: env::var("MAX_LOG_AGE_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            log_file_path: env::var("LOG_FILE_PATH").unwrap_or_else(|_| "data/rustrade.log".to_string()),
            service_name: env::var("WATCHDOG_SERVICE_NAME").unwrap_or_else(|_| "rustrade-options".to_string()),
            recent_activity_window_seconds: env::var("RECENT_ACTIVITY_WINDOW_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(900),
        })
    }
}
