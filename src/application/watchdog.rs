//! §4.16 Watchdog: an external monitor process, run as a separate binary
//! from the trading engine itself (so a wedged Tokio runtime inside the
//! engine can't also wedge its own monitor). Liveness is three checks
//! ANDed together: the service manager reports the unit active, the main
//! log's mtime is within `max_log_age_seconds`, and the log's last line
//! carries a timestamp within `recent_activity_window_seconds`. On any
//! failure it stops the service, kills stragglers, starts it again, and
//! records the restart — rate-limited to 3 per hour.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};

const MAX_RESTARTS_PER_HOUR: usize = 3;
const RESTART_WINDOW: Duration = Duration::from_secs(3600);

pub struct WatchdogConfig {
    pub service_name: String,
    pub log_file_path: PathBuf,
    pub max_log_age_seconds: u64,
    pub recent_activity_window_seconds: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LivenessCheck {
    Alive,
    ServiceInactive,
    LogStale,
    NoRecentActivity,
}

pub struct Watchdog {
    config: WatchdogConfig,
    restart_history: VecDeque<DateTime<Utc>>,
    exhausted: bool,
}

impl Watchdog {
    pub fn new(config: WatchdogConfig) -> Self {
        Self { config, restart_history: VecDeque::new(), exhausted: false }
    }

    /// Runs one liveness check and, on failure, attempts recovery. Returns
    /// `Some(reason)` if a restart was attempted (successfully or not);
    /// `None` if the service was already healthy.
    pub async fn check_and_recover(&mut self) -> Option<String> {
        if self.exhausted {
            return None;
        }
        match self.check_liveness().await {
            LivenessCheck::Alive => None,
            failure => {
                let reason = describe(&failure);
                warn!(reason, "watchdog liveness check failed");
                Some(self.recover(reason).await)
            }
        }
    }

    async fn check_liveness(&self) -> LivenessCheck {
        if !self.service_is_active().await {
            return LivenessCheck::ServiceInactive;
        }
        match std::fs::metadata(&self.config.log_file_path).and_then(|m| m.modified()) {
            Ok(modified) => {
                let age = modified.elapsed().unwrap_or(Duration::MAX);
                if age.as_secs() > self.config.max_log_age_seconds {
                    return LivenessCheck::LogStale;
                }
            }
            Err(e) => {
                warn!(error = %e, path = %self.config.log_file_path.display(), "watchdog could not stat log file");
                return LivenessCheck::LogStale;
            }
        }
        if !self.log_shows_recent_activity() {
            return LivenessCheck::NoRecentActivity;
        }
        LivenessCheck::Alive
    }

    async fn service_is_active(&self) -> bool {
        match Command::new("systemctl").args(["is-active", "--quiet", &self.config.service_name]).status().await {
            Ok(status) => status.success(),
            Err(e) => {
                warn!(error = %e, "systemctl is-active failed to run, treating service as inactive");
                false
            }
        }
    }

    /// The last line's embedded RFC3339 timestamp (the format
    /// `tracing_subscriber::fmt`'s default layer writes) must fall within
    /// the recent-activity window. A line with no parseable timestamp does
    /// not count as stale by itself — only log silence does.
    fn log_shows_recent_activity(&self) -> bool {
        let Ok(contents) = std::fs::read_to_string(&self.config.log_file_path) else {
            return false;
        };
        let Some(last_line) = contents.lines().rev().find(|l| !l.trim().is_empty()) else {
            return false;
        };
        let Some(ts) = extract_rfc3339_prefix(last_line) else {
            return true;
        };
        let age = Utc::now().signed_duration_since(ts).num_seconds();
        age >= 0 && (age as u64) <= self.config.recent_activity_window_seconds
    }

    async fn recover(&mut self, reason: &str) -> String {
        self.prune_restart_history();
        if self.restart_history.len() >= MAX_RESTARTS_PER_HOUR {
            self.exhausted = true;
            error!(reason, "watchdog restart budget exhausted, giving up for this process lifetime");
            return format!("restart budget exhausted after {reason}");
        }

        info!(reason, service = %self.config.service_name, "watchdog stopping service");
        let _ = Command::new("systemctl").args(["stop", &self.config.service_name]).status().await;

        if let Err(e) = Command::new("pkill").args(["-f", &self.config.service_name]).status().await {
            warn!(error = %e, "pkill of stragglers failed to run");
        }

        info!(service = %self.config.service_name, "watchdog starting service");
        match Command::new("systemctl").args(["start", &self.config.service_name]).status().await {
            Ok(status) if status.success() => {
                self.restart_history.push_back(Utc::now());
                info!(reason, "watchdog restarted service");
            }
            Ok(status) => error!(?status, "systemctl start exited non-zero"),
            Err(e) => error!(error = %e, "systemctl start failed to run"),
        }

        reason.to_string()
    }

    fn prune_restart_history(&mut self) {
        let cutoff = Utc::now() - chrono::Duration::from_std(RESTART_WINDOW).unwrap_or(chrono::Duration::hours(1));
        while self.restart_history.front().is_some_and(|t| *t < cutoff) {
            self.restart_history.pop_front();
        }
    }
}

fn describe(check: &LivenessCheck) -> &'static str {
    match check {
        LivenessCheck::Alive => "alive",
        LivenessCheck::ServiceInactive => "service reported inactive",
        LivenessCheck::LogStale => "log file stale",
        LivenessCheck::NoRecentActivity => "no recent activity in log",
    }
}

fn extract_rfc3339_prefix(line: &str) -> Option<DateTime<Utc>> {
    let candidate = line.split_whitespace().next()?;
    DateTime::parse_from_rfc3339(candidate).ok().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_rfc3339_prefix_parses_leading_timestamp() {
        let line = "2026-07-30T12:00:00Z INFO rustrade: scan tick complete";
        assert!(extract_rfc3339_prefix(line).is_some());
    }

    #[test]
    fn extract_rfc3339_prefix_none_for_non_timestamp_lines() {
        assert_eq!(extract_rfc3339_prefix("not a timestamp at all"), None);
    }

    #[test]
    fn describe_is_stable_for_each_variant() {
        assert_eq!(describe(&LivenessCheck::Alive), "alive");
        assert_eq!(describe(&LivenessCheck::ServiceInactive), "service reported inactive");
    }
}
