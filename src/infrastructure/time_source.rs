//! §6 External time source: a single HTTP GET returning an ISO-8601 zoned
//! timestamp for `America/New_York`. A parse failure or request failure
//! leaves the previously-known drift offset in place (§4.1) — this client
//! only ever *measures*; `infrastructure::clock::SystemClock::sync_drift`
//! owns applying the measurement.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct TimeApiResponse {
    #[serde(rename = "dateTime")]
    date_time: String,
}

pub struct HttpTimeSource {
    client: reqwest::Client,
    url: String,
}

impl HttpTimeSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("reqwest client builds with a fixed timeout"),
            url: url.into(),
        }
    }

    /// Fetches the current authoritative time. Returns `None` (rather than
    /// an error) on any failure so the 6-hourly sync loop in the scheduler
    /// can simply skip this tick and retry at the next one.
    pub async fn fetch_authoritative_now(&self) -> Option<DateTime<Utc>> {
        match self.try_fetch().await {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!(error = %e, "external time source fetch failed; keeping previous drift offset");
                None
            }
        }
    }

    async fn try_fetch(&self) -> Result<DateTime<Utc>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("time source request failed")?
            .json::<TimeApiResponse>()
            .await
            .context("time source response did not parse as JSON")?;
        DateTime::parse_from_rfc3339(&resp.date_time)
            .map(|dt| dt.with_timezone(&Utc))
            .context("dateTime field did not parse as ISO-8601")
    }
}

impl Default for HttpTimeSource {
    fn default() -> Self {
        Self::new("https://timeapi.io/api/Time/current/zone?timeZone=America/New_York")
    }
}
