//! Earnings-blackout gate (§4.10 gate 3) input: next earnings timestamp for
//! a symbol. Same opaque-collaborator posture as [`super::dividend_source`]:
//! a data outage degrades to "no known earnings date", not a hard failure.

use crate::domain::errors::ExternalClientError;
use crate::domain::ports::{EarningsSource, RateLimitedClient};
use crate::infrastructure::external::budget::DailyBudget;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct RawEarningsResponse {
    next_earnings_at: Option<String>,
}

pub struct HttpEarningsSource {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: Option<String>,
    cost_per_call_usd: Decimal,
    budget: DailyBudget,
}

impl HttpEarningsSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        daily_limit_usd: Decimal,
        cost_per_call_usd: Decimal,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client: super::http_client::build(call_timeout),
            base_url: base_url.into(),
            api_key,
            cost_per_call_usd,
            budget: DailyBudget::new(daily_limit_usd),
        }
    }
}

#[async_trait]
impl RateLimitedClient for HttpEarningsSource {
    fn name(&self) -> &str {
        "earnings_source"
    }

    fn can_request(&self) -> bool {
        self.budget.can_request()
    }

    async fn record_usage(&self, cost_usd: Decimal) {
        self.budget.record_usage(cost_usd);
    }
}

#[async_trait]
impl EarningsSource for HttpEarningsSource {
    async fn next_earnings(&self, symbol: &str) -> Result<Option<DateTime<Utc>>, ExternalClientError> {
        if !self.can_request() {
            return Err(ExternalClientError::SilentMode {
                client: self.name().to_string(),
                daily_limit_usd: self.budget.spent_today(),
            });
        }

        let mut req = self.client.get(format!("{}/{symbol}/earnings/next", self.base_url));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let send_result = req.send().await;
        self.record_usage(self.cost_per_call_usd).await;

        let resp = send_result.map_err(|e| ExternalClientError::RequestFailed {
            client: self.name().to_string(),
            reason: e.to_string(),
        })?;

        let raw: RawEarningsResponse = match resp.json().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, symbol, "earnings source response did not parse");
                return Ok(None);
            }
        };

        Ok(raw
            .next_earnings_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }
}
