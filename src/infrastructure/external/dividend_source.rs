//! Dividend-blackout gate (§4.10 gate 4) input: next ex-dividend date for a
//! symbol. The source itself is an opaque out-of-scope collaborator (§1); a
//! missing/unparsable response is treated as "no known ex-dividend date",
//! which lets the gate pass rather than block trading on a data outage.

use crate::domain::errors::ExternalClientError;
use crate::domain::ports::{DividendSource, RateLimitedClient};
use crate::infrastructure::external::budget::DailyBudget;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct RawDividendResponse {
    next_ex_dividend_date: Option<String>,
}

pub struct HttpDividendSource {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: Option<String>,
    cost_per_call_usd: Decimal,
    budget: DailyBudget,
}

impl HttpDividendSource {
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
impl RateLimitedClient for HttpDividendSource {
    fn name(&self) -> &str {
        "dividend_source"
    }

    fn can_request(&self) -> bool {
        self.budget.can_request()
    }

    async fn record_usage(&self, cost_usd: Decimal) {
        self.budget.record_usage(cost_usd);
    }
}

#[async_trait]
impl DividendSource for HttpDividendSource {
    async fn next_ex_dividend_date(&self, symbol: &str) -> Result<Option<NaiveDate>, ExternalClientError> {
        if !self.can_request() {
            return Err(ExternalClientError::SilentMode {
                client: self.name().to_string(),
                daily_limit_usd: self.budget.spent_today(),
            });
        }

        let mut req = self.client.get(format!("{}/{symbol}/dividends/next", self.base_url));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let send_result = req.send().await;
        self.record_usage(self.cost_per_call_usd).await;

        let resp = send_result.map_err(|e| ExternalClientError::RequestFailed {
            client: self.name().to_string(),
            reason: e.to_string(),
        })?;

        let raw: RawDividendResponse = match resp.json().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, symbol, "dividend source response did not parse");
                return Ok(None);
            }
        };

        Ok(raw
            .next_ex_dividend_date
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
    }
}
