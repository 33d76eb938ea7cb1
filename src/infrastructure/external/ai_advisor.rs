//! §6 AI advisor I/O: a single prompt string in, a JSON object out. The core
//! only ever consumes this as an opaque request/response service — no
//! advisor-side reasoning lives here, just the wire adapter and the
//! mixed-language verdict normalization the gate layer depends on.

use crate::domain::errors::ExternalClientError;
use crate::domain::ports::{AdvisorRequest, AdvisorResponse, AiAdvisor, RateLimitedClient};
use crate::domain::types::AdvisorVerdict;
use crate::infrastructure::external::budget::DailyBudget;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct RawAdvisorResponse {
    verdict: String,
    confidence_score: u8,
    strategy: Option<String>,
    short_strike: Option<Decimal>,
    long_strike: Option<Decimal>,
    expiration: Option<String>,
    limit_price: Option<Decimal>,
    take_profit: Option<Decimal>,
    stop_loss: Option<Decimal>,
    #[serde(default)]
    reasoning: String,
}

/// Normalizes the advisor's verdict token, which may arrive in either
/// English or the mixed-language form the upstream model occasionally
/// emits. Anything unrecognized is treated as a rejection (§6: "Unparsable
/// responses map to REJECT").
fn normalize_verdict(raw: &str) -> AdvisorVerdict {
    match raw.trim().to_uppercase().as_str() {
        "APPROVE" | "SCHVALENO" | "SCHVÁLENO" => AdvisorVerdict::Approve,
        "ADJUST" | "UPRAVIT" => AdvisorVerdict::Adjust,
        _ => AdvisorVerdict::Reject,
    }
}

pub struct HttpAiAdvisor {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: Option<String>,
    model: String,
    cost_per_call_usd: Decimal,
    budget: DailyBudget,
}

impl HttpAiAdvisor {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        daily_limit_usd: Decimal,
        cost_per_call_usd: Decimal,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client: super::http_client::build(call_timeout),
            base_url,
            api_key,
            model,
            cost_per_call_usd,
            budget: DailyBudget::new(daily_limit_usd),
        }
    }
}

#[async_trait]
impl RateLimitedClient for HttpAiAdvisor {
    fn name(&self) -> &str {
        "ai_advisor"
    }

    fn can_request(&self) -> bool {
        self.budget.can_request()
    }

    async fn record_usage(&self, cost_usd: Decimal) {
        self.budget.record_usage(cost_usd);
    }
}

#[async_trait]
impl AiAdvisor for HttpAiAdvisor {
    async fn evaluate(&self, request: AdvisorRequest) -> Result<AdvisorResponse, ExternalClientError> {
        if !self.can_request() {
            return Err(ExternalClientError::SilentMode {
                client: self.name().to_string(),
                daily_limit_usd: self.budget.spent_today(),
            });
        }

        let mut req = self.client.post(&self.base_url).json(&json!({
            "model": self.model,
            "prompt": request.prompt,
        }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let send_result = req.send().await;
        self.record_usage(self.cost_per_call_usd).await;

        let resp = send_result.map_err(|e| ExternalClientError::RequestFailed {
            client: self.name().to_string(),
            reason: e.to_string(),
        })?;

        let raw: RawAdvisorResponse = match resp.json().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "advisor response did not parse; treating as REJECT");
                return Ok(AdvisorResponse {
                    verdict: AdvisorVerdict::Reject,
                    confidence_score: 0,
                    strategy: None,
                    short_strike: None,
                    long_strike: None,
                    expiration: None,
                    limit_price: None,
                    take_profit: None,
                    stop_loss: None,
                    reasoning: "unparsable advisor response".to_string(),
                });
            }
        };

        let expiration = raw
            .expiration
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());

        Ok(AdvisorResponse {
            verdict: normalize_verdict(&raw.verdict),
            confidence_score: raw.confidence_score.clamp(1, 10),
            strategy: raw.strategy,
            short_strike: raw.short_strike,
            long_strike: raw.long_strike,
            expiration,
            limit_price: raw.limit_price,
            take_profit: raw.take_profit,
            stop_loss: raw.stop_loss,
            reasoning: raw.reasoning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_english_verdicts() {
        assert_eq!(normalize_verdict("APPROVE"), AdvisorVerdict::Approve);
        assert_eq!(normalize_verdict("reject"), AdvisorVerdict::Reject);
    }

    #[test]
    fn normalizes_mixed_language_verdicts() {
        assert_eq!(normalize_verdict("SCHVALENO"), AdvisorVerdict::Approve);
        assert_eq!(normalize_verdict("UPRAVIT"), AdvisorVerdict::Adjust);
        assert_eq!(normalize_verdict("ZAMITNUTO"), AdvisorVerdict::Reject);
    }

    #[test]
    fn unrecognized_token_maps_to_reject() {
        assert_eq!(normalize_verdict("huh?"), AdvisorVerdict::Reject);
    }
}
