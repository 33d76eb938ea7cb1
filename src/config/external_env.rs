//! §4.5 rate-limited external clients: each carries an API key/base URL and
//! a daily USD budget. Parsed here, composed into per-client configs in
//! `infrastructure::external`.

use anyhow::Result;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

fn var<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key}={v} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct ExternalClientEnvConfig {
    pub ai_advisor_api_key: Option<String>,
    pub ai_advisor_base_url: String,
    pub ai_advisor_model: String,
    pub ai_advisor_daily_limit_usd: Decimal,
    pub ai_advisor_cost_per_call_usd: Decimal,

    pub news_api_key: Option<String>,
    pub news_daily_limit_usd: Decimal,
    pub news_cost_per_call_usd: Decimal,

    pub prediction_market_api_key: Option<String>,
    pub prediction_market_daily_limit_usd: Decimal,
    pub prediction_market_cost_per_call_usd: Decimal,

    pub dividend_source_api_key: Option<String>,
    pub dividend_source_daily_limit_usd: Decimal,
    pub dividend_source_cost_per_call_usd: Decimal,

    pub earnings_source_api_key: Option<String>,
    pub earnings_source_daily_limit_usd: Decimal,
    pub earnings_source_cost_per_call_usd: Decimal,

    pub external_call_timeout_secs: u64,
}

impl ExternalClientEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            ai_advisor_api_key: env::var("AI_ADVISOR_API_KEY").ok(),
            ai_advisor_base_url: env::var("AI_ADVISOR_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com/v1/messages".to_string()),
            ai_advisor_model: env::var("AI_ADVISOR_MODEL").unwrap_or_else(|_| "advisor-default".to_string()),
            ai_advisor_daily_limit_usd: var("AI_ADVISOR_DAILY_LIMIT_USD", Decimal::from(20))?,
            ai_advisor_cost_per_call_usd: var("AI_ADVISOR_COST_PER_CALL_USD", Decimal::new(5, 2))?,

            news_api_key: env::var("NEWS_API_KEY").ok(),
            news_daily_limit_usd: var("NEWS_DAILY_LIMIT_USD", Decimal::from(5))?,
            news_cost_per_call_usd: var("NEWS_COST_PER_CALL_USD", Decimal::new(1, 2))?,

            prediction_market_api_key: env::var("PREDICTION_MARKET_API_KEY").ok(),
            prediction_market_daily_limit_usd: var("PREDICTION_MARKET_DAILY_LIMIT_USD", Decimal::from(5))?,
            prediction_market_cost_per_call_usd: var("PREDICTION_MARKET_COST_PER_CALL_USD", Decimal::new(2, 2))?,

            dividend_source_api_key: env::var("DIVIDEND_SOURCE_API_KEY").ok(),
            dividend_source_daily_limit_usd: var("DIVIDEND_SOURCE_DAILY_LIMIT_USD", Decimal::from(2))?,
            dividend_source_cost_per_call_usd: var("DIVIDEND_SOURCE_COST_PER_CALL_USD", Decimal::new(1, 2))?,

            earnings_source_api_key: env::var("EARNINGS_SOURCE_API_KEY").ok(),
            earnings_source_daily_limit_usd: var("EARNINGS_SOURCE_DAILY_LIMIT_USD", Decimal::from(2))?,
            earnings_source_cost_per_call_usd: var("EARNINGS_SOURCE_COST_PER_CALL_USD", Decimal::new(1, 2))?,

            external_call_timeout_secs: var("EXTERNAL_CALL_TIMEOUT_SECS", 5u64)?,
        })
    }
}
