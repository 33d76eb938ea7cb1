//! Strategy-construction, screener and external-client parameters (§4.8,
//! §4.9, §4.2) parsed from the environment.

use crate::domain::config::StrategyConfig;
use anyhow::{Context, Result};
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
pub struct TradingEnvConfig {
    pub min_scan_price: Decimal,
    pub max_scan_price: Decimal,
    pub screener_candidate_limit: usize,
    pub ai_decision_confidence_floor: u8,
    pub ai_exit_trigger_pl_ratio: f64,
    pub cleanup_interval_minutes: i64,
    pub database_url: String,
    pub historical_cache_dir: String,
}

impl TradingEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            min_scan_price: var("MIN_SCAN_PRICE", Decimal::from(20))?,
            max_scan_price: var("MAX_SCAN_PRICE", Decimal::from(600))?,
            screener_candidate_limit: var("SCREENER_CANDIDATE_LIMIT", 50usize)?,
            ai_decision_confidence_floor: var("AI_DECISION_CONFIDENCE_FLOOR", 6u8)?,
            ai_exit_trigger_pl_ratio: var("AI_EXIT_TRIGGER_PL_RATIO", 0.60)?,
            cleanup_interval_minutes: var("CLEANUP_INTERVAL_MINUTES", 15)?,
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/rustrade.db".to_string()),
            historical_cache_dir: env::var("HISTORICAL_CACHE_DIR").unwrap_or_else(|_| "data/historical".to_string()),
        })
    }

    pub fn strategy_config(&self) -> Result<StrategyConfig> {
        let min_dte = var("MIN_DTE", 25)?;
        let max_dte = var("MAX_DTE", 45)?;
        let default_width = var("DEFAULT_SPREAD_WIDTH", Decimal::from(5))?;
        let iron_butterfly_credit_fraction = var("IRON_BUTTERFLY_CREDIT_FRACTION", 0.40)?;
        let roll_forward_days = var("ROLL_FORWARD_DAYS", 30)?;
        let roll_fill_timeout_secs = var("ROLL_FILL_TIMEOUT_SECS", 30u64)?;
        let roll_max_debit = var("ROLL_MAX_DEBIT", Decimal::new(5, 2))?;
        StrategyConfig::new(
            min_dte,
            max_dte,
            default_width,
            iron_butterfly_credit_fraction,
            roll_forward_days,
            roll_fill_timeout_secs,
            roll_max_debit,
        )
        .context("STRATEGY_CONFIG validation failed")
    }
}
