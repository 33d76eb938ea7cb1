//! Risk, Greeks, liquidity, exit and circuit-breaker thresholds (§4.2),
//! parsed from the environment and composed into the validated
//! `domain::config::RiskConfig`.

use crate::domain::config::RiskConfig;
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

pub struct RiskEnvConfig;

impl RiskEnvConfig {
    pub fn from_env() -> Result<RiskConfig> {
        let account_size = var("ACCOUNT_SIZE", Decimal::from(75_000))?;
        let max_risk_per_trade = var("MAX_RISK_PER_TRADE", Decimal::from(500))?;
        let max_allocation_percent = var("MAX_ALLOCATION_PERCENT", 10.0)?;
        let account_risk_pct = var("ACCOUNT_RISK_PCT", 0.02)?;

        let vix_elevated_threshold = var("VIX_ELEVATED_THRESHOLD", Decimal::from(20))?;
        let vix_panic_threshold = var("VIX_PANIC_THRESHOLD", Decimal::from(30))?;

        let credit_delta_min = var("CREDIT_DELTA_MIN", 0.15)?;
        let credit_delta_max = var("CREDIT_DELTA_MAX", 0.30)?;
        let min_daily_theta = var("MIN_DAILY_THETA", Decimal::from(5))?;
        let max_gamma = var("MAX_GAMMA", 0.05)?;
        let max_vega = var("MAX_VEGA", 100.0)?;
        let max_bw_delta = var("MAX_BW_DELTA", 50.0)?;

        let debit_delta_min = var("DEBIT_DELTA_MIN", 0.40)?;
        let debit_delta_max = var("DEBIT_DELTA_MAX", 0.70)?;

        let max_bid_ask_spread = var("MAX_BID_ASK_SPREAD", Decimal::new(50, 2))?;
        let min_volume_oi_ratio_pct = var("MIN_VOLUME_OI_RATIO_PCT", 10.0)?;

        let take_profit_pct = var("TAKE_PROFIT_PCT", 0.50)?;
        let stop_loss_multiplier = var("STOP_LOSS_MULTIPLIER", 2.5)?;
        let time_exit_dte = var("TIME_EXIT_DTE", 21)?;

        let paper_trading = var("PAPER_TRADING", true)?;
        let auto_execute = var("AUTO_EXECUTE", false)?;
        let allow_delayed_data = var("ALLOW_DELAYED_DATA", false)?;
        let earnings_blackout_hours = var("EARNINGS_BLACKOUT_HOURS", 48)?;
        let dividend_blackout_days = var("DIVIDEND_BLACKOUT_DAYS", 3)?;

        let daily_max_loss_pct = var("DAILY_MAX_LOSS_PCT", 0.05)?;
        let consecutive_loss_limit = var("CONSECUTIVE_LOSS_LIMIT", 3usize)?;
        let halt_duration_hours = var("HALT_DURATION_HOURS", 24)?;

        let order_ttl_minutes = var("ORDER_TTL_MINUTES", 30)?;
        let max_open_unfilled_orders = var("MAX_OPEN_UNFILLED_ORDERS", 10usize)?;

        RiskConfig::new(
            account_size,
            max_risk_per_trade,
            max_allocation_percent,
            account_risk_pct,
            vix_elevated_threshold,
            vix_panic_threshold,
            credit_delta_min,
            credit_delta_max,
            min_daily_theta,
            max_gamma,
            max_vega,
            max_bw_delta,
            debit_delta_min,
            debit_delta_max,
            max_bid_ask_spread,
            min_volume_oi_ratio_pct,
            take_profit_pct,
            stop_loss_multiplier,
            time_exit_dte,
            paper_trading,
            auto_execute,
            allow_delayed_data,
            earnings_blackout_hours,
            dividend_blackout_days,
            daily_max_loss_pct,
            consecutive_loss_limit,
            halt_duration_hours,
            order_ttl_minutes,
            max_open_unfilled_orders,
        )
        .context("RISK_CONFIG validation failed")
    }
}
