//! Risk Configuration Domain Value Object
//!
//! Encapsulates every threshold consulted by the risk-gate chain (§4.10):
//! account sizing, VIX regime bands, Greeks limits, liquidity floors, exit
//! parameters and the safety switches. Fails fast on construction so a bad
//! environment variable surfaces with a precise message instead of a
//! generic "config invalid" at first use.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RiskConfigError {
    #[error("max_risk_per_trade ({risk}) exceeds account_size ({account})")]
    RiskExceedsAccount { risk: Decimal, account: Decimal },

    #[error("max_allocation_percent must be in (0, 100], got {0}")]
    AllocationOutOfRange(f64),

    #[error("VIX thresholds must be strictly ascending: elevated={elevated}, panic={panic}")]
    VixThresholdsNotAscending { elevated: Decimal, panic: Decimal },

    #[error("credit-spread delta range invalid: min={min} >= max={max}")]
    DeltaRangeInverted { min: f64, max: f64 },

    #[error("{field} must be > 0")]
    MustBePositive { field: String },

    #[error("{field} must be in [0, 1], got {value}")]
    NotAFraction { field: String, value: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    // Trading / sizing
    pub account_size: Decimal,
    pub max_risk_per_trade: Decimal,
    pub max_allocation_percent: f64,
    pub account_risk_pct: f64,

    // VIX regime bands
    pub vix_elevated_threshold: Decimal,
    pub vix_panic_threshold: Decimal,

    // Greeks (credit strategies)
    pub credit_delta_min: f64,
    pub credit_delta_max: f64,
    pub min_daily_theta: Decimal,
    pub max_gamma: f64,
    pub max_vega: f64,
    pub max_bw_delta: f64,

    // Greeks (debit strategies)
    pub debit_delta_min: f64,
    pub debit_delta_max: f64,

    // Liquidity
    pub max_bid_ask_spread: Decimal,
    pub min_volume_oi_ratio_pct: f64,

    // Exit
    pub take_profit_pct: f64,
    pub stop_loss_multiplier: f64,
    pub time_exit_dte: i64,

    // Safety
    pub paper_trading: bool,
    pub auto_execute: bool,
    pub allow_delayed_data: bool,
    pub earnings_blackout_hours: i64,
    pub dividend_blackout_days: i64,

    // Circuit breaker
    pub daily_max_loss_pct: f64,
    pub consecutive_loss_limit: usize,
    pub halt_duration_hours: i64,

    // Order lifecycle
    pub order_ttl_minutes: i64,
    pub max_open_unfilled_orders: usize,
}

impl RiskConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account_size: Decimal,
        max_risk_per_trade: Decimal,
        max_allocation_percent: f64,
        account_risk_pct: f64,
        vix_elevated_threshold: Decimal,
        vix_panic_threshold: Decimal,
        credit_delta_min: f64,
        credit_delta_max: f64,
        min_daily_theta: Decimal,
        max_gamma: f64,
        max_vega: f64,
        max_bw_delta: f64,
        debit_delta_min: f64,
        debit_delta_max: f64,
        max_bid_ask_spread: Decimal,
        min_volume_oi_ratio_pct: f64,
        take_profit_pct: f64,
        stop_loss_multiplier: f64,
        time_exit_dte: i64,
        paper_trading: bool,
        auto_execute: bool,
        allow_delayed_data: bool,
        earnings_blackout_hours: i64,
        dividend_blackout_days: i64,
        daily_max_loss_pct: f64,
        consecutive_loss_limit: usize,
        halt_duration_hours: i64,
        order_ttl_minutes: i64,
        max_open_unfilled_orders: usize,
    ) -> Result<Self, RiskConfigError> {
        let config = Self {
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
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), RiskConfigError> {
        if self.max_risk_per_trade > self.account_size {
            return Err(RiskConfigError::RiskExceedsAccount {
                risk: self.max_risk_per_trade,
                account: self.account_size,
            });
        }
        if self.max_allocation_percent <= 0.0 || self.max_allocation_percent > 100.0 {
            return Err(RiskConfigError::AllocationOutOfRange(
                self.max_allocation_percent,
            ));
        }
        if self.vix_elevated_threshold >= self.vix_panic_threshold {
            return Err(RiskConfigError::VixThresholdsNotAscending {
                elevated: self.vix_elevated_threshold,
                panic: self.vix_panic_threshold,
            });
        }
        if self.credit_delta_min >= self.credit_delta_max {
            return Err(RiskConfigError::DeltaRangeInverted {
                min: self.credit_delta_min,
                max: self.credit_delta_max,
            });
        }
        if self.debit_delta_min >= self.debit_delta_max {
            return Err(RiskConfigError::DeltaRangeInverted {
                min: self.debit_delta_min,
                max: self.debit_delta_max,
            });
        }
        if self.time_exit_dte <= 0 {
            return Err(RiskConfigError::MustBePositive {
                field: "time_exit_dte".to_string(),
            });
        }
        if self.consecutive_loss_limit == 0 {
            return Err(RiskConfigError::MustBePositive {
                field: "consecutive_loss_limit".to_string(),
            });
        }
        if self.order_ttl_minutes <= 0 {
            return Err(RiskConfigError::MustBePositive {
                field: "order_ttl_minutes".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.account_risk_pct) {
            return Err(RiskConfigError::NotAFraction {
                field: "account_risk_pct".to_string(),
                value: self.account_risk_pct,
            });
        }
        if !(0.0..=1.0).contains(&self.daily_max_loss_pct) {
            return Err(RiskConfigError::NotAFraction {
                field: "daily_max_loss_pct".to_string(),
                value: self.daily_max_loss_pct,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn valid() -> RiskConfig {
        RiskConfig::new(
            dec!(75000), dec!(500), 10.0, 0.02,
            dec!(20), dec!(30),
            0.15, 0.30, dec!(5), 0.05, 100.0, 50.0,
            0.40, 0.70,
            dec!(0.50), 10.0,
            0.50, 2.5, 21,
            true, false, false, 48, 3,
            5.0, 3, 24,
            30, 10,
        )
        .expect("valid risk config")
    }

    #[test]
    fn baseline_config_is_valid() {
        valid();
    }

    #[test]
    fn rejects_risk_exceeding_account() {
        let mut c = valid();
        c.max_risk_per_trade = c.account_size + rust_decimal_macros::dec!(1);
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_non_ascending_vix_thresholds() {
        let mut c = valid();
        c.vix_elevated_threshold = c.vix_panic_threshold;
        assert!(matches!(
            c.validate(),
            Err(RiskConfigError::VixThresholdsNotAscending { .. })
        ));
    }

    #[test]
    fn rejects_inverted_delta_range() {
        let mut c = valid();
        c.credit_delta_min = c.credit_delta_max;
        assert!(matches!(
            c.validate(),
            Err(RiskConfigError::DeltaRangeInverted { .. })
        ));
    }

    #[test]
    fn rejects_allocation_over_100() {
        let mut c = valid();
        c.max_allocation_percent = 150.0;
        assert!(matches!(
            c.validate(),
            Err(RiskConfigError::AllocationOutOfRange(_))
        ));
    }
}
