//! Strategy Configuration Domain Value Object
//!
//! Parameters the Strategy Builder (§4.9) and Roll Manager (§4.13) consult
//! when constructing candidate structures from an option chain.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StrategyConfigError {
    #[error("min_dte ({min}) must be < max_dte ({max})")]
    DteRangeInverted { min: i64, max: i64 },

    #[error("{field} must be > 0, got {value}")]
    MustBePositive { field: String, value: f64 },

    #[error("iron_butterfly_credit_fraction must be in (0, 1], got {0}")]
    CreditFractionOutOfRange(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyConfig {
    pub min_dte: i64,
    pub max_dte: i64,
    pub default_width: rust_decimal::Decimal,
    /// Fraction of wing width booked as the iron-butterfly credit estimate.
    pub iron_butterfly_credit_fraction: f64,
    /// Days a roll pushes expiration forward (to the next monthly).
    pub roll_forward_days: i64,
    /// Seconds the Roll Manager waits for the 4-leg BAG to fill.
    pub roll_fill_timeout_secs: u64,
    /// Max acceptable net debit on a roll before it is abandoned.
    pub roll_max_debit: rust_decimal::Decimal,
}

impl StrategyConfig {
    pub fn new(
        min_dte: i64,
        max_dte: i64,
        default_width: rust_decimal::Decimal,
        iron_butterfly_credit_fraction: f64,
        roll_forward_days: i64,
        roll_fill_timeout_secs: u64,
        roll_max_debit: rust_decimal::Decimal,
    ) -> Result<Self, StrategyConfigError> {
        let config = Self {
            min_dte,
            max_dte,
            default_width,
            iron_butterfly_credit_fraction,
            roll_forward_days,
            roll_fill_timeout_secs,
            roll_max_debit,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), StrategyConfigError> {
        if self.min_dte >= self.max_dte {
            return Err(StrategyConfigError::DteRangeInverted {
                min: self.min_dte,
                max: self.max_dte,
            });
        }
        if self.default_width <= rust_decimal::Decimal::ZERO {
            return Err(StrategyConfigError::MustBePositive {
                field: "default_width".to_string(),
                value: 0.0,
            });
        }
        if !(0.0..=1.0).contains(&self.iron_butterfly_credit_fraction)
            || self.iron_butterfly_credit_fraction == 0.0
        {
            return Err(StrategyConfigError::CreditFractionOutOfRange(
                self.iron_butterfly_credit_fraction,
            ));
        }
        if self.roll_forward_days <= 0 {
            return Err(StrategyConfigError::MustBePositive {
                field: "roll_forward_days".to_string(),
                value: self.roll_forward_days as f64,
            });
        }
        Ok(())
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_dte: 25,
            max_dte: 45,
            default_width: rust_decimal::Decimal::from(5),
            iron_butterfly_credit_fraction: 0.40,
            roll_forward_days: 30,
            roll_fill_timeout_secs: 30,
            roll_max_debit: rust_decimal::Decimal::new(5, 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        StrategyConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_inverted_dte_range() {
        let mut c = StrategyConfig::default();
        c.min_dte = 50;
        c.max_dte = 30;
        assert!(matches!(
            c.validate(),
            Err(StrategyConfigError::DteRangeInverted { .. })
        ));
    }

    #[test]
    fn rejects_zero_credit_fraction() {
        let mut c = StrategyConfig::default();
        c.iron_butterfly_credit_fraction = 0.0;
        assert!(c.validate().is_err());
    }
}
