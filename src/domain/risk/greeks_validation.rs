//! Gates 6/7: Greeks validation. Credit strategies additionally clear a
//! daily-theta floor, a gamma ceiling, and the three-scenario Vanna stress
//! test; debit strategies only constrain delta range.

use crate::domain::config::RiskConfig;
use crate::domain::errors::RiskGateError;
use crate::domain::pricing::greeks::stress_is_safe;
use crate::domain::types::OptionQuote;

const VANNA_STRESS_MAX_ABS_DELTA: f64 = 0.40;

pub fn check_credit(quote: &OptionQuote, cfg: &RiskConfig) -> Result<(), RiskGateError> {
    let abs_delta = quote.delta.abs();
    if !(cfg.credit_delta_min..=cfg.credit_delta_max).contains(&abs_delta) {
        return Err(RiskGateError::GreeksValidation {
            reason: format!(
                "|delta| {abs_delta:.3} outside credit range [{:.3}, {:.3}]",
                cfg.credit_delta_min, cfg.credit_delta_max
            ),
        });
    }
    let daily_theta = rust_decimal::Decimal::try_from(quote.theta).unwrap_or_default();
    if daily_theta < cfg.min_daily_theta {
        return Err(RiskGateError::GreeksValidation {
            reason: format!("daily theta {daily_theta} below floor {}", cfg.min_daily_theta),
        });
    }
    if quote.gamma.abs() > cfg.max_gamma {
        return Err(RiskGateError::GreeksValidation {
            reason: format!("|gamma| {:.4} exceeds ceiling {:.4}", quote.gamma.abs(), cfg.max_gamma),
        });
    }
    let vanna = quote.vanna.unwrap_or(0.0);
    if !stress_is_safe(quote.delta, vanna, VANNA_STRESS_MAX_ABS_DELTA) {
        return Err(RiskGateError::GreeksValidation {
            reason: format!(
                "Vanna stress projects |delta| >= {VANNA_STRESS_MAX_ABS_DELTA:.2} in at least one of the three scenarios"
            ),
        });
    }
    Ok(())
}

pub fn check_debit(quote: &OptionQuote, cfg: &RiskConfig) -> Result<(), RiskGateError> {
    let abs_delta = quote.delta.abs();
    if !(cfg.debit_delta_min..=cfg.debit_delta_max).contains(&abs_delta) {
        return Err(RiskGateError::GreeksValidation {
            reason: format!(
                "|delta| {abs_delta:.3} outside debit range [{:.3}, {:.3}]",
                cfg.debit_delta_min, cfg.debit_delta_max
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{DataType, OptionRight};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn cfg() -> RiskConfig {
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
        .unwrap()
    }

    fn quote(delta: f64, theta: f64, gamma: f64, vanna: Option<f64>) -> OptionQuote {
        OptionQuote {
            con_id: 1,
            symbol: "SPY".into(),
            strike: dec!(455),
            right: OptionRight::Call,
            expiration: NaiveDate::from_ymd_opt(2026, 9, 18).unwrap(),
            bid: dec!(1.10),
            ask: dec!(1.15),
            last: dec!(1.12),
            volume: 500,
            open_interest: 1000,
            delta,
            gamma,
            theta,
            vega: 0.10,
            implied_vol: 0.20,
            vanna,
            data_type: DataType::RealTime,
        }
    }

    #[test]
    fn accepts_in_range_credit_greeks() {
        let q = quote(0.22, 6.0, 0.02, Some(0.1));
        assert!(check_credit(&q, &cfg()).is_ok());
    }

    #[test]
    fn rejects_delta_outside_credit_range() {
        let q = quote(0.50, 6.0, 0.02, Some(0.1));
        assert!(check_credit(&q, &cfg()).is_err());
    }

    #[test]
    fn rejects_theta_below_floor() {
        let q = quote(0.22, 2.0, 0.02, Some(0.1));
        assert!(check_credit(&q, &cfg()).is_err());
    }

    #[test]
    fn rejects_when_vanna_stress_breaches_040() {
        let q = quote(0.38, 6.0, 0.02, Some(2.0));
        assert!(check_credit(&q, &cfg()).is_err());
    }

    #[test]
    fn debit_gate_ignores_theta_and_vanna() {
        let q = quote(0.55, -10.0, 0.20, Some(99.0));
        assert!(check_debit(&q, &cfg()).is_ok());
    }
}
