//! Gate 9: AI sanity check. Every strike an advisor recommends must be
//! grounded in the observed chain — this is the gate that catches a
//! hallucinated strike (§8 scenario 2) before an order is ever built.

use crate::domain::config::{RiskConfig, StrategyConfig};
use crate::domain::errors::RiskGateError;
use crate::domain::ports::AdvisorResponse;
use crate::domain::types::{OptionQuote, StrategyKind};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MAX_STRIKE_DEVIATION_PCT: Decimal = dec!(0.20);
const MIN_WIDTH: Decimal = dec!(1.0);

fn find_quote<'a>(chain: &'a [OptionQuote], strike: Decimal, expiration: NaiveDate) -> Option<&'a OptionQuote> {
    chain.iter().find(|q| q.strike == strike && q.expiration == expiration)
}

pub fn check(
    response: &AdvisorResponse,
    chain: &[OptionQuote],
    price: Decimal,
    strategy: StrategyKind,
    risk_cfg: &RiskConfig,
    strategy_cfg: &StrategyConfig,
    today: NaiveDate,
) -> Result<(), RiskGateError> {
    let (Some(short_strike), Some(long_strike), Some(expiration)) =
        (response.short_strike, response.long_strike, response.expiration)
    else {
        return Err(RiskGateError::SanityCheck {
            reason: "advisor response missing short_strike/long_strike/expiration".to_string(),
        });
    };

    let short_quote = find_quote(chain, short_strike, expiration).ok_or_else(|| RiskGateError::SanityCheck {
        reason: format!("strike {short_strike} NOT FOUND in option chain"),
    })?;
    let _long_quote = find_quote(chain, long_strike, expiration).ok_or_else(|| RiskGateError::SanityCheck {
        reason: format!("strike {long_strike} NOT FOUND in option chain"),
    })?;

    let deviation = if price.is_zero() { Decimal::MAX } else { (short_strike - price).abs() / price };
    if deviation > MAX_STRIKE_DEVIATION_PCT {
        return Err(RiskGateError::SanityCheck {
            reason: format!("short strike {short_strike} deviates {:.1}% from spot {price}, exceeds 20%", deviation * dec!(100)),
        });
    }

    let ordering_ok = match strategy {
        StrategyKind::VerticalCreditCall | StrategyKind::VerticalDebitPut => short_strike < long_strike,
        StrategyKind::VerticalCreditPut | StrategyKind::VerticalDebitCall => short_strike > long_strike,
        _ => true,
    };
    if !ordering_ok {
        return Err(RiskGateError::SanityCheck {
            reason: format!("strike ordering invalid for {strategy}: short={short_strike} long={long_strike}"),
        });
    }

    let dte = (expiration - today).num_days();
    if !(strategy_cfg.min_dte..=strategy_cfg.max_dte).contains(&dte) {
        return Err(RiskGateError::SanityCheck {
            reason: format!("DTE {dte} outside configured range [{}, {}]", strategy_cfg.min_dte, strategy_cfg.max_dte),
        });
    }

    let width = (short_strike - long_strike).abs();
    if width < MIN_WIDTH {
        return Err(RiskGateError::SanityCheck {
            reason: format!("spread width {width} below minimum {MIN_WIDTH}"),
        });
    }

    let is_credit = strategy.is_credit();
    let (delta_min, delta_max) = if is_credit {
        (risk_cfg.credit_delta_min, risk_cfg.credit_delta_max)
    } else {
        (risk_cfg.debit_delta_min, risk_cfg.debit_delta_max)
    };
    let abs_delta = short_quote.delta.abs();
    if !(delta_min..=delta_max).contains(&abs_delta) {
        return Err(RiskGateError::SanityCheck {
            reason: format!("|delta| {abs_delta:.3} outside range [{delta_min:.3}, {delta_max:.3}]"),
        });
    }

    if short_quote.vega.abs() > risk_cfg.max_vega {
        return Err(RiskGateError::SanityCheck {
            reason: format!("|vega| {:.3} exceeds ceiling {:.3}", short_quote.vega.abs(), risk_cfg.max_vega),
        });
    }

    if is_credit && short_quote.theta <= 0.0 {
        return Err(RiskGateError::SanityCheck {
            reason: format!("theta {} must be positive for a short-premium strategy", short_quote.theta),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{AdvisorVerdict, DataType, OptionRight};
    use rust_decimal_macros::dec;

    fn chain() -> Vec<OptionQuote> {
        let expiration = NaiveDate::from_ymd_opt(2026, 8, 31).unwrap();
        [dec!(445), dec!(450), dec!(455), dec!(460)]
            .into_iter()
            .map(|strike| OptionQuote {
                con_id: strike.to_string().parse().unwrap_or(1),
                symbol: "SPY".into(),
                strike,
                right: OptionRight::Call,
                expiration,
                bid: dec!(1.0),
                ask: dec!(1.1),
                last: dec!(1.05),
                volume: 500,
                open_interest: 1000,
                delta: 0.22,
                gamma: 0.02,
                theta: 6.0,
                vega: 0.1,
                implied_vol: 0.2,
                vanna: Some(0.1),
                data_type: DataType::RealTime,
            })
            .collect()
    }

    fn risk_cfg() -> RiskConfig {
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

    fn strategy_cfg() -> StrategyConfig {
        StrategyConfig::new(21, 45, dec!(5), 0.40, 30, 30, dec!(0.05)).unwrap()
    }

    fn response(short: Decimal, long: Decimal) -> AdvisorResponse {
        AdvisorResponse {
            verdict: AdvisorVerdict::Approve,
            confidence_score: 8,
            strategy: Some("VERTICAL_CREDIT_CALL".into()),
            short_strike: Some(short),
            long_strike: Some(long),
            expiration: Some(NaiveDate::from_ymd_opt(2026, 8, 31).unwrap()),
            limit_price: None,
            take_profit: None,
            stop_loss: None,
            reasoning: "test".into(),
        }
    }

    #[test]
    fn accepts_valid_credit_call_spread() {
        let today = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let r = response(dec!(455), dec!(460));
        assert!(check(&r, &chain(), dec!(450), StrategyKind::VerticalCreditCall, &risk_cfg(), &strategy_cfg(), today).is_ok());
    }

    #[test]
    fn rejects_hallucinated_strike() {
        let today = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let r = response(dec!(500), dec!(510));
        let err = check(&r, &chain(), dec!(450), StrategyKind::VerticalCreditCall, &risk_cfg(), &strategy_cfg(), today).unwrap_err();
        assert!(err.to_string().contains("NOT FOUND"));
    }

    #[test]
    fn rejects_inverted_ordering_for_credit_call() {
        let today = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let r = response(dec!(460), dec!(455));
        assert!(check(&r, &chain(), dec!(450), StrategyKind::VerticalCreditCall, &risk_cfg(), &strategy_cfg(), today).is_err());
    }
}
