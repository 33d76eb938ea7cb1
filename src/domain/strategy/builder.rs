//! §4.9 Strategy Builder. Pure functions over an already-fetched option
//! chain: no broker or store access happens here, so every shape below is
//! exhaustively unit-testable against a hand-built chain fixture.

use super::sizing::size_position;
use crate::domain::config::{RiskConfig, StrategyConfig};
use crate::domain::types::{Action, OptionQuote, OptionRight, StrategyKind};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
pub struct ProposedLeg {
    pub con_id: i64,
    pub contract_symbol: String,
    pub action: Action,
    pub strike: Decimal,
    pub option_type: OptionRight,
    pub quantity: u32,
    pub limit_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct BuiltStrategy {
    pub symbol: String,
    pub kind: StrategyKind,
    pub expiration: NaiveDate,
    pub width: Decimal,
    /// Positive for a net credit, negative for a net debit.
    pub net_credit: Decimal,
    pub contracts: u32,
    pub score: f64,
    pub legs: Vec<ProposedLeg>,
}

fn dte(expiration: NaiveDate, today: NaiveDate) -> i64 {
    (expiration - today).num_days()
}

fn find<'a>(chain: &'a [OptionQuote], strike: Decimal, right: OptionRight, expiration: NaiveDate) -> Option<&'a OptionQuote> {
    chain.iter().find(|q| q.strike == strike && q.right == right && q.expiration == expiration)
}

fn leg_from_quote(symbol: &str, quote: &OptionQuote, action: Action, quantity: u32) -> ProposedLeg {
    ProposedLeg {
        con_id: quote.con_id,
        contract_symbol: symbol.to_string(),
        action,
        strike: quote.strike,
        option_type: quote.right,
        quantity,
        limit_price: quote.mid(),
    }
}

/// Iterates OTM short legs clearing DTE and delta bounds, pairs each with a
/// same-expiry long leg one `width` further out, and keeps the
/// highest-scoring (`credit * contracts`) candidate.
pub fn build_vertical_credit(
    symbol: &str,
    chain: &[OptionQuote],
    right: OptionRight,
    today: NaiveDate,
    available_funds: Decimal,
    risk_cfg: &RiskConfig,
    strategy_cfg: &StrategyConfig,
) -> Option<BuiltStrategy> {
    let kind = match right {
        OptionRight::Call => StrategyKind::VerticalCreditCall,
        OptionRight::Put => StrategyKind::VerticalCreditPut,
    };
    let width = strategy_cfg.default_width;

    let mut best: Option<BuiltStrategy> = None;
    for short in chain.iter().filter(|q| q.right == right) {
        let d = dte(short.expiration, today);
        if !(strategy_cfg.min_dte..=strategy_cfg.max_dte).contains(&d) {
            continue;
        }
        let abs_delta = short.delta.abs();
        if !(risk_cfg.credit_delta_min..=risk_cfg.credit_delta_max).contains(&abs_delta) {
            continue;
        }
        let long_strike = match right {
            OptionRight::Call => short.strike + width,
            OptionRight::Put => short.strike - width,
        };
        let Some(long) = find(chain, long_strike, right, short.expiration) else {
            continue;
        };
        let credit = short.mid() - long.mid();
        if credit <= Decimal::ZERO || credit >= width {
            continue;
        }
        let risk_per_contract = (width - credit) * dec!(100);
        let contracts = size_position(
            available_funds,
            risk_per_contract,
            width,
            risk_cfg.max_risk_per_trade,
            risk_cfg.max_allocation_percent,
        );
        if contracts == 0 {
            continue;
        }
        let score = (credit * Decimal::from(contracts)).to_f64().unwrap_or(0.0);
        if best.as_ref().map(|b| score > b.score).unwrap_or(true) {
            best = Some(BuiltStrategy {
                symbol: symbol.to_string(),
                kind,
                expiration: short.expiration,
                width,
                net_credit: credit,
                contracts,
                score,
                legs: vec![
                    leg_from_quote(symbol, short, Action::Sell, contracts),
                    leg_from_quote(symbol, long, Action::Buy, contracts),
                ],
            });
        }
    }
    best
}

/// Builds the call-side and put-side credit verticals independently and
/// combines them; both sides must share an expiration.
pub fn build_iron_condor(
    symbol: &str,
    chain: &[OptionQuote],
    today: NaiveDate,
    available_funds: Decimal,
    risk_cfg: &RiskConfig,
    strategy_cfg: &StrategyConfig,
) -> Option<BuiltStrategy> {
    let call_side = build_vertical_credit(symbol, chain, OptionRight::Call, today, available_funds, risk_cfg, strategy_cfg)?;
    let put_side = build_vertical_credit(symbol, chain, OptionRight::Put, today, available_funds, risk_cfg, strategy_cfg)?;
    if call_side.expiration != put_side.expiration {
        return None;
    }
    let contracts = call_side.contracts.min(put_side.contracts);
    if contracts == 0 {
        return None;
    }
    let total_credit = call_side.net_credit + put_side.net_credit;
    let mut legs = call_side.legs;
    legs.extend(put_side.legs);
    for leg in &mut legs {
        leg.quantity = contracts;
    }
    Some(BuiltStrategy {
        symbol: symbol.to_string(),
        kind: StrategyKind::IronCondor,
        expiration: call_side.expiration,
        width: call_side.width,
        net_credit: total_credit,
        contracts,
        score: total_credit.to_f64().unwrap_or(0.0) * contracts as f64,
        legs,
    })
}

/// ATM short straddle with protective wings at +/- width; credit is
/// estimated rather than summed from two independent verticals since the
/// straddle's two short legs do not pair against a matching long at width.
pub fn build_iron_butterfly(
    symbol: &str,
    chain: &[OptionQuote],
    price: Decimal,
    today: NaiveDate,
    available_funds: Decimal,
    risk_cfg: &RiskConfig,
    strategy_cfg: &StrategyConfig,
) -> Option<BuiltStrategy> {
    let width = strategy_cfg.default_width;
    let atm_strike = chain
        .iter()
        .filter(|q| q.right == OptionRight::Call)
        .min_by_key(|q| (q.strike - price).abs())?
        .strike;

    let short_call = chain.iter().find(|q| q.strike == atm_strike && q.right == OptionRight::Call)?;
    let short_put = chain.iter().find(|q| q.strike == atm_strike && q.right == OptionRight::Put && q.expiration == short_call.expiration)?;
    let expiration = short_call.expiration;

    let d = dte(expiration, today);
    if !(strategy_cfg.min_dte..=strategy_cfg.max_dte).contains(&d) {
        return None;
    }

    let long_call = find(chain, atm_strike + width, OptionRight::Call, expiration)?;
    let long_put = find(chain, atm_strike - width, OptionRight::Put, expiration)?;

    let credit_estimate = width * Decimal::from_f64_retain(strategy_cfg.iron_butterfly_credit_fraction).unwrap_or(dec!(0.40));
    let risk_per_contract = (width - credit_estimate) * dec!(100);
    let contracts = size_position(
        available_funds,
        risk_per_contract,
        width,
        risk_cfg.max_risk_per_trade,
        risk_cfg.max_allocation_percent,
    );
    if contracts == 0 {
        return None;
    }

    Some(BuiltStrategy {
        symbol: symbol.to_string(),
        kind: StrategyKind::IronButterfly,
        expiration,
        width,
        net_credit: credit_estimate,
        contracts,
        score: credit_estimate.to_f64().unwrap_or(0.0) * contracts as f64,
        legs: vec![
            leg_from_quote(symbol, short_call, Action::Sell, contracts),
            leg_from_quote(symbol, short_put, Action::Sell, contracts),
            leg_from_quote(symbol, long_call, Action::Buy, contracts),
            leg_from_quote(symbol, long_put, Action::Buy, contracts),
        ],
    })
}

/// Same strike across two expirations: sells the near-term leg, buys the
/// far-term leg, for a net debit.
pub fn build_calendar(
    symbol: &str,
    chain: &[OptionQuote],
    strike: Decimal,
    right: OptionRight,
    near_expiration: NaiveDate,
    far_expiration: NaiveDate,
    available_funds: Decimal,
    risk_cfg: &RiskConfig,
) -> Option<BuiltStrategy> {
    let near = find(chain, strike, right, near_expiration)?;
    let far = find(chain, strike, right, far_expiration)?;
    let debit = far.mid() - near.mid();
    if debit <= Decimal::ZERO {
        return None;
    }
    let risk_per_contract = debit * dec!(100);
    let contracts = size_position(
        available_funds,
        risk_per_contract,
        debit.max(dec!(1)),
        risk_cfg.max_risk_per_trade,
        risk_cfg.max_allocation_percent,
    );
    if contracts == 0 {
        return None;
    }
    Some(BuiltStrategy {
        symbol: symbol.to_string(),
        kind: StrategyKind::Calendar,
        expiration: far_expiration,
        width: Decimal::ZERO,
        net_credit: -debit,
        contracts,
        score: -debit.to_f64().unwrap_or(0.0) * contracts as f64,
        legs: vec![
            leg_from_quote(symbol, near, Action::Sell, contracts),
            leg_from_quote(symbol, far, Action::Buy, contracts),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::DataType;

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

    fn q(strike: Decimal, right: OptionRight, expiration: NaiveDate, bid: Decimal, ask: Decimal, delta: f64) -> OptionQuote {
        OptionQuote {
            con_id: 1,
            symbol: "SPY".into(),
            strike,
            right,
            expiration,
            bid,
            ask,
            last: (bid + ask) / dec!(2),
            volume: 500,
            open_interest: 2000,
            delta,
            gamma: 0.02,
            theta: 6.0,
            vega: 0.1,
            implied_vol: 0.2,
            vanna: Some(0.0),
            data_type: DataType::RealTime,
        }
    }

    fn credit_call_chain(expiration: NaiveDate) -> Vec<OptionQuote> {
        vec![
            q(dec!(455), OptionRight::Call, expiration, dec!(1.50), dec!(1.55), 0.22),
            q(dec!(460), OptionRight::Call, expiration, dec!(0.50), dec!(0.55), 0.12),
        ]
    }

    #[test]
    fn builds_a_valid_credit_call_spread() {
        let expiration = chrono::Utc::now().date_naive() + chrono::Duration::days(30);
        let today = chrono::Utc::now().date_naive();
        let chain = credit_call_chain(expiration);
        let built = build_vertical_credit("SPY", &chain, OptionRight::Call, today, dec!(75000), &risk_cfg(), &strategy_cfg());
        let built = built.expect("expected a valid credit spread");
        assert_eq!(built.kind, StrategyKind::VerticalCreditCall);
        assert!(built.net_credit > Decimal::ZERO);
        assert!(built.net_credit < built.width);
        assert_eq!(built.legs.len(), 2);
    }

    #[test]
    fn rejects_when_no_matching_long_strike_in_chain() {
        let expiration = chrono::Utc::now().date_naive() + chrono::Duration::days(30);
        let today = chrono::Utc::now().date_naive();
        let chain = vec![q(dec!(455), OptionRight::Call, expiration, dec!(1.50), dec!(1.55), 0.22)];
        assert!(build_vertical_credit("SPY", &chain, OptionRight::Call, today, dec!(75000), &risk_cfg(), &strategy_cfg()).is_none());
    }

    #[test]
    fn iron_condor_requires_matching_expirations_on_both_sides() {
        let expiration = chrono::Utc::now().date_naive() + chrono::Duration::days(30);
        let today = chrono::Utc::now().date_naive();
        let mut chain = credit_call_chain(expiration);
        chain.extend(vec![
            q(dec!(445), OptionRight::Put, expiration, dec!(1.50), dec!(1.55), -0.22),
            q(dec!(440), OptionRight::Put, expiration, dec!(0.50), dec!(0.55), -0.12),
        ]);
        let built = build_iron_condor("SPY", &chain, today, dec!(75000), &risk_cfg(), &strategy_cfg());
        let built = built.expect("expected iron condor");
        assert_eq!(built.legs.len(), 4);
        assert!(built.net_credit > Decimal::ZERO);
    }

    #[test]
    fn calendar_rejects_non_positive_debit() {
        let near = chrono::Utc::now().date_naive() + chrono::Duration::days(21);
        let far = chrono::Utc::now().date_naive() + chrono::Duration::days(45);
        let chain = vec![
            q(dec!(450), OptionRight::Call, near, dec!(2.00), dec!(2.10), 0.50),
            q(dec!(450), OptionRight::Call, far, dec!(1.00), dec!(1.10), 0.45),
        ];
        assert!(build_calendar("SPY", &chain, dec!(450), OptionRight::Call, near, far, dec!(75000), &risk_cfg()).is_none());
    }
}
