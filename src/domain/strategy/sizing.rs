//! §4.9 position sizing: the last step of every builder function below.
//! `contracts = min(floor(max_risk_per_trade / risk_per_contract),
//! floor(max_position_value / (width*100)))`, with a one-contract floor
//! when the cap rounds to zero but the trade is itself affordable.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

/// `risk_per_contract` and `width` are both already in dollars-per-contract
/// terms (width is multiplied by 100 here, the options contract multiplier).
pub fn size_position(
    available_funds: Decimal,
    risk_per_contract: Decimal,
    width: Decimal,
    max_risk_per_trade: Decimal,
    max_allocation_percent: f64,
) -> u32 {
    if risk_per_contract <= Decimal::ZERO || width <= Decimal::ZERO {
        return 0;
    }
    let allocation_fraction = Decimal::from_f64_retain(max_allocation_percent / 100.0).unwrap_or(dec!(0));
    let max_position_value = available_funds * allocation_fraction;

    let cap_by_risk = (max_risk_per_trade / risk_per_contract).floor();
    let cap_by_value = (max_position_value / (width * dec!(100))).floor();
    let contracts = cap_by_risk.min(cap_by_value).to_u32().unwrap_or(0);

    if contracts == 0 && risk_per_contract <= max_risk_per_trade {
        1
    } else {
        contracts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_by_the_tighter_of_the_two_caps() {
        // risk cap: 500 / 150 = 3.xx -> 3 contracts
        // value cap: 75000*0.10 / (5*100) = 7500/500 = 15 contracts
        let contracts = size_position(dec!(75000), dec!(150), dec!(5), dec!(500), 10.0);
        assert_eq!(contracts, 3);
    }

    #[test]
    fn floors_to_one_contract_when_cap_rounds_to_zero_but_affordable() {
        // risk cap: 500/450 = 1.xx -> 1. value cap: 75000*0.001/(5*100)=0.15 -> 0
        let contracts = size_position(dec!(75000), dec!(450), dec!(5), dec!(500), 0.1);
        assert_eq!(contracts, 1);
    }

    #[test]
    fn zero_when_risk_per_contract_exceeds_max_risk() {
        let contracts = size_position(dec!(75000), dec!(600), dec!(5), dec!(500), 10.0);
        assert_eq!(contracts, 0);
    }

    #[test]
    fn zero_width_or_risk_is_rejected() {
        assert_eq!(size_position(dec!(75000), dec!(0), dec!(5), dec!(500), 10.0), 0);
        assert_eq!(size_position(dec!(75000), dec!(150), dec!(0), dec!(500), 10.0), 0);
    }
}
