//! Gate 5: liquidity. Bid and ask must both be positive; the spread must
//! clear either an absolute or a relative ceiling; volume/OI must clear a
//! floor ratio.

use crate::domain::errors::RiskGateError;
use crate::domain::types::OptionQuote;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MAX_RELATIVE_SPREAD_PCT: Decimal = dec!(0.02);

pub fn check(quote: &OptionQuote, max_bid_ask_spread: Decimal, min_volume_oi_ratio_pct: f64) -> Result<(), RiskGateError> {
    if quote.bid <= Decimal::ZERO || quote.ask <= Decimal::ZERO {
        return Err(RiskGateError::Liquidity {
            symbol: quote.symbol.clone(),
            reason: format!("non-positive bid/ask: bid={} ask={}", quote.bid, quote.ask),
        });
    }

    let spread = quote.spread();
    let mid = quote.mid();
    let spread_pct = if mid.is_zero() { Decimal::MAX } else { spread / mid };
    if spread > max_bid_ask_spread && spread_pct > MAX_RELATIVE_SPREAD_PCT {
        return Err(RiskGateError::Liquidity {
            symbol: quote.symbol.clone(),
            reason: format!(
                "bid/ask spread {spread} exceeds max_bid_ask_spread {max_bid_ask_spread} and {:.2}% exceeds 2%",
                spread_pct * dec!(100)
            ),
        });
    }

    if quote.open_interest == 0 {
        return Err(RiskGateError::Liquidity {
            symbol: quote.symbol.clone(),
            reason: "zero open interest".to_string(),
        });
    }
    let ratio_pct = 100.0 * quote.volume as f64 / quote.open_interest as f64;
    if ratio_pct < min_volume_oi_ratio_pct {
        return Err(RiskGateError::Liquidity {
            symbol: quote.symbol.clone(),
            reason: format!(
                "volume/OI ratio {:.1}% below floor {:.1}%",
                ratio_pct, min_volume_oi_ratio_pct
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

    fn quote(bid: Decimal, ask: Decimal, volume: u64, oi: u64) -> OptionQuote {
        OptionQuote {
            con_id: 1,
            symbol: "SPY".into(),
            strike: dec!(455),
            right: OptionRight::Call,
            expiration: NaiveDate::from_ymd_opt(2026, 9, 18).unwrap(),
            bid,
            ask,
            last: (bid + ask) / dec!(2),
            volume,
            open_interest: oi,
            delta: 0.22,
            gamma: 0.02,
            theta: -0.05,
            vega: 0.10,
            implied_vol: 0.20,
            vanna: None,
            data_type: DataType::RealTime,
        }
    }

    #[test]
    fn rejects_zero_bid() {
        let q = quote(dec!(0), dec!(1.15), 500, 1000);
        assert!(check(&q, dec!(0.50), 10.0).is_err());
    }

    #[test]
    fn accepts_tight_spread_and_healthy_volume() {
        let q = quote(dec!(1.10), dec!(1.15), 500, 1000);
        assert!(check(&q, dec!(0.50), 10.0).is_ok());
    }

    #[test]
    fn rejects_wide_absolute_and_relative_spread() {
        let q = quote(dec!(1.00), dec!(5.00), 500, 1000);
        assert!(check(&q, dec!(0.50), 10.0).is_err());
    }

    #[test]
    fn wide_absolute_spread_passes_if_relative_spread_is_tight() {
        // 0.50 spread on a 100.00 mid is 0.5%, well under the 2% relative ceiling.
        let q = quote(dec!(99.75), dec!(100.25), 500, 1000);
        assert!(check(&q, dec!(0.10), 10.0).is_ok());
    }

    #[test]
    fn rejects_thin_volume_relative_to_open_interest() {
        let q = quote(dec!(1.10), dec!(1.15), 10, 1000);
        assert!(check(&q, dec!(0.50), 10.0).is_err());
    }
}
