//! Quote sanity checks shared by the Screener (§4.8) and the AI Sanity
//! Check gate (§4.10.9): both need the same "is this quote usable at all"
//! predicate before doing anything strategy-specific with it.

use crate::domain::errors::BrokerError;
use crate::domain::types::{DataType, OptionQuote};
use rust_decimal::Decimal;

/// §4.4/§4.10: a quote whose `data_type` is delayed must never feed a
/// trading decision unless the operator has explicitly opted in.
pub fn enforce_data_policy(symbol: &str, data_type: DataType, allow_delayed_data: bool) -> Result<(), BrokerError> {
    if data_type.is_delayed() && !allow_delayed_data {
        return Err(BrokerError::DelayedData {
            symbol: symbol.to_string(),
            data_type,
        });
    }
    Ok(())
}

/// Structurally sane bid/ask/last: non-negative, bid <= ask, last within
/// [bid, ask] when all three are present and positive. A quote that fails
/// this is a broker data glitch, not a liquidity judgement — callers should
/// drop the candidate rather than route it through the liquidity gate.
pub fn quote_is_sane(quote: &OptionQuote) -> bool {
    if quote.bid < Decimal::ZERO || quote.ask < Decimal::ZERO || quote.last < Decimal::ZERO {
        return false;
    }
    if quote.bid > Decimal::ZERO && quote.ask > Decimal::ZERO && quote.bid > quote.ask {
        return false;
    }
    true
}

/// `price_in_band`: used by the Screener's scanner filter (§4.8) to keep
/// only underlyings priced within the scan's configured band.
pub fn price_in_band(price: Decimal, min_price: Decimal, max_price: Decimal) -> bool {
    price >= min_price && price <= max_price
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn quote(bid: Decimal, ask: Decimal, last: Decimal, data_type: DataType) -> OptionQuote {
        OptionQuote {
            con_id: 1,
            symbol: "SPY".into(),
            strike: dec!(455),
            right: crate::domain::types::OptionRight::Call,
            expiration: NaiveDate::from_ymd_opt(2026, 9, 18).unwrap(),
            bid,
            ask,
            last,
            volume: 500,
            open_interest: 1000,
            delta: 0.22,
            gamma: 0.02,
            theta: -0.05,
            vega: 0.10,
            implied_vol: 0.20,
            vanna: None,
            data_type,
        }
    }

    #[test]
    fn rejects_delayed_quote_when_not_allowed() {
        let err = enforce_data_policy("AAPL", DataType::Delayed, false).unwrap_err();
        assert!(matches!(err, BrokerError::DelayedData { .. }));
    }

    #[test]
    fn accepts_delayed_quote_when_allowed() {
        assert!(enforce_data_policy("AAPL", DataType::Delayed, true).is_ok());
    }

    #[test]
    fn accepts_real_time_regardless_of_flag() {
        assert!(enforce_data_policy("AAPL", DataType::RealTime, false).is_ok());
    }

    #[test]
    fn rejects_inverted_bid_ask() {
        let q = quote(dec!(2.00), dec!(1.00), dec!(1.50), DataType::RealTime);
        assert!(!quote_is_sane(&q));
    }

    #[test]
    fn accepts_well_formed_quote() {
        let q = quote(dec!(1.10), dec!(1.15), dec!(1.12), DataType::RealTime);
        assert!(quote_is_sane(&q));
    }

    #[test]
    fn price_band_is_inclusive() {
        assert!(price_in_band(dec!(50), dec!(50), dec!(500)));
        assert!(!price_in_band(dec!(501), dec!(50), dec!(500)));
    }
}
