//! Fixed-length feature vector extracted from SPY/VIX snapshots and
//! candidate telemetry, consumed by the pluggable regime classifier (§4.7).

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureVector {
    pub vix: f64,
    pub vix_vix3m_ratio: f64,
    pub iv_rank: f64,
    pub hv_percentile: f64,
    pub return_1d: f64,
    pub return_5d: f64,
    pub return_20d: f64,
    pub atr_pct: f64,
    pub bollinger_width: f64,
    pub volume_ratio: f64,
    pub vwap_deviation: f64,
    pub put_call_ratio: f64,
    pub advance_decline: f64,
    pub rsi_14: f64,
    pub macd_normalized: f64,
    pub price_above_sma50: bool,
}

impl FeatureVector {
    pub fn vix_decimal(&self) -> Decimal {
        Decimal::try_from(self.vix).unwrap_or(Decimal::ZERO)
    }
}

/// Computes the 20-day simple moving average, mirroring `ta`'s SMA helper.
pub fn sma(prices: &[Decimal], period: usize) -> Option<Decimal> {
    if prices.len() < period || period == 0 {
        return None;
    }
    let window = &prices[prices.len() - period..];
    let sum: Decimal = window.iter().copied().sum();
    Some(sum / Decimal::from(period))
}

/// `n`-day trailing return, expressed as a fraction (0.05 == +5%).
pub fn trailing_return(prices: &[Decimal], days: usize) -> Option<f64> {
    if prices.len() <= days {
        return None;
    }
    let last = prices.last().copied()?;
    let prior = prices[prices.len() - 1 - days];
    if prior.is_zero() {
        return None;
    }
    ((last - prior) / prior).to_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sma_needs_full_window() {
        let prices = vec![dec!(1), dec!(2), dec!(3)];
        assert_eq!(sma(&prices, 5), None);
        assert_eq!(sma(&prices, 3), Some(dec!(2)));
    }

    #[test]
    fn trailing_return_computes_fraction() {
        let prices = vec![dec!(100), dec!(100), dec!(100), dec!(105)];
        let r = trailing_return(&prices, 3).unwrap();
        assert!((r - 0.05).abs() < 1e-9);
    }
}
