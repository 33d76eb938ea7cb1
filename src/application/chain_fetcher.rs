//! Assembles the option-chain slice and underlying quote that the pure
//! `domain::strategy::builder` functions and the Screener (§4.8) need.
//!
//! `BrokerAdapter` (§4.4) only exposes single-contract `qualify`/
//! `snapshot_option`, plus `historical_bars` and a symbol-only `scan` — there
//! is no chain-listing or live-stock-quote call. This mirrors the real
//! gateway wire protocol: `qualify` takes an opaque contract description and
//! hands back a conId, so a full strike/expiration grid is built here by
//! constructing one contract-description string per leg and qualifying it
//! individually. Strikes that don't exist at the broker (most of the grid,
//! away from the money) qualify-fail and are skipped rather than treated as
//! an error.

use crate::domain::errors::BrokerError;
use crate::domain::ports::{BrokerAdapter, Candle};
use crate::domain::types::{OptionQuote, OptionRight};
use crate::infrastructure::historical_cache::HistoricalCache;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use tracing::{debug, warn};

const DAILY_WINDOW: &str = "1 day";

pub struct ChainFetcher {
    broker: Arc<dyn BrokerAdapter>,
    allow_delayed_data: bool,
    cache: Option<Arc<HistoricalCache>>,
}

impl ChainFetcher {
    pub fn new(broker: Arc<dyn BrokerAdapter>, allow_delayed_data: bool) -> Self {
        Self { broker, allow_delayed_data, cache: None }
    }

    pub fn with_cache(broker: Arc<dyn BrokerAdapter>, allow_delayed_data: bool, cache: Arc<HistoricalCache>) -> Self {
        Self { broker, allow_delayed_data, cache: Some(cache) }
    }

    /// Daily bars for `symbol`, served from the on-disk cache when it
    /// already covers the requested window and refreshed from the broker
    /// (then written back) otherwise. A cache read/write failure never
    /// fails the call — it just falls back to a live broker fetch.
    async fn daily_bars(&self, symbol: &str, lookback_days: u32) -> Result<Vec<Candle>, BrokerError> {
        let Some(cache) = &self.cache else {
            return self.broker.historical_bars(symbol, lookback_days, DAILY_WINDOW).await;
        };
        if let Ok(cached) = cache.load(symbol, DAILY_WINDOW).await
            && cached.len() as u32 >= lookback_days
        {
            return Ok(cached);
        }
        let bars = self.broker.historical_bars(symbol, lookback_days, DAILY_WINDOW).await?;
        if let Err(e) = cache.update(symbol, DAILY_WINDOW, &bars).await {
            warn!(symbol, error = %e, "failed to update historical cache");
        }
        Ok(bars)
    }

    /// Latest daily bar stands in for a live stock snapshot (no such port
    /// exists): `(close, volume)`.
    pub async fn underlying_quote(&self, symbol: &str) -> Result<(Decimal, u64), BrokerError> {
        let bars = self.daily_bars(symbol, 5).await?;
        let last = bars.last().ok_or_else(|| BrokerError::Protocol(format!("no historical bars for {symbol}")))?;
        Ok((last.close, last.volume))
    }

    pub async fn recent_closes(&self, symbol: &str, lookback_days: u32) -> Result<Vec<Decimal>, BrokerError> {
        let bars = self.daily_bars(symbol, lookback_days).await?;
        Ok(bars.iter().map(|c: &Candle| c.close).collect())
    }

    /// Builds a chain covering every Friday expiration in `[min_dte, max_dte]`
    /// and a strike ladder of `rungs` steps of `width` on either side of
    /// `price`, for both rights. Skips legs the broker won't qualify.
    pub async fn fetch_chain(
        &self,
        symbol: &str,
        price: Decimal,
        width: Decimal,
        today: NaiveDate,
        min_dte: i64,
        max_dte: i64,
        rungs: i64,
    ) -> Vec<OptionQuote> {
        let mut chain = Vec::new();
        for expiration in friday_expirations(today, min_dte, max_dte) {
            for rung in -rungs..=rungs {
                let strike = round_to_width(price + Decimal::from(rung) * width, width);
                for right in [OptionRight::Call, OptionRight::Put] {
                    match self.fetch_leg(symbol, strike, right, expiration).await {
                        Ok(quote) => chain.push(quote),
                        Err(e) => debug!(symbol, %strike, %right, %expiration, error = %e, "leg not qualified, skipping"),
                    }
                }
            }
        }
        chain
    }

    async fn fetch_leg(&self, symbol: &str, strike: Decimal, right: OptionRight, expiration: NaiveDate) -> Result<OptionQuote, BrokerError> {
        self.fetch_single_leg(symbol, strike, right, expiration).await
    }

    /// Qualifies and snapshots one specific leg. Used outside chain
    /// assembly by the Roll Manager, which needs a fresh quote at a
    /// strike/expiration that may not appear in the last scanned chain.
    pub async fn fetch_single_leg(&self, symbol: &str, strike: Decimal, right: OptionRight, expiration: NaiveDate) -> Result<OptionQuote, BrokerError> {
        let spec = option_contract_spec(symbol, expiration, strike, right);
        let con_id = self.broker.qualify(&spec).await?;
        self.broker.snapshot_option(con_id, self.allow_delayed_data).await
    }

    /// Re-snapshots an already-qualified contract by conId. Used by the
    /// Roll Manager's trigger check, which needs a leg's current delta but
    /// already has its conId from the open position.
    pub async fn fetch_single_leg_by_con_id(&self, con_id: i64) -> Result<OptionQuote, BrokerError> {
        self.broker.snapshot_option(con_id, self.allow_delayed_data).await
    }
}

/// Opaque contract-description string sent as `qualify`'s single field, e.g.
/// `SPY 20240315 455 C`.
fn option_contract_spec(symbol: &str, expiration: NaiveDate, strike: Decimal, right: OptionRight) -> String {
    format!("{symbol} {} {strike} {right}", expiration.format("%Y%m%d"))
}

fn round_to_width(value: Decimal, width: Decimal) -> Decimal {
    if width.is_zero() {
        return value;
    }
    let steps = (value / width).round();
    steps * width
}

/// Every Friday between `today + min_dte` and `today + max_dte`, inclusive.
fn friday_expirations(today: NaiveDate, min_dte: i64, max_dte: i64) -> Vec<NaiveDate> {
    let Some(start) = today.checked_add_days(Days::new(min_dte.max(0) as u64)) else {
        return Vec::new();
    };
    let Some(end) = today.checked_add_days(Days::new(max_dte.max(0) as u64)) else {
        return Vec::new();
    };
    let offset = (Weekday::Fri.num_days_from_monday() as i64 - start.weekday().num_days_from_monday() as i64).rem_euclid(7);
    let Some(mut d) = start.checked_add_days(Days::new(offset as u64)) else {
        return Vec::new();
    };
    let mut fridays = Vec::new();
    while d <= end {
        fridays.push(d);
        d = match d.checked_add_days(Days::new(7)) {
            Some(next) => next,
            None => break,
        };
    }
    fridays
}

/// Percentile rank (0-100) of the most recent realized-vol window within its
/// own trailing history — a proxy for IV rank, since the broker port exposes
/// no historical implied-vol series (only price candles).
pub fn realized_vol_rank(closes: &[Decimal], window: usize) -> f64 {
    if closes.len() < window * 2 {
        return 50.0;
    }
    let vols: Vec<f64> = closes.windows(window + 1).map(daily_stdev).collect();
    let Some(current) = vols.last().copied() else {
        return 50.0;
    };
    let below = vols.iter().filter(|&&v| v <= current).count();
    (below as f64 / vols.len() as f64) * 100.0
}

fn daily_stdev(prices: &[Decimal]) -> f64 {
    let returns: Vec<f64> = prices
        .windows(2)
        .filter_map(|w| {
            if w[0].is_zero() {
                None
            } else {
                ((w[1] - w[0]) / w[0]).to_f64()
            }
        })
        .collect();
    if returns.is_empty() {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn contract_spec_is_stable() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(option_contract_spec("SPY", d, dec!(455), OptionRight::Call), "SPY 20240315 455 C");
    }

    #[test]
    fn friday_expirations_stay_in_range_and_land_on_fridays() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(); // a Tuesday
        let fridays = friday_expirations(today, 20, 50);
        assert!(!fridays.is_empty());
        for f in &fridays {
            assert_eq!(f.weekday(), Weekday::Fri);
            let dte = (*f - today).num_days();
            assert!((20..=50).contains(&dte));
        }
    }

    #[test]
    fn round_to_width_snaps_to_nearest_step() {
        assert_eq!(round_to_width(dec!(452.30), dec!(5)), dec!(450));
        assert_eq!(round_to_width(dec!(458.00), dec!(5)), dec!(460));
    }

    #[test]
    fn realized_vol_rank_defaults_to_midpoint_on_short_history() {
        let closes = vec![dec!(100), dec!(101), dec!(102)];
        assert_eq!(realized_vol_rank(&closes, 20), 50.0);
    }
}
