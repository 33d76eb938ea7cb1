//! §4.10 gate 8 input: portfolio beta-weighted delta (BWD). The pure
//! threshold check lives in `domain::risk::portfolio_exposure`; this
//! assembles `current_bwd` from the store's open positions and a fresh
//! broker delta per leg, and `proposed_bwd_contribution` for a candidate
//! not yet submitted.

use crate::application::chain_fetcher::ChainFetcher;
use crate::domain::ports::{BrokerAdapter, Store};
use crate::domain::strategy::ProposedLeg;
use crate::domain::types::{Action, OptionQuote};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const BETA_FALLBACK: f64 = 1.0;
const COVARIANCE_LOOKBACK_DAYS: u32 = 252;
const SPY_SYMBOL: &str = "SPY";

pub struct PortfolioExposureTracker {
    broker: Arc<dyn BrokerAdapter>,
    store: Arc<dyn Store>,
    chain_fetcher: Arc<ChainFetcher>,
    allow_delayed_data: bool,
}

impl PortfolioExposureTracker {
    pub fn new(broker: Arc<dyn BrokerAdapter>, store: Arc<dyn Store>, chain_fetcher: Arc<ChainFetcher>, allow_delayed_data: bool) -> Self {
        Self { broker, store, chain_fetcher, allow_delayed_data }
    }

    /// Sum of `beta(symbol) * position.signed_delta(..)` across every OPEN
    /// position, refreshing each leg's delta via one snapshot call.
    pub async fn current_bwd(&self) -> f64 {
        let positions = match self.store.open_positions().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to read open positions for BWD, treating portfolio as flat");
                return 0.0;
            }
        };

        let mut total = 0.0;
        for position in &positions {
            let mut leg_deltas: HashMap<i64, f64> = HashMap::new();
            for leg in &position.legs {
                match self.broker.snapshot_option(leg.con_id, self.allow_delayed_data).await {
                    Ok(q) => {
                        leg_deltas.insert(leg.con_id, q.delta);
                    }
                    Err(e) => debug!(con_id = leg.con_id, error = %e, "leg snapshot unavailable for BWD, treating delta as 0"),
                }
            }
            let beta = self.beta(&position.symbol).await;
            total += beta * position.signed_delta(&leg_deltas);
        }
        total
    }

    /// This candidate's BWD contribution if accepted.
    pub async fn proposed_contribution(&self, symbol: &str, chain: &[OptionQuote], legs: &[ProposedLeg]) -> f64 {
        let beta = self.beta(symbol).await;
        let raw: f64 = legs
            .iter()
            .map(|leg| {
                let delta = chain.iter().find(|q| q.con_id == leg.con_id).map(|q| q.delta).unwrap_or(0.0);
                let signed = match leg.action {
                    Action::Buy => delta,
                    Action::Sell => -delta,
                };
                signed * leg.quantity as f64
            })
            .sum();
        beta * raw
    }

    /// §4.10 gate 8: broker fundamentals first, then 252-day covariance of
    /// daily returns against SPY, then the static 1.0 fallback.
    async fn beta(&self, symbol: &str) -> f64 {
        if symbol == SPY_SYMBOL {
            return 1.0;
        }
        if let Ok(xml) = self.broker.fundamental_xml(symbol, "ReportSnapshot").await {
            if let Some(beta) = extract_beta(&xml) {
                return beta;
            }
        }
        match self.covariance_beta(symbol).await {
            Some(beta) => beta,
            None => BETA_FALLBACK,
        }
    }

    async fn covariance_beta(&self, symbol: &str) -> Option<f64> {
        let closes = self.chain_fetcher.recent_closes(symbol, COVARIANCE_LOOKBACK_DAYS).await.ok()?;
        let spy_closes = self.chain_fetcher.recent_closes(SPY_SYMBOL, COVARIANCE_LOOKBACK_DAYS).await.ok()?;
        let returns = daily_returns(&closes);
        let spy_returns = daily_returns(&spy_closes);
        let n = returns.len().min(spy_returns.len());
        if n < 30 {
            return None;
        }
        let x = &returns[returns.len() - n..];
        let y = &spy_returns[spy_returns.len() - n..];

        let mean_x = x.to_vec().mean();
        let mean_y = y.to_vec().mean();
        let cov: f64 = x.iter().zip(y.iter()).map(|(a, b)| (a - mean_x) * (b - mean_y)).sum::<f64>() / n as f64;
        let var_y = y.to_vec().variance();
        if var_y.abs() < f64::EPSILON {
            return None;
        }
        Some(cov / var_y)
    }
}

fn daily_returns(closes: &[rust_decimal::Decimal]) -> Vec<f64> {
    use rust_decimal::prelude::ToPrimitive;
    closes
        .windows(2)
        .filter_map(|w| if w[0].is_zero() { None } else { ((w[1] - w[0]) / w[0]).to_f64() })
        .collect()
}

fn extract_beta(xml: &str) -> Option<f64> {
    let open = "<Beta>";
    let close = "</Beta>";
    let start = xml.find(open)? + open.len();
    let end = xml[start..].find(close)? + start;
    xml[start..end].trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_beta_parses_tag_value() {
        assert_eq!(extract_beta("<ReportSnapshot><Beta>1.15</Beta></ReportSnapshot>"), Some(1.15));
    }

    #[test]
    fn extract_beta_missing_returns_none() {
        assert_eq!(extract_beta("<ReportSnapshot></ReportSnapshot>"), None);
    }

    #[test]
    fn daily_returns_computes_fractional_change() {
        let closes = vec![rust_decimal_macros::dec!(100), rust_decimal_macros::dec!(105)];
        let r = daily_returns(&closes);
        assert_eq!(r.len(), 1);
        assert!((r[0] - 0.05).abs() < 1e-9);
    }
}
