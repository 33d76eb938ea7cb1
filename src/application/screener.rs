//! §4.8 Screener: broker-native scan, brief per-candidate market-data look,
//! score, rank.

use crate::application::chain_fetcher::{realized_vol_rank, ChainFetcher};
use crate::domain::ports::BrokerAdapter;
use crate::domain::types::Candidate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use tracing::{debug, warn};

const SCAN_CODE: &str = "HIGH_OPT_IMP_VOLAT";
const IV_RANK_LOOKBACK_DAYS: u32 = 120;
const REALIZED_VOL_WINDOW: usize = 20;
const VOLUME_BAND_CEILING: f64 = 2_000_000.0;

pub struct Screener {
    broker: Arc<dyn BrokerAdapter>,
    chain_fetcher: Arc<ChainFetcher>,
    min_price: Decimal,
    max_price: Decimal,
    candidate_limit: usize,
}

impl Screener {
    pub fn new(broker: Arc<dyn BrokerAdapter>, chain_fetcher: Arc<ChainFetcher>, min_price: Decimal, max_price: Decimal, candidate_limit: usize) -> Self {
        Self {
            broker,
            chain_fetcher,
            min_price,
            max_price,
            candidate_limit,
        }
    }

    /// Scans, composes a `Candidate` per symbol, scores, and returns the top
    /// `candidate_limit` sorted by descending score.
    pub async fn scan(&self) -> Vec<Candidate> {
        let symbols = match self.broker.scan(SCAN_CODE, self.min_price, self.max_price).await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(error = %e, "screener scan failed");
                return Vec::new();
            }
        };

        let mut candidates = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.compose_candidate(&symbol).await {
                Ok(c) => candidates.push(c),
                Err(e) => debug!(symbol, error = %e, "skipping candidate, market data unavailable"),
            }
        }

        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(self.candidate_limit);
        candidates
    }

    async fn compose_candidate(&self, symbol: &str) -> Result<Candidate, crate::domain::errors::BrokerError> {
        let (price, volume) = self.chain_fetcher.underlying_quote(symbol).await?;
        let closes = self.chain_fetcher.recent_closes(symbol, IV_RANK_LOOKBACK_DAYS).await.unwrap_or_default();
        let iv_rank = realized_vol_rank(&closes, REALIZED_VOL_WINDOW);
        let sector = self.sector(symbol).await;
        let score = Self::score(iv_rank, price, volume);

        Ok(Candidate {
            symbol: symbol.to_string(),
            price,
            iv_rank,
            volume,
            sector,
            score,
        })
    }

    async fn sector(&self, symbol: &str) -> String {
        match self.broker.fundamental_xml(symbol, "ReportSnapshot").await {
            Ok(xml) => extract_tag(&xml, "Sector").unwrap_or_else(|| "Unknown".to_string()),
            Err(e) => {
                debug!(symbol, error = %e, "fundamental data unavailable, sector left unknown");
                "Unknown".to_string()
            }
        }
    }

    /// score = IV-rank·0.5 + mid-price-band·25 + volume-band·25.
    fn score(iv_rank: f64, price: Decimal, volume: u64) -> f64 {
        let mid_price_band = 1.0 - (price.to_f64().unwrap_or(0.0) - 200.0).abs() / 200.0;
        let mid_price_band = mid_price_band.clamp(0.0, 1.0);
        let volume_band = (volume as f64 / VOLUME_BAND_CEILING).clamp(0.0, 1.0);
        iv_rank * 0.5 + mid_price_band * 25.0 + volume_band * 25.0
    }
}

fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_tag_finds_nested_value() {
        let xml = "<ReportSnapshot><Sector>Technology</Sector></ReportSnapshot>";
        assert_eq!(extract_tag(xml, "Sector"), Some("Technology".to_string()));
    }

    #[test]
    fn extract_tag_missing_returns_none() {
        assert_eq!(extract_tag("<Foo></Foo>", "Sector"), None);
    }

    #[test]
    fn score_favors_mid_price_and_high_volume() {
        let high = Screener::score(80.0, Decimal::from(200), 2_000_000);
        let low = Screener::score(10.0, Decimal::from(600), 1_000);
        assert!(high > low);
    }
}
