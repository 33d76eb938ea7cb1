//! §6 historical CSV cache: one file per symbol per window under
//! `data/historical/`, columns `date, open, high, low, close, volume`.
//! Incremental update appends new rows and de-duplicates on `date`. The
//! fetch side (actually pulling bars from a data vendor) is out of scope
//! (§1: "historical-data fetcher"); this is purely the on-disk cache the
//! Regime & Feature Engine reads from, backed by bars the Broker Adapter's
//! `historical_bars` already returned.

use crate::domain::ports::Candle;
use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: u64,
}

impl From<&Candle> for CsvRow {
    fn from(c: &Candle) -> Self {
        Self {
            date: c.ts.date_naive(),
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
        }
    }
}

impl CsvRow {
    fn into_candle(self) -> Candle {
        Candle {
            ts: Utc.from_utc_datetime(&self.date.and_hms_opt(0, 0, 0).expect("midnight is always valid")),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

pub struct HistoricalCache {
    dir: PathBuf,
}

impl HistoricalCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, symbol: &str, window: &str) -> PathBuf {
        self.dir.join(format!("{symbol}_{window}.csv"))
    }

    pub async fn load(&self, symbol: &str, window: &str) -> Result<Vec<Candle>> {
        let path = self.path(symbol, window);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&path).await.context("failed to read historical cache file")?;
        read_rows(&bytes).map(|rows| rows.into_iter().map(CsvRow::into_candle).collect())
    }

    /// Merges `candles` into the existing file, de-duplicating on `date`
    /// (the newer value wins) and writing the result back sorted ascending.
    pub async fn update(&self, symbol: &str, window: &str, candles: &[Candle]) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await.context("failed to create historical cache dir")?;
        }
        let path = self.path(symbol, window);
        let mut by_date: BTreeMap<NaiveDate, CsvRow> = if path.exists() {
            let bytes = fs::read(&path).await.context("failed to read historical cache file")?;
            read_rows(&bytes)?.into_iter().map(|r| (r.date, r)).collect()
        } else {
            BTreeMap::new()
        };

        for candle in candles {
            let row = CsvRow::from(candle);
            by_date.insert(row.date, row);
        }

        write_rows(&path, by_date.into_values().collect()).await
    }
}

fn read_rows(bytes: &[u8]) -> Result<Vec<CsvRow>> {
    let mut reader = csv::Reader::from_reader(bytes);
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<CsvRow>, csv::Error>>()
        .context("historical cache file did not parse as CSV")
}

async fn write_rows(path: &Path, rows: Vec<CsvRow>) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in &rows {
        writer.serialize(row).context("failed to serialize historical cache row")?;
    }
    let bytes = writer.into_inner().context("failed to flush CSV writer")?;
    fs::write(path, bytes).await.context("failed to write historical cache file")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(date: &str, close: Decimal) -> Candle {
        let d = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        Candle {
            ts: Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap()),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000,
        }
    }

    #[tokio::test]
    async fn update_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("rustrade-hist-{}", uuid::Uuid::new_v4()));
        let cache = HistoricalCache::new(&dir);
        cache.update("SPY", "1D", &[candle("2024-01-02", dec!(470.00))]).await.unwrap();
        let loaded = cache.load("SPY", "1D").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].close, dec!(470.00));
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn update_deduplicates_on_date_keeping_latest() {
        let dir = std::env::temp_dir().join(format!("rustrade-hist-{}", uuid::Uuid::new_v4()));
        let cache = HistoricalCache::new(&dir);
        cache.update("SPY", "1D", &[candle("2024-01-02", dec!(470.00))]).await.unwrap();
        cache.update("SPY", "1D", &[candle("2024-01-02", dec!(471.50))]).await.unwrap();
        let loaded = cache.load("SPY", "1D").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].close, dec!(471.50));
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn load_of_missing_file_is_empty() {
        let dir = std::env::temp_dir().join(format!("rustrade-hist-{}", uuid::Uuid::new_v4()));
        let cache = HistoricalCache::new(&dir);
        assert!(cache.load("QQQ", "1D").await.unwrap().is_empty());
    }
}
