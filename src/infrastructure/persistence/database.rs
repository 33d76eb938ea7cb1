//! §6 persistence layout: a single SQLite file with WAL journaling,
//! row-level ACID transactions, and one table per entity in §3. Schema
//! creation is idempotent (`CREATE TABLE IF NOT EXISTS`) so startup never
//! fails against an already-initialized database file.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to SQLite database")?;

        info!(db_url, "connected to store database");

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                strategy TEXT NOT NULL,
                entry_ts TEXT NOT NULL,
                expiration TEXT NOT NULL,
                contracts INTEGER NOT NULL,
                entry_credit TEXT NOT NULL,
                max_risk TEXT NOT NULL,
                status TEXT NOT NULL,
                exit_ts TEXT,
                exit_price TEXT,
                exit_reason TEXT,
                realized_pnl TEXT,
                vix_entry TEXT NOT NULL,
                regime_entry TEXT NOT NULL,
                trailing_stop TEXT NOT NULL,
                trailing_profit TEXT NOT NULL,
                highest_profit_seen TEXT NOT NULL,
                stop_multiplier TEXT NOT NULL,
                profit_target_pct TEXT NOT NULL,
                ml_confidence REAL,
                ml_last_update TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_positions_status ON positions (status);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create positions table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS position_legs (
                position_id TEXT NOT NULL REFERENCES positions(id),
                contract_symbol TEXT NOT NULL,
                action TEXT NOT NULL,
                strike TEXT NOT NULL,
                option_type TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                entry_price TEXT NOT NULL,
                con_id INTEGER NOT NULL,
                PRIMARY KEY (position_id, con_id)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create position_legs table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                position_id TEXT REFERENCES positions(id),
                symbol TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                requested_quantity INTEGER NOT NULL,
                filled_quantity INTEGER NOT NULL,
                fill_price TEXT,
                vix_at_entry TEXT NOT NULL,
                regime_at_entry TEXT NOT NULL,
                submitted_at TEXT NOT NULL,
                notes TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_trades_status ON trades (status);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create trades table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS exit_adjustments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                position_id TEXT NOT NULL REFERENCES positions(id),
                ts TEXT NOT NULL,
                old_stop TEXT NOT NULL,
                new_stop TEXT NOT NULL,
                old_profit_target TEXT NOT NULL,
                new_profit_target TEXT NOT NULL,
                reason TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create exit_adjustments table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pnl_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                realized_pnl TEXT NOT NULL,
                open_positions INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create pnl_history table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ai_decisions (
                id TEXT PRIMARY KEY,
                model_id TEXT NOT NULL,
                decision_type TEXT NOT NULL,
                recommendation TEXT NOT NULL,
                confidence REAL NOT NULL,
                vix TEXT NOT NULL,
                regime TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create ai_decisions table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS market_snapshots (
                ts TEXT PRIMARY KEY,
                vix TEXT NOT NULL,
                vix3m TEXT,
                ratio TEXT,
                term_structure TEXT NOT NULL,
                regime TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create market_snapshots table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shadow_trades (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                strategy TEXT NOT NULL,
                rejection_reason TEXT NOT NULL,
                features_json TEXT NOT NULL,
                candidate_expiration TEXT NOT NULL,
                outcome TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_shadow_trades_status ON shadow_trades (outcome);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create shadow_trades table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS circuit_breaker_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                triggered_ts TEXT NOT NULL,
                reason TEXT NOT NULL,
                threshold_value REAL NOT NULL,
                reset_ts TEXT,
                reset_by TEXT,
                halt_duration_hours INTEGER,
                notes TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_cb_events_open ON circuit_breaker_events ((reset_ts IS NULL));
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create circuit_breaker_events table")?;

        // (ADD, SPEC_FULL §3): new-in-broker reconciliation diffs are
        // persisted, not merely logged, so DailySummary can report trend.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS new_in_broker_diffs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                con_id INTEGER NOT NULL,
                detected_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create new_in_broker_diffs table")?;

        info!("store schema initialized");
        Ok(())
    }
}
