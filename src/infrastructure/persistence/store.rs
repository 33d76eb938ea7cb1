//! §4.3 Store: SQLite-backed implementation of `domain::ports::Store`.
//! Append operations (`log_*`) insert one row per call; update-by-id
//! operations mutate a single existing row. Writes to a given entity id are
//! serialized by SQLite's own row locking; concurrent readers are not
//! blocked (WAL mode).

use super::database::Database;
use crate::domain::errors::StoreError;
use crate::domain::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or_default()
}

fn opt_dec(s: Option<String>) -> Option<Decimal> {
    s.map(|s| dec(&s))
}

fn strategy_kind_from_str(s: &str) -> StrategyKind {
    match s {
        "IRON_CONDOR" => StrategyKind::IronCondor,
        "IRON_BUTTERFLY" => StrategyKind::IronButterfly,
        "VERTICAL_CREDIT_CALL" => StrategyKind::VerticalCreditCall,
        "VERTICAL_CREDIT_PUT" => StrategyKind::VerticalCreditPut,
        "VERTICAL_DEBIT_CALL" => StrategyKind::VerticalDebitCall,
        "VERTICAL_DEBIT_PUT" => StrategyKind::VerticalDebitPut,
        "CALENDAR" => StrategyKind::Calendar,
        "PMCC" => StrategyKind::Pmcc,
        _ => StrategyKind::JadeLizard,
    }
}

fn position_status_from_str(s: &str) -> PositionStatus {
    match s {
        "OPEN" => PositionStatus::Open,
        "CLOSED" => PositionStatus::Closed,
        "CLOSED_EXTERNALLY" => PositionStatus::ClosedExternally,
        _ => PositionStatus::Rolled,
    }
}

fn exit_reason_from_str(s: &str) -> ExitReason {
    match s {
        "TRAILING_PROFIT" => ExitReason::TrailingProfit,
        "PROFIT_TARGET" => ExitReason::ProfitTarget,
        "TRAILING_STOP" => ExitReason::TrailingStop,
        "STOP_LOSS" => ExitReason::StopLoss,
        "TIME_EXIT" => ExitReason::TimeExit,
        "AI_OVERRIDE_EXIT" => ExitReason::AiOverrideExit,
        _ => ExitReason::Reconciliation,
    }
}

fn circuit_breaker_reason_from_str(s: &str) -> CircuitBreakerReason {
    match s {
        "DAILY_MAX_LOSS" => CircuitBreakerReason::DailyMaxLoss,
        "CONSECUTIVE_LOSSES" => CircuitBreakerReason::ConsecutiveLosses,
        _ => CircuitBreakerReason::Manual,
    }
}

fn regime_from_str(s: &str) -> Regime {
    match s {
        "BULL_TRENDING" => Regime::BullTrending,
        "BEAR_TRENDING" => Regime::BearTrending,
        "HIGH_VOL_NEUTRAL" => Regime::HighVolNeutral,
        "LOW_VOL_NEUTRAL" => Regime::LowVolNeutral,
        _ => Regime::ExtremeStress,
    }
}

fn action_from_str(s: &str) -> Action {
    if s == "BUY" { Action::Buy } else { Action::Sell }
}

fn option_right_from_str(s: &str) -> OptionRight {
    if s == "C" { OptionRight::Call } else { OptionRight::Put }
}

fn trade_kind_to_str(k: TradeKind) -> &'static str {
    match k {
        TradeKind::Open => "OPEN",
        TradeKind::Close => "CLOSE",
        TradeKind::Roll => "ROLL",
    }
}

fn trade_kind_from_str(s: &str) -> TradeKind {
    match s {
        "OPEN" => TradeKind::Open,
        "CLOSE" => TradeKind::Close,
        _ => TradeKind::Roll,
    }
}

fn trade_status_to_str(s: TradeStatus) -> &'static str {
    match s {
        TradeStatus::Submitted => "SUBMITTED",
        TradeStatus::PartiallyFilled => "PARTIALLY_FILLED",
        TradeStatus::Filled => "FILLED",
        TradeStatus::Cancelled => "CANCELLED",
        TradeStatus::Inactive => "INACTIVE",
    }
}

fn trade_status_from_str(s: &str) -> TradeStatus {
    match s {
        "SUBMITTED" => TradeStatus::Submitted,
        "PARTIALLY_FILLED" => TradeStatus::PartiallyFilled,
        "FILLED" => TradeStatus::Filled,
        "CANCELLED" => TradeStatus::Cancelled,
        _ => TradeStatus::Inactive,
    }
}

fn shadow_outcome_to_str(o: ShadowOutcome) -> &'static str {
    match o {
        ShadowOutcome::Pending => "PENDING",
        ShadowOutcome::GoodReject => "GOOD_REJECT",
        ShadowOutcome::MissedOpportunity => "MISSED_OPPORTUNITY",
        ShadowOutcome::Neutral => "NEUTRAL",
    }
}

fn shadow_outcome_from_str(s: &str) -> ShadowOutcome {
    match s {
        "PENDING" => ShadowOutcome::Pending,
        "GOOD_REJECT" => ShadowOutcome::GoodReject,
        "MISSED_OPPORTUNITY" => ShadowOutcome::MissedOpportunity,
        _ => ShadowOutcome::Neutral,
    }
}

fn leg_from_row(row: &SqliteRow) -> Leg {
    Leg {
        position_id: row.get::<String, _>("position_id").parse().unwrap_or_default(),
        contract_symbol: row.get("contract_symbol"),
        action: action_from_str(&row.get::<String, _>("action")),
        strike: dec(&row.get::<String, _>("strike")),
        option_type: option_right_from_str(&row.get::<String, _>("option_type")),
        quantity: row.get::<i64, _>("quantity") as u32,
        entry_price: dec(&row.get::<String, _>("entry_price")),
        con_id: row.get("con_id"),
    }
}

fn position_from_row(row: &SqliteRow, legs: Vec<Leg>) -> Result<Position, StoreError> {
    let id: String = row.get("id");
    Ok(Position {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::Database(e.to_string()))?,
        symbol: row.get("symbol"),
        strategy: strategy_kind_from_str(&row.get::<String, _>("strategy")),
        entry_ts: row.get("entry_ts"),
        expiration: row.get("expiration"),
        contracts: row.get::<i64, _>("contracts") as u32,
        entry_credit: dec(&row.get::<String, _>("entry_credit")),
        max_risk: dec(&row.get::<String, _>("max_risk")),
        status: position_status_from_str(&row.get::<String, _>("status")),
        exit_ts: row.get("exit_ts"),
        exit_price: opt_dec(row.get("exit_price")),
        exit_reason: row.get::<Option<String>, _>("exit_reason").map(|s| exit_reason_from_str(&s)),
        realized_pnl: opt_dec(row.get("realized_pnl")),
        vix_entry: dec(&row.get::<String, _>("vix_entry")),
        regime_entry: regime_from_str(&row.get::<String, _>("regime_entry")),
        legs,
        trailing_stop: dec(&row.get::<String, _>("trailing_stop")),
        trailing_profit: dec(&row.get::<String, _>("trailing_profit")),
        highest_profit_seen: dec(&row.get::<String, _>("highest_profit_seen")),
        stop_multiplier: dec(&row.get::<String, _>("stop_multiplier")),
        profit_target_pct: dec(&row.get::<String, _>("profit_target_pct")),
        ml_confidence: row.get("ml_confidence"),
        ml_last_update: row.get("ml_last_update"),
    })
}

impl SqliteStore {
    async fn legs_for(&self, position_id: Uuid) -> Result<Vec<Leg>, StoreError> {
        let rows = sqlx::query("SELECT * FROM position_legs WHERE position_id = ?")
            .bind(position_id.to_string())
            .fetch_all(&self.db.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(leg_from_row).collect())
    }
}

#[async_trait]
impl crate::domain::ports::Store for SqliteStore {
    async fn log_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO trades
               (id, position_id, symbol, kind, status, requested_quantity, filled_quantity,
                fill_price, vix_at_entry, regime_at_entry, submitted_at, notes)
               VALUES (?,?,?,?,?,?,?,?,?,?,?,?)"#,
        )
        .bind(trade.id.to_string())
        .bind(trade.position_id.map(|p| p.to_string()))
        .bind(&trade.symbol)
        .bind(trade_kind_to_str(trade.kind))
        .bind(trade_status_to_str(trade.status))
        .bind(trade.requested_quantity as i64)
        .bind(trade.filled_quantity as i64)
        .bind(trade.fill_price.map(|d| d.to_string()))
        .bind(trade.vix_at_entry.to_string())
        .bind(trade.regime_at_entry.to_string())
        .bind(trade.submitted_at)
        .bind(&trade.notes)
        .execute(&self.db.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn close_trade(
        &self,
        trade_id: Uuid,
        status: TradeStatus,
        fill_price: Option<Decimal>,
        filled_quantity: u32,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE trades SET status = ?, fill_price = ?, filled_quantity = ? WHERE id = ?")
            .bind(trade_status_to_str(status))
            .bind(fill_price.map(|d| d.to_string()))
            .bind(filled_quantity as i64)
            .bind(trade_id.to_string())
            .execute(&self.db.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::TradeNotFound(trade_id));
        }
        Ok(())
    }

    async fn save_position(&self, position: &Position) -> Result<(), StoreError> {
        let mut tx = self.db.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            r#"INSERT INTO positions
               (id, symbol, strategy, entry_ts, expiration, contracts, entry_credit, max_risk,
                status, exit_ts, exit_price, exit_reason, realized_pnl, vix_entry, regime_entry,
                trailing_stop, trailing_profit, highest_profit_seen, stop_multiplier,
                profit_target_pct, ml_confidence, ml_last_update)
               VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
               ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status, exit_ts = excluded.exit_ts,
                 exit_price = excluded.exit_price, exit_reason = excluded.exit_reason,
                 realized_pnl = excluded.realized_pnl, trailing_stop = excluded.trailing_stop,
                 trailing_profit = excluded.trailing_profit,
                 highest_profit_seen = excluded.highest_profit_seen,
                 stop_multiplier = excluded.stop_multiplier,
                 profit_target_pct = excluded.profit_target_pct,
                 ml_confidence = excluded.ml_confidence, ml_last_update = excluded.ml_last_update"#,
        )
        .bind(position.id.to_string())
        .bind(&position.symbol)
        .bind(position.strategy.to_string())
        .bind(position.entry_ts)
        .bind(position.expiration)
        .bind(position.contracts as i64)
        .bind(position.entry_credit.to_string())
        .bind(position.max_risk.to_string())
        .bind(position.status.to_string())
        .bind(position.exit_ts)
        .bind(position.exit_price.map(|d| d.to_string()))
        .bind(position.exit_reason.map(|r| r.to_string()))
        .bind(position.realized_pnl.map(|d| d.to_string()))
        .bind(position.vix_entry.to_string())
        .bind(position.regime_entry.to_string())
        .bind(position.trailing_stop.to_string())
        .bind(position.trailing_profit.to_string())
        .bind(position.highest_profit_seen.to_string())
        .bind(position.stop_multiplier.to_string())
        .bind(position.profit_target_pct.to_string())
        .bind(position.ml_confidence)
        .bind(position.ml_last_update)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for leg in &position.legs {
            sqlx::query(
                r#"INSERT INTO position_legs
                   (position_id, contract_symbol, action, strike, option_type, quantity, entry_price, con_id)
                   VALUES (?,?,?,?,?,?,?,?)
                   ON CONFLICT(position_id, con_id) DO NOTHING"#,
            )
            .bind(position.id.to_string())
            .bind(&leg.contract_symbol)
            .bind(leg.action.to_string())
            .bind(leg.strike.to_string())
            .bind(leg.option_type.to_string())
            .bind(leg.quantity as i64)
            .bind(leg.entry_price.to_string())
            .bind(leg.con_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn mark_position_closed(
        &self,
        position_id: Uuid,
        status: PositionStatus,
        exit_price: Option<Decimal>,
        exit_reason: Option<ExitReason>,
        realized_pnl: Option<Decimal>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE positions SET status = ?, exit_ts = ?, exit_price = ?, exit_reason = ?, realized_pnl = ?
               WHERE id = ?"#,
        )
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(exit_price.map(|d| d.to_string()))
        .bind(exit_reason.map(|r| r.to_string()))
        .bind(realized_pnl.map(|d| d.to_string()))
        .bind(position_id.to_string())
        .execute(&self.db.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::PositionNotFound(position_id));
        }
        Ok(())
    }

    async fn update_position_trailing(
        &self,
        position_id: Uuid,
        trailing_stop: Decimal,
        trailing_profit: Decimal,
        highest_profit_seen: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE positions SET trailing_stop = ?, trailing_profit = ?, highest_profit_seen = ?,
               ml_last_update = ? WHERE id = ?"#,
        )
        .bind(trailing_stop.to_string())
        .bind(trailing_profit.to_string())
        .bind(highest_profit_seen.to_string())
        .bind(Utc::now())
        .bind(position_id.to_string())
        .execute(&self.db.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::PositionNotFound(position_id));
        }
        Ok(())
    }

    async fn open_positions(&self) -> Result<Vec<Position>, StoreError> {
        let rows = sqlx::query("SELECT * FROM positions WHERE status = 'OPEN'")
            .fetch_all(&self.db.pool)
            .await
            .map_err(db_err)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let pid = Uuid::parse_str(&id).map_err(|e| StoreError::Database(e.to_string()))?;
            let legs = self.legs_for(pid).await?;
            out.push(position_from_row(row, legs)?);
        }
        Ok(out)
    }

    async fn position_by_id(&self, id: Uuid) -> Result<Option<Position>, StoreError> {
        let row = sqlx::query("SELECT * FROM positions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.db.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => {
                let legs = self.legs_for(id).await?;
                Ok(Some(position_from_row(&row, legs)?))
            }
            None => Ok(None),
        }
    }

    async fn log_ai_decision(&self, decision: &AiDecision) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO ai_decisions (id, model_id, decision_type, recommendation, confidence, vix, regime, created_at)
               VALUES (?,?,?,?,?,?,?,?)"#,
        )
        .bind(decision.id.to_string())
        .bind(&decision.model_id)
        .bind(&decision.decision_type)
        .bind(&decision.recommendation)
        .bind(decision.confidence)
        .bind(decision.vix.to_string())
        .bind(decision.regime.to_string())
        .bind(decision.created_at)
        .execute(&self.db.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn log_shadow_trade(&self, shadow: &ShadowTrade) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO shadow_trades
               (id, symbol, strategy, rejection_reason, features_json, candidate_expiration, outcome, created_at)
               VALUES (?,?,?,?,?,?,?,?)"#,
        )
        .bind(shadow.id.to_string())
        .bind(&shadow.symbol)
        .bind(shadow.strategy.to_string())
        .bind(&shadow.rejection_reason)
        .bind(&shadow.features_json)
        .bind(shadow.candidate_expiration)
        .bind(shadow_outcome_to_str(shadow.outcome))
        .bind(shadow.created_at)
        .execute(&self.db.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_shadow_outcome(&self, id: Uuid, outcome: ShadowOutcome) -> Result<(), StoreError> {
        sqlx::query("UPDATE shadow_trades SET outcome = ? WHERE id = ?")
            .bind(shadow_outcome_to_str(outcome))
            .bind(id.to_string())
            .execute(&self.db.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn pending_shadow_trades(&self) -> Result<Vec<ShadowTrade>, StoreError> {
        let rows = sqlx::query("SELECT * FROM shadow_trades WHERE outcome = 'PENDING'")
            .fetch_all(&self.db.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                Ok(ShadowTrade {
                    id: Uuid::parse_str(&row.get::<String, _>("id")).map_err(|e| StoreError::Database(e.to_string()))?,
                    symbol: row.get("symbol"),
                    strategy: strategy_kind_from_str(&row.get::<String, _>("strategy")),
                    rejection_reason: row.get("rejection_reason"),
                    features_json: row.get("features_json"),
                    candidate_expiration: row.get("candidate_expiration"),
                    outcome: shadow_outcome_from_str(&row.get::<String, _>("outcome")),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn log_circuit_breaker_event(&self, event: &CircuitBreakerEvent) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"INSERT INTO circuit_breaker_events
               (triggered_ts, reason, threshold_value, reset_ts, reset_by, halt_duration_hours, notes)
               VALUES (?,?,?,?,?,?,?)"#,
        )
        .bind(event.triggered_ts)
        .bind(event.reason.to_string())
        .bind(event.threshold_value)
        .bind(event.reset_ts)
        .bind(&event.reset_by)
        .bind(event.halt_duration_hours)
        .bind(&event.notes)
        .execute(&self.db.pool)
        .await
        .map_err(db_err)?;
        Ok(result.last_insert_rowid())
    }

    async fn reset_circuit_breaker(&self, id: i64, reset_by: &str, notes: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE circuit_breaker_events SET reset_ts = ?, reset_by = ?, notes = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(reset_by)
            .bind(notes)
            .bind(id)
            .execute(&self.db.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::CircuitBreakerEventNotFound(id));
        }
        Ok(())
    }

    async fn active_circuit_breaker_event(&self) -> Result<Option<CircuitBreakerEvent>, StoreError> {
        let row = sqlx::query("SELECT * FROM circuit_breaker_events WHERE reset_ts IS NULL ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.db.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|row| CircuitBreakerEvent {
            id: row.get("id"),
            triggered_ts: row.get("triggered_ts"),
            reason: circuit_breaker_reason_from_str(&row.get::<String, _>("reason")),
            threshold_value: row.get("threshold_value"),
            reset_ts: row.get("reset_ts"),
            reset_by: row.get("reset_by"),
            halt_duration_hours: row.get("halt_duration_hours"),
            notes: row.get("notes"),
        }))
    }

    async fn log_exit_adjustment(&self, adjustment: &ExitAdjustment) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO exit_adjustments
               (position_id, ts, old_stop, new_stop, old_profit_target, new_profit_target, reason)
               VALUES (?,?,?,?,?,?,?)"#,
        )
        .bind(adjustment.position_id.to_string())
        .bind(adjustment.ts)
        .bind(adjustment.old_stop.to_string())
        .bind(adjustment.new_stop.to_string())
        .bind(adjustment.old_profit_target.to_string())
        .bind(adjustment.new_profit_target.to_string())
        .bind(&adjustment.reason)
        .execute(&self.db.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn trade_history(&self, limit: usize) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query("SELECT * FROM trades ORDER BY submitted_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.db.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(trade_from_row).collect()
    }

    async fn losing_trades(&self, days: i64, limit: usize) -> Result<Vec<Trade>, StoreError> {
        let since = Utc::now() - chrono::Duration::days(days);
        let rows = sqlx::query(
            r#"SELECT t.* FROM trades t JOIN positions p ON t.position_id = p.id
               WHERE p.realized_pnl IS NOT NULL AND CAST(p.realized_pnl AS REAL) < 0
                 AND t.submitted_at >= ?
               ORDER BY t.submitted_at DESC LIMIT ?"#,
        )
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.db.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(trade_from_row).collect()
    }

    async fn recent_realized_pnls(&self, limit: usize) -> Result<Vec<Decimal>, StoreError> {
        let rows = sqlx::query("SELECT realized_pnl FROM positions WHERE realized_pnl IS NOT NULL ORDER BY exit_ts DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.db.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(|row| dec(&row.get::<String, _>("realized_pnl"))).collect())
    }

    async fn daily_realized_pnl(&self, since: DateTime<Utc>) -> Result<Decimal, StoreError> {
        let rows = sqlx::query("SELECT realized_pnl FROM positions WHERE realized_pnl IS NOT NULL AND exit_ts >= ?")
            .bind(since)
            .fetch_all(&self.db.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(|row| dec(&row.get::<String, _>("realized_pnl"))).sum())
    }

    async fn log_new_in_broker_diff(&self, symbol: &str, con_id: i64, detected_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO new_in_broker_diffs (symbol, con_id, detected_at) VALUES (?,?,?)")
            .bind(symbol)
            .bind(con_id)
            .bind(detected_at)
            .execute(&self.db.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn trade_from_row(row: &SqliteRow) -> Result<Trade, StoreError> {
    Ok(Trade {
        id: Uuid::parse_str(&row.get::<String, _>("id")).map_err(|e| StoreError::Database(e.to_string()))?,
        position_id: row
            .get::<Option<String>, _>("position_id")
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| StoreError::Database(e.to_string()))?,
        symbol: row.get("symbol"),
        kind: trade_kind_from_str(&row.get::<String, _>("kind")),
        status: trade_status_from_str(&row.get::<String, _>("status")),
        requested_quantity: row.get::<i64, _>("requested_quantity") as u32,
        filled_quantity: row.get::<i64, _>("filled_quantity") as u32,
        fill_price: opt_dec(row.get("fill_price")),
        vix_at_entry: dec(&row.get::<String, _>("vix_at_entry")),
        regime_at_entry: regime_from_str(&row.get::<String, _>("regime_at_entry")),
        submitted_at: row.get("submitted_at"),
        notes: row.get("notes"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Store;
    use rust_decimal_macros::dec;

    async fn store() -> SqliteStore {
        let db = Database::new("sqlite::memory:").await.expect("in-memory db opens");
        SqliteStore::new(db)
    }

    fn position(status: PositionStatus) -> Position {
        Position {
            id: Uuid::new_v4(),
            symbol: "SPY".into(),
            strategy: StrategyKind::VerticalCreditCall,
            entry_ts: Utc::now(),
            expiration: Utc::now().date_naive(),
            contracts: 1,
            entry_credit: dec!(0.625),
            max_risk: dec!(500),
            status,
            exit_ts: None,
            exit_price: None,
            exit_reason: None,
            realized_pnl: None,
            vix_entry: dec!(18.5),
            regime_entry: Regime::LowVolNeutral,
            legs: vec![
                Leg {
                    position_id: Uuid::nil(),
                    contract_symbol: "SPY".into(),
                    action: Action::Sell,
                    strike: dec!(455),
                    option_type: OptionRight::Call,
                    quantity: 1,
                    entry_price: dec!(1.125),
                    con_id: 111,
                },
                Leg {
                    position_id: Uuid::nil(),
                    contract_symbol: "SPY".into(),
                    action: Action::Buy,
                    strike: dec!(460),
                    option_type: OptionRight::Call,
                    quantity: 1,
                    entry_price: dec!(0.525),
                    con_id: 112,
                },
            ],
            trailing_stop: dec!(1.5625),
            trailing_profit: dec!(0.3125),
            highest_profit_seen: Decimal::ZERO,
            stop_multiplier: dec!(2.5),
            profit_target_pct: dec!(0.5),
            ml_confidence: None,
            ml_last_update: None,
        }
    }

    #[tokio::test]
    async fn save_and_reload_position_round_trips_legs() {
        let store = store().await;
        let pos = position(PositionStatus::Open);
        store.save_position(&pos).await.unwrap();

        let loaded = store.position_by_id(pos.id).await.unwrap().expect("position present");
        assert_eq!(loaded.legs.len(), 2);
        assert_eq!(loaded.entry_credit, dec!(0.625));
        assert_eq!(loaded.status, PositionStatus::Open);
    }

    #[tokio::test]
    async fn open_positions_excludes_closed() {
        let store = store().await;
        store.save_position(&position(PositionStatus::Open)).await.unwrap();
        store.save_position(&position(PositionStatus::Closed)).await.unwrap();
        let open = store.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn circuit_breaker_event_round_trips_and_resets() {
        let store = store().await;
        let event = CircuitBreakerEvent {
            id: 0,
            triggered_ts: Utc::now(),
            reason: CircuitBreakerReason::ConsecutiveLosses,
            threshold_value: 3.0,
            reset_ts: None,
            reset_by: None,
            halt_duration_hours: Some(24),
            notes: None,
        };
        let id = store.log_circuit_breaker_event(&event).await.unwrap();
        let active = store.active_circuit_breaker_event().await.unwrap();
        assert!(active.is_some());

        store.reset_circuit_breaker(id, "operator", "manual reset").await.unwrap();
        let active = store.active_circuit_breaker_event().await.unwrap();
        assert!(active.is_none());
    }

    #[tokio::test]
    async fn mark_position_closed_updates_status_and_pnl() {
        let store = store().await;
        let pos = position(PositionStatus::Open);
        store.save_position(&pos).await.unwrap();
        store
            .mark_position_closed(pos.id, PositionStatus::Closed, Some(dec!(0.10)), Some(ExitReason::TrailingProfit), Some(dec!(51.25)))
            .await
            .unwrap();
        let loaded = store.position_by_id(pos.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PositionStatus::Closed);
        assert_eq!(loaded.realized_pnl, Some(dec!(51.25)));
    }
}
