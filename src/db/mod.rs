//! Persistence for positions, decisions and executions.
//!
//! The ledger only talks to the [`Repository`] trait. [`SqliteRepository`]
//! keeps state across restarts; [`MemoryRepository`] backs tests and
//! throwaway runs.

mod memory;

pub use memory::MemoryRepository;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::debug;

use crate::error::DatabaseError;
use crate::models::{ExecutionResult, ExecutionSide, Position, PositionStatus};

// ==================== Records ====================

/// Entry or exit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Entry,
    Exit,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Entry => "entry",
            DecisionKind::Exit => "exit",
        }
    }
}

/// Audit record of one decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRecord {
    pub kind: DecisionKind,
    /// Signal id for entries, position id for exits
    pub subject_id: String,
    pub instrument_address: String,
    pub symbol: String,
    pub approve: bool,
    pub reason: String,
    pub quality_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Audit record of one executor call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub position_id: Option<String>,
    pub side: ExecutionSide,
    pub result: ExecutionResult,
    pub created_at: DateTime<Utc>,
}

// ==================== Repository ====================

/// Storage contract used by the position ledger.
#[async_trait]
pub trait Repository: Send + Sync + std::fmt::Debug {
    /// Open positions ordered by entry time.
    async fn load_open_positions(&self) -> Result<Vec<Position>, DatabaseError>;

    /// Closed and failed positions ordered by exit time.
    async fn load_closed_positions(&self) -> Result<Vec<Position>, DatabaseError>;

    /// Insert or replace a position by id.
    async fn persist(&self, position: &Position) -> Result<(), DatabaseError>;

    async fn record_decision(&self, record: &DecisionRecord) -> Result<(), DatabaseError>;

    async fn record_execution(&self, record: &ExecutionRecord) -> Result<(), DatabaseError>;
}

// ==================== SQLite ====================

/// SQLite-backed repository.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

/// Stored position row. Decimals and timestamps are kept as text.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredPosition {
    pub id: String,
    pub instrument_address: String,
    pub symbol: String,
    pub name: String,
    pub source_signal_id: String,
    pub entry_amount_native: String,
    pub entry_value_usd: String,
    pub token_amount: String,
    pub entry_price_usd: String,
    pub entry_tx_id: String,
    pub entry_timestamp: String,
    pub current_price_usd: String,
    pub current_value_usd: String,
    pub pnl_usd: String,
    pub pnl_percentage: String,
    pub exit_tx_id: Option<String>,
    pub exit_timestamp: Option<String>,
    pub close_reason: Option<String>,
    pub status: String,
}

impl SqliteRepository {
    /// Connect and run migrations.
    pub async fn new(database_url: &str) -> Result<Self, DatabaseError> {
        // Every connection to an in-memory database gets its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        let repo = Self { pool };
        repo.run_migrations().await?;

        Ok(repo)
    }

    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                instrument_address TEXT NOT NULL,
                symbol TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                source_signal_id TEXT NOT NULL,
                entry_amount_native TEXT NOT NULL,
                entry_value_usd TEXT NOT NULL,
                token_amount TEXT NOT NULL,
                entry_price_usd TEXT NOT NULL,
                entry_tx_id TEXT NOT NULL,
                entry_timestamp TEXT NOT NULL,
                current_price_usd TEXT NOT NULL,
                current_value_usd TEXT NOT NULL,
                pnl_usd TEXT NOT NULL,
                pnl_percentage TEXT NOT NULL,
                exit_tx_id TEXT,
                exit_timestamp TEXT,
                close_reason TEXT,
                status TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                instrument_address TEXT NOT NULL,
                symbol TEXT NOT NULL,
                approve INTEGER NOT NULL,
                reason TEXT NOT NULL,
                quality_score REAL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                position_id TEXT,
                side TEXT NOT NULL,
                success INTEGER NOT NULL,
                tx_id TEXT NOT NULL,
                instrument_address TEXT NOT NULL,
                input_amount TEXT NOT NULL,
                output_amount TEXT NOT NULL,
                price TEXT NOT NULL,
                slippage TEXT NOT NULL,
                fee TEXT NOT NULL,
                error_message TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Database migrations complete");
        Ok(())
    }

    async fn fetch_positions(&self, sql: &str) -> Result<Vec<Position>, DatabaseError> {
        let rows = sqlx::query_as::<_, StoredPosition>(sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Position::try_from).collect()
    }

    /// Count of recorded decisions, optionally only approvals.
    pub async fn decision_count(&self, approved_only: bool) -> Result<i64, DatabaseError> {
        let sql = if approved_only {
            "SELECT COUNT(*) FROM decisions WHERE approve = 1"
        } else {
            "SELECT COUNT(*) FROM decisions"
        };
        let (count,): (i64,) = sqlx::query_as(sql).fetch_one(&self.pool).await?;

        Ok(count)
    }

    /// Get the connection pool (for advanced queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn load_open_positions(&self) -> Result<Vec<Position>, DatabaseError> {
        self.fetch_positions("SELECT * FROM positions WHERE status = 'open' ORDER BY entry_timestamp")
            .await
    }

    async fn load_closed_positions(&self) -> Result<Vec<Position>, DatabaseError> {
        self.fetch_positions(
            "SELECT * FROM positions WHERE status != 'open' ORDER BY exit_timestamp, entry_timestamp",
        )
        .await
    }

    async fn persist(&self, position: &Position) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO positions (
                id, instrument_address, symbol, name, source_signal_id,
                entry_amount_native, entry_value_usd, token_amount, entry_price_usd,
                entry_tx_id, entry_timestamp, current_price_usd, current_value_usd,
                pnl_usd, pnl_percentage, exit_tx_id, exit_timestamp, close_reason, status
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                token_amount = excluded.token_amount,
                current_price_usd = excluded.current_price_usd,
                current_value_usd = excluded.current_value_usd,
                pnl_usd = excluded.pnl_usd,
                pnl_percentage = excluded.pnl_percentage,
                exit_tx_id = excluded.exit_tx_id,
                exit_timestamp = excluded.exit_timestamp,
                close_reason = excluded.close_reason,
                status = excluded.status,
                updated_at = datetime('now')
            "#,
        )
        .bind(&position.id)
        .bind(&position.instrument_address)
        .bind(&position.symbol)
        .bind(&position.name)
        .bind(&position.source_signal_id)
        .bind(position.entry_amount_native.to_string())
        .bind(position.entry_value_usd.to_string())
        .bind(position.token_amount.to_string())
        .bind(position.entry_price_usd.to_string())
        .bind(&position.entry_tx_id)
        .bind(position.entry_timestamp.to_rfc3339())
        .bind(position.current_price_usd.to_string())
        .bind(position.current_value_usd.to_string())
        .bind(position.pnl_usd.to_string())
        .bind(position.pnl_percentage.to_string())
        .bind(&position.exit_tx_id)
        .bind(position.exit_timestamp.map(|t| t.to_rfc3339()))
        .bind(&position.close_reason)
        .bind(position.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_decision(&self, record: &DecisionRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO decisions (
                kind, subject_id, instrument_address, symbol, approve, reason, quality_score, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.kind.as_str())
        .bind(&record.subject_id)
        .bind(&record.instrument_address)
        .bind(&record.symbol)
        .bind(record.approve)
        .bind(&record.reason)
        .bind(record.quality_score)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_execution(&self, record: &ExecutionRecord) -> Result<(), DatabaseError> {
        let result = &record.result;
        sqlx::query(
            r#"
            INSERT INTO executions (
                position_id, side, success, tx_id, instrument_address, input_amount,
                output_amount, price, slippage, fee, error_message, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.position_id)
        .bind(record.side.as_str())
        .bind(result.success)
        .bind(&result.tx_id)
        .bind(&result.instrument_address)
        .bind(result.input_amount.to_string())
        .bind(result.output_amount.to_string())
        .bind(result.price.to_string())
        .bind(result.slippage.to_string())
        .bind(result.fee.to_string())
        .bind(&result.error_message)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ==================== Row Conversion ====================

impl TryFrom<StoredPosition> for Position {
    type Error = DatabaseError;

    fn try_from(row: StoredPosition) -> Result<Self, Self::Error> {
        let corrupt = |detail: String| DatabaseError::Corrupt { id: row.id.clone(), detail };

        if row.instrument_address.trim().is_empty() {
            return Err(corrupt("empty instrument address".to_string()));
        }

        let decimal = |field: &str, value: &str| {
            Decimal::from_str(value).map_err(|_| corrupt(format!("{} is not a decimal: '{}'", field, value)))
        };
        let timestamp = |field: &str, value: &str| {
            DateTime::parse_from_rfc3339(value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| corrupt(format!("{} is not a timestamp: '{}'", field, value)))
        };

        let status = PositionStatus::from_str(&row.status).map_err(&corrupt)?;
        let token_amount = decimal("token_amount", &row.token_amount)?;
        if token_amount.is_sign_negative() {
            return Err(corrupt(format!("negative token amount {}", token_amount)));
        }
        let exit_timestamp = match &row.exit_timestamp {
            Some(value) => Some(timestamp("exit_timestamp", value)?),
            None => None,
        };
        if status.is_terminal() && exit_timestamp.is_none() {
            return Err(corrupt(format!("{} position has no exit timestamp", status)));
        }

        Ok(Position {
            entry_amount_native: decimal("entry_amount_native", &row.entry_amount_native)?,
            entry_value_usd: decimal("entry_value_usd", &row.entry_value_usd)?,
            token_amount,
            entry_price_usd: decimal("entry_price_usd", &row.entry_price_usd)?,
            entry_timestamp: timestamp("entry_timestamp", &row.entry_timestamp)?,
            current_price_usd: decimal("current_price_usd", &row.current_price_usd)?,
            current_value_usd: decimal("current_value_usd", &row.current_value_usd)?,
            pnl_usd: decimal("pnl_usd", &row.pnl_usd)?,
            pnl_percentage: decimal("pnl_percentage", &row.pnl_percentage)?,
            exit_timestamp,
            status,
            id: row.id.clone(),
            instrument_address: row.instrument_address.clone(),
            symbol: row.symbol.clone(),
            name: row.name.clone(),
            source_signal_id: row.source_signal_id.clone(),
            entry_tx_id: row.entry_tx_id.clone(),
            exit_tx_id: row.exit_tx_id.clone(),
            close_reason: row.close_reason.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::open_position;
    use rust_decimal_macros::dec;

    async fn repo() -> SqliteRepository {
        SqliteRepository::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_position_round_trip() {
        let repo = repo().await;
        let mut position = open_position("addr-1", dec!(10), 2);
        position.entry_price_usd = dec!(10) / dec!(3);
        repo.persist(&position).await.unwrap();

        let open = repo.load_open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].entry_price_usd, position.entry_price_usd);
        assert_eq!(open[0].entry_value_usd, dec!(10));
        assert_eq!(open[0].entry_timestamp.timestamp(), position.entry_timestamp.timestamp());
        assert!(repo.load_closed_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_upserts_by_id() {
        let repo = repo().await;
        let mut position = open_position("addr-1", dec!(10), 2);
        repo.persist(&position).await.unwrap();

        position.revalue(dec!(0.02));
        position.status = PositionStatus::Closed;
        position.exit_timestamp = Some(Utc::now());
        position.exit_tx_id = Some("sell-tx".to_string());
        position.close_reason = Some("take_profit".to_string());
        repo.persist(&position).await.unwrap();

        assert!(repo.load_open_positions().await.unwrap().is_empty());
        let closed = repo.load_closed_positions().await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].status, PositionStatus::Closed);
        assert_eq!(closed[0].pnl_usd, dec!(10));
        assert_eq!(closed[0].close_reason.as_deref(), Some("take_profit"));
    }

    #[tokio::test]
    async fn test_corrupt_row_rejected() {
        let repo = repo().await;
        let position = open_position("addr-1", dec!(10), 2);
        repo.persist(&position).await.unwrap();

        sqlx::query("UPDATE positions SET token_amount = 'lots'")
            .execute(repo.pool())
            .await
            .unwrap();

        let result = repo.load_open_positions().await;
        assert!(matches!(result, Err(DatabaseError::Corrupt { id, .. }) if id == "pos_addr-1"));
    }

    #[tokio::test]
    async fn test_records_are_stored() {
        let repo = repo().await;
        let record = DecisionRecord {
            kind: DecisionKind::Entry,
            subject_id: "tx-1".to_string(),
            instrument_address: "addr-1".to_string(),
            symbol: "TEST".to_string(),
            approve: true,
            reason: "ok".to_string(),
            quality_score: Some(0.7),
            created_at: Utc::now(),
        };
        repo.record_decision(&record).await.unwrap();
        repo.record_decision(&DecisionRecord { approve: false, ..record }).await.unwrap();

        repo.record_execution(&ExecutionRecord {
            position_id: None,
            side: ExecutionSide::Buy,
            result: ExecutionResult::failed("addr-1", dec!(0.1), "no route"),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        assert_eq!(repo.decision_count(false).await.unwrap(), 2);
        assert_eq!(repo.decision_count(true).await.unwrap(), 1);
        let (executions,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM executions")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        assert_eq!(executions, 1);
    }
}
