//! SQLite-backed outcome source and state store

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use monitor_core::{
    AlertState, CheckOutcome, CheckState, CheckStatus, MonitorError, OutcomeSource, Severity,
    StateStore,
};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, FromRow)]
struct OutcomeRow {
    check_name: String,
    recorded_at_ms: i64,
    status: String,
}

#[derive(Debug, FromRow)]
struct CheckNameRow {
    check_name: String,
}

#[derive(Debug, FromRow)]
struct BaselineWindowRow {
    window_end_ms: i64,
    rate: f64,
}

#[derive(Debug, FromRow)]
struct AlertStateRow {
    state: String,
    last_alert_at_ms: Option<i64>,
    last_severity: Option<String>,
}

/// Outcomes, baseline history and dispatcher state in one SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if missing
    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS check_outcomes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                check_name TEXT NOT NULL,
                recorded_at_ms INTEGER NOT NULL,
                status TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_outcomes_check_time
             ON check_outcomes(check_name, recorded_at_ms)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS baseline_windows (
                check_name TEXT NOT NULL,
                window_end_ms INTEGER NOT NULL,
                rate REAL NOT NULL,
                seq INTEGER NOT NULL,
                PRIMARY KEY (check_name, window_end_ms)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS alert_state (
                check_name TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                last_alert_at_ms INTEGER,
                last_severity TEXT,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Connectivity probe used at startup
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn record_outcome(&self, outcome: &CheckOutcome) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO check_outcomes (check_name, recorded_at_ms, status) VALUES (?, ?, ?)",
        )
        .bind(&outcome.check_name)
        .bind(outcome.timestamp.timestamp_millis())
        .bind(outcome.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Insert many outcomes in a single transaction
    pub async fn record_outcomes(&self, outcomes: &[CheckOutcome]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for outcome in outcomes {
            sqlx::query(
                "INSERT INTO check_outcomes (check_name, recorded_at_ms, status) VALUES (?, ?, ?)",
            )
            .bind(&outcome.check_name)
            .bind(outcome.timestamp.timestamp_millis())
            .bind(outcome.status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(outcomes.len() as u64)
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, MonitorError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| MonitorError::InvalidData(format!("timestamp {} out of range", ms)))
}

fn source_err(e: sqlx::Error) -> MonitorError {
    MonitorError::Source(e.to_string())
}

fn store_err(e: sqlx::Error) -> MonitorError {
    MonitorError::Store(e.to_string())
}

#[async_trait]
impl OutcomeSource for SqliteStore {
    async fn list_checks(&self) -> Result<Vec<String>, MonitorError> {
        let rows: Vec<CheckNameRow> = sqlx::query_as(
            "SELECT DISTINCT check_name FROM check_outcomes ORDER BY check_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(source_err)?;

        Ok(rows.into_iter().map(|r| r.check_name).collect())
    }

    async fn fetch_outcomes(
        &self,
        check_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CheckOutcome>, MonitorError> {
        let rows: Vec<OutcomeRow> = sqlx::query_as(
            "SELECT check_name, recorded_at_ms, status
             FROM check_outcomes
             WHERE check_name = ? AND recorded_at_ms >= ? AND recorded_at_ms < ?
             ORDER BY recorded_at_ms, id",
        )
        .bind(check_name)
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(source_err)?;

        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            match row.status.parse::<CheckStatus>() {
                Ok(status) => outcomes.push(CheckOutcome {
                    check_name: row.check_name,
                    timestamp: from_millis(row.recorded_at_ms)?,
                    status,
                }),
                // Unknown labels are not part of the closed status set
                Err(e) => tracing::warn!("Skipping outcome for {}: {}", check_name, e),
            }
        }
        Ok(outcomes)
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn load_history(
        &self,
        check_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, MonitorError> {
        let rows: Vec<BaselineWindowRow> = sqlx::query_as(
            "SELECT window_end_ms, rate
             FROM baseline_windows
             WHERE check_name = ? AND window_end_ms > ?
             ORDER BY window_end_ms, seq",
        )
        .bind(check_name)
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter()
            .map(|r| Ok((from_millis(r.window_end_ms)?, r.rate)))
            .collect()
    }

    async fn append_window(
        &self,
        check_name: &str,
        window_end: DateTime<Utc>,
        rate: f64,
        prune_before: DateTime<Utc>,
    ) -> Result<(), MonitorError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        // Re-evaluating a closed window keeps the first recorded rate
        sqlx::query(
            "INSERT OR IGNORE INTO baseline_windows (check_name, window_end_ms, rate, seq)
             VALUES (?, ?, ?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM baseline_windows))",
        )
        .bind(check_name)
        .bind(window_end.timestamp_millis())
        .bind(rate)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        sqlx::query("DELETE FROM baseline_windows WHERE check_name = ? AND window_end_ms < ?")
            .bind(check_name)
            .bind(prune_before.timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn load_alert_state(&self, check_name: &str) -> Result<Option<AlertState>, MonitorError> {
        let row: Option<AlertStateRow> = sqlx::query_as(
            "SELECT state, last_alert_at_ms, last_severity FROM alert_state WHERE check_name = ?",
        )
        .bind(check_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let state: CheckState = row.state.parse()?;
        let last_alert_at = row.last_alert_at_ms.map(from_millis).transpose()?;
        let last_severity: Option<Severity> =
            row.last_severity.as_deref().map(str::parse::<Severity>).transpose()?;

        Ok(Some(AlertState {
            state,
            last_alert_at,
            last_severity,
        }))
    }

    async fn save_alert_state(&self, check_name: &str, state: &AlertState) -> Result<(), MonitorError> {
        sqlx::query(
            "INSERT INTO alert_state (check_name, state, last_alert_at_ms, last_severity, updated_at)
             VALUES (?, ?, ?, ?, datetime('now'))
             ON CONFLICT(check_name) DO UPDATE SET
                state = excluded.state,
                last_alert_at_ms = excluded.last_alert_at_ms,
                last_severity = excluded.last_severity,
                updated_at = excluded.updated_at",
        )
        .bind(check_name)
        .bind(state.state.as_str())
        .bind(state.last_alert_at.map(|t| t.timestamp_millis()))
        .bind(state.last_severity.map(|s| s.as_str()))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }
}
