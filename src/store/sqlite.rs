//! SQLite implementation of the Log Store.
//!
//! One table (`execution_log`), one writer per flow at a time.
//! `flow_id` is stored as its canonical string form so the table
//! matches the `TEXT` schema the migrations declare.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Invocation, InvocationStatus};

use super::LogStore;

/// SQLite-backed [`LogStore`].
///
/// Construct with [`SqliteLogStore::connect`] (runs migrations) or wrap
/// an already-migrated pool with [`SqliteLogStore::new`].
#[derive(Clone)]
pub struct SqliteLogStore {
    pool: SqlitePool,
}

impl SqliteLogStore {
    /// Wrap an existing, already-migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `connection_string` and run the bundled migrations.
    ///
    /// `connection_string` follows sqlx's SQLite URL form, e.g.
    /// `sqlite://flows.db?mode=rwc` or `sqlite::memory:`.
    pub async fn connect(connection_string: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(connection_string)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_invocation(row: sqlx::sqlite::SqliteRow) -> Result<Invocation, StoreError> {
    let flow_id: String = row.try_get("flow_id")?;
    let status: String = row.try_get("status")?;
    let parameters: Option<String> = row.try_get("parameters")?;
    let return_value: Option<String> = row.try_get("return_value")?;

    Ok(Invocation {
        flow_id: Uuid::parse_str(&flow_id).map_err(|e| StoreError::Unavailable(e.to_string()))?,
        step: row.try_get("step")?,
        timestamp_ms: row.try_get("timestamp")?,
        class_name: row.try_get("class_name")?,
        method_name: row.try_get("method_name")?,
        delay_ms: row.try_get("delay_ms")?,
        status: InvocationStatus::parse(&status)
            .ok_or_else(|| StoreError::Unavailable(format!("unknown status {status}")))?,
        attempts: row.try_get("attempts")?,
        parameters: parameters.map(|p| serde_json::from_str(&p)).transpose()?,
        return_value: return_value.map(|r| serde_json::from_str(&r)).transpose()?,
    })
}

#[async_trait]
impl LogStore for SqliteLogStore {
    #[instrument(skip(self))]
    async fn get_invocation(&self, flow_id: Uuid, step: i64) -> Result<Option<Invocation>, StoreError> {
        let row = sqlx::query("SELECT * FROM execution_log WHERE flow_id = ?1 AND step = ?2")
            .bind(flow_id.to_string())
            .bind(step)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_invocation).transpose()
    }

    #[instrument(skip(self))]
    async fn get_latest_invocation(&self, flow_id: Uuid) -> Result<Option<Invocation>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM execution_log WHERE flow_id = ?1 ORDER BY step DESC LIMIT 1",
        )
        .bind(flow_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_invocation).transpose()
    }

    #[instrument(skip(self, parameters))]
    async fn log_invocation_start(
        &self,
        flow_id: Uuid,
        step: i64,
        class_name: &str,
        method_name: &str,
        delay_ms: Option<i64>,
        status: InvocationStatus,
        parameters: Option<serde_json::Value>,
    ) -> Result<Invocation, StoreError> {
        let timestamp_ms = Utc::now().timestamp_millis();
        let parameters = parameters.map(|p| serde_json::to_string(&p)).transpose()?;

        let row = sqlx::query(
            r#"
            INSERT INTO execution_log
                (flow_id, step, timestamp, class_name, method_name, delay_ms, status, attempts, parameters, return_value)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, NULL)
            ON CONFLICT(flow_id, step) DO UPDATE SET attempts = attempts + 1
            RETURNING *
            "#,
        )
        .bind(flow_id.to_string())
        .bind(step)
        .bind(timestamp_ms)
        .bind(class_name)
        .bind(method_name)
        .bind(delay_ms)
        .bind(status.as_str())
        .bind(parameters)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(%flow_id, step, "log_invocation_start failed: {e}");
            StoreError::from(e)
        })?;

        let invocation = row_to_invocation(row)?;
        debug!(%flow_id, step, attempts = invocation.attempts, "invocation start logged");
        Ok(invocation)
    }

    #[instrument(skip(self, return_value))]
    async fn log_invocation_completion(
        &self,
        flow_id: Uuid,
        step: i64,
        return_value: Option<serde_json::Value>,
    ) -> Result<Invocation, StoreError> {
        let return_value = return_value.map(|r| serde_json::to_string(&r)).transpose()?;

        let row = sqlx::query(
            r#"
            UPDATE execution_log
            SET status = 'complete', return_value = ?3
            WHERE flow_id = ?1 AND step = ?2
            RETURNING *
            "#,
        )
        .bind(flow_id.to_string())
        .bind(step)
        .bind(return_value)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::MissingCompletionTarget { flow_id, step })?;

        row_to_invocation(row)
    }

    #[instrument(skip(self))]
    async fn get_incomplete_flows(&self) -> Result<Vec<Invocation>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM execution_log WHERE step = 0 AND status != 'complete' ORDER BY timestamp ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_invocation).collect()
    }

    /// Administrative/test-only: drop `execution_log` (and the sqlx
    /// migration bookkeeping table, so the table is recreated rather
    /// than left missing) and re-run the bundled migration — a real
    /// drop-and-recreate, not a `DELETE FROM` that would leave the
    /// table (and any out-of-band schema changes to it) in place.
    async fn reset(&self) -> Result<(), StoreError> {
        sqlx::query("DROP TABLE IF EXISTS execution_log").execute(&self.pool).await?;
        sqlx::query("DROP TABLE IF EXISTS _sqlx_migrations").execute(&self.pool).await?;
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
