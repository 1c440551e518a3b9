//! Durable checkpoint store: the single source of truth for "done".
//!
//! One SQLite table per stage maps item key → serialized result list. A row's
//! presence means that item is fully processed and is skipped on every later
//! run. Result lists are stored as a JSON array in the BLOB column; a plain
//! delimiter-join would corrupt any result string containing the delimiter,
//! so the encoding must carry its own sequence boundaries.
//!
//! A shared `fetch_failures` table records every target that was dropped from
//! a checkpointed item, so best-effort losses stay observable instead of
//! disappearing into a log file.

use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::models::{Aggregate, Stage, TargetFailure};

pub struct CheckpointStore {
    pool: SqlitePool,
    stage: Stage,
}

impl CheckpointStore {
    pub fn new(pool: SqlitePool, stage: Stage) -> Self {
        Self { pool, stage }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create this stage's checkpoint table and the shared failures table if
    /// absent. Idempotent; safe to call every run.
    pub async fn initialize(&self) -> Result<()> {
        // Table names come from the Stage enum, never from user input.
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                results BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            self.stage.table()
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fetch_failures (
                stage TEXT NOT NULL,
                key TEXT NOT NULL,
                target TEXT NOT NULL,
                error TEXT NOT NULL,
                attempted_at INTEGER NOT NULL,
                PRIMARY KEY (stage, key, target)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Whether a committed record exists for `key`, including records written
    /// by previous process invocations.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT 1 FROM {} WHERE key = ?",
            self.stage.table()
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    /// Atomically persist one item's results, replacing any prior record for
    /// the key. Committed before returning: a crash immediately after this
    /// call never loses the record.
    pub async fn upsert(&self, key: &str, results: &[String]) -> Result<()> {
        let encoded = encode_results(results)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (key, results, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                results = excluded.results,
                updated_at = excluded.updated_at
            "#,
            self.stage.table()
        ))
        .bind(key)
        .bind(encoded)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Every committed record, used once at startup to seed the aggregate.
    pub async fn load_all(&self) -> Result<Aggregate> {
        let rows = sqlx::query(&format!(
            "SELECT key, results FROM {} ORDER BY key",
            self.stage.table()
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut aggregate = Aggregate::new();
        for row in rows {
            let key: String = row.get("key");
            let blob: Vec<u8> = row.get("results");
            aggregate.insert(key, decode_results(&blob)?);
        }
        Ok(aggregate)
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.stage.table()))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Record the targets dropped from a completed item. Last write wins per
    /// (stage, key, target) so retried runs do not pile up duplicates.
    pub async fn record_failures(&self, key: &str, failures: &[TargetFailure]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        for failure in failures {
            sqlx::query(
                r#"
                INSERT INTO fetch_failures (stage, key, target, error, attempted_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(stage, key, target) DO UPDATE SET
                    error = excluded.error,
                    attempted_at = excluded.attempted_at
                "#,
            )
            .bind(self.stage.label())
            .bind(key)
            .bind(&failure.target)
            .bind(&failure.error)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

/// Encode a result list with unambiguous sequence boundaries (JSON array).
pub fn encode_results(results: &[String]) -> Result<Vec<u8>> {
    serde_json::to_vec(results).map_err(|e| Error::Encode(format!("checkpoint record: {}", e)))
}

/// Decode a stored result list. Fails loudly on a corrupt record rather than
/// silently truncating it.
pub fn decode_results(blob: &[u8]) -> Result<Vec<String>> {
    serde_json::from_slice(blob).map_err(|e| Error::Encode(format!("checkpoint record: {}", e)))
}
