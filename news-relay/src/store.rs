use crate::config::CACHE_BULK_LIMIT;
use crate::executor::StepJournal;
use crate::traits::ContentCache;
use crate::types::{CacheEntry, RelayError, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// PostgreSQL-backed delivery cache and step journal.
///
/// Cache rows carry an `expires_at` timestamp. Reads ignore expired rows and
/// [`ContentCache::purge_expired`] removes them. Journal rows are deleted
/// when their run ends, or by age if the process died mid-run.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn setup_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content_cache (
                key TEXT PRIMARY KEY,
                value JSONB NOT NULL,
                expires_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS content_cache_expires_at ON content_cache (expires_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS step_journal (
                run_id TEXT NOT NULL,
                step TEXT NOT NULL,
                output JSONB NOT NULL,
                recorded_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                PRIMARY KEY (run_id, step)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS step_journal_recorded_at ON step_journal (recorded_at)")
            .execute(&self.pool)
            .await?;

        info!("Store schema ready");
        Ok(())
    }

}

#[async_trait]
impl ContentCache for PgStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query("SELECT value FROM content_cache WHERE key = $1 AND expires_at > NOW()")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let Json(entry): Json<CacheEntry> = row.try_get("value")?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn get_bulk(&self, keys: &[String]) -> Result<HashMap<String, Option<CacheEntry>>> {
        if keys.len() > CACHE_BULK_LIMIT {
            return Err(RelayError::BulkLimitExceeded {
                requested: keys.len(),
                limit: CACHE_BULK_LIMIT,
            });
        }

        let rows = sqlx::query(
            "SELECT key, value FROM content_cache WHERE key = ANY($1) AND expires_at > NOW()",
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;

        let mut found: HashMap<String, Option<CacheEntry>> =
            keys.iter().map(|key| (key.clone(), None)).collect();

        for row in rows {
            let key: String = row.try_get("key")?;
            let Json(entry): Json<CacheEntry> = row.try_get("value")?;
            found.insert(key, Some(entry));
        }

        Ok(found)
    }

    async fn put(&self, key: &str, value: &CacheEntry, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| RelayError::General(format!("TTL out of range: {}", e)))?;
        let expires_at = Utc::now() + ttl;

        sqlx::query(
            r#"
            INSERT INTO content_cache (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(Json(value))
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM content_cache WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            debug!("Purged {} expired cache rows", result.rows_affected());
        }
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StepJournal for PgStore {
    async fn load(&self, run_id: &str, step: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT output FROM step_journal WHERE run_id = $1 AND step = $2")
            .bind(run_id)
            .bind(step)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("output")?)),
            None => Ok(None),
        }
    }

    async fn record(&self, run_id: &str, step: &str, output: &serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO step_journal (run_id, step, output)
            VALUES ($1, $2, $3)
            ON CONFLICT (run_id, step) DO NOTHING
            "#,
        )
        .bind(run_id)
        .bind(step)
        .bind(output)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn forget(&self, run_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM step_journal WHERE run_id = $1")
            .bind(run_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn purge_older_than(&self, age: Duration) -> Result<u64> {
        let age = chrono::Duration::from_std(age)
            .map_err(|e| RelayError::General(format!("Journal age out of range: {}", e)))?;

        let result = sqlx::query("DELETE FROM step_journal WHERE recorded_at < $1")
            .bind(Utc::now() - age)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            debug!("Purged {} stale journal rows", result.rows_affected());
        }
        Ok(result.rows_affected())
    }
}
