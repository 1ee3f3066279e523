//! Postgres snapshot store
//!
//! One row per storage key in `recipient_snapshots`.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{SnapshotStore, StoreResult};

#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
    key: String,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool, key: impl Into<String>) -> Self {
        Self {
            pool,
            key: key.into(),
        }
    }

    /// Create the snapshot table if it does not exist
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recipient_snapshots (
                storage_key TEXT PRIMARY KEY,
                payload JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Snapshot table verified: recipient_snapshots");
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    fn storage_key(&self) -> &str {
        &self.key
    }

    async fn read(&self) -> StoreResult<Option<String>> {
        let payload: Option<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT payload FROM recipient_snapshots
            WHERE storage_key = $1
            "#,
        )
        .bind(&self.key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payload.map(|value| value.to_string()))
    }

    async fn write(&self, payload: &str) -> StoreResult<()> {
        let value: serde_json::Value = serde_json::from_str(payload)?;

        sqlx::query(
            r#"
            INSERT INTO recipient_snapshots (storage_key, payload, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (storage_key)
            DO UPDATE SET payload = EXCLUDED.payload, updated_at = NOW()
            "#,
        )
        .bind(&self.key)
        .bind(&value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        sqlx::query("DELETE FROM recipient_snapshots WHERE storage_key = $1")
            .bind(&self.key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
