//! In-memory snapshot store, for tests and ephemeral sessions.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SnapshotStore, StoreResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    key: String,
    payload: RwLock<Option<String>>,
}

impl MemoryStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: RwLock::new(None),
        }
    }

    /// Store seeded with a payload, as if written by an earlier session
    pub fn with_payload(key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: RwLock::new(Some(payload.into())),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    fn storage_key(&self) -> &str {
        &self.key
    }

    async fn read(&self) -> StoreResult<Option<String>> {
        Ok(self.payload.read().await.clone())
    }

    async fn write(&self, payload: &str) -> StoreResult<()> {
        *self.payload.write().await = Some(payload.to_string());
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        *self.payload.write().await = None;
        Ok(())
    }
}
