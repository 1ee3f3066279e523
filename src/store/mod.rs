//! Recipient list persistence
//!
//! The list is stored as one serialized payload under a fixed storage key,
//! overwritten on every change and read once at session start.

mod file;
mod memory;
mod postgres;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use postgres::PgSnapshotStore;

use async_trait::async_trait;

use crate::domain::Recipient;

/// Storage key used by earlier dashboard sessions
pub const DEFAULT_STORAGE_KEY: &str = "superfluid_recipients";

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in a snapshot store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key/value style storage for the serialized recipient list
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Name the payload is stored under
    fn storage_key(&self) -> &str;

    /// Stored payload, if any
    async fn read(&self) -> StoreResult<Option<String>>;

    /// Replace the stored payload
    async fn write(&self, payload: &str) -> StoreResult<()>;

    /// Remove the stored payload
    async fn clear(&self) -> StoreResult<()>;
}

/// Serialize a recipient list for storage
pub fn encode(recipients: &[Recipient]) -> StoreResult<String> {
    Ok(serde_json::to_string(recipients)?)
}

/// Deserialize a stored recipient list, back-filling missing fields.
///
/// The payload itself must be a JSON list. Entries that cannot be read as a
/// recipient (missing or non-string address) are skipped and the rest are kept.
pub fn decode(payload: &str) -> StoreResult<Vec<Recipient>> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(payload)?;

    let recipients = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(recipient) => Some(recipient),
            Err(e) => {
                tracing::warn!(index = index, error = %e, "Skipping unreadable stored recipient");
                None
            }
        })
        .collect();

    Ok(recipients)
}
