//! ObjectStoreTrait for pluggable backends
//!
//! Every backend (memory, journal, SQLite) implements this trait, and the
//! engine only ever talks to `Arc<dyn ObjectStoreTrait>`.

use crate::document::Document;
use crate::error::StoreError;

/// Trait for versioned object store backends
///
/// `put` is a compare-and-swap: the incoming document carries the version it
/// was read at (0 when new). The write succeeds only when that matches the
/// stored version, and the returned document carries `version + 1`.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ObjectStoreTrait: Send + Sync {
    /// Short backend name used in logs
    fn backend(&self) -> &'static str;

    /// Opens (or re-opens) the backing store
    async fn connect(&self) -> Result<(), StoreError>;

    /// Cheap liveness probe; never errors
    async fn is_connected(&self) -> bool;

    /// Drops the connection; later calls fail with `NoConnection` until `connect`
    async fn close(&self);

    /// Writes a new version of `uuid`, rejecting stale versions with `Conflict`
    async fn put(&self, collection: &str, uuid: &str, document: Document) -> Result<Document, StoreError>;

    /// Returns one document per uuid, the highest version
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Returns the highest version of `uuid`, if any
    async fn get_by_uuid(&self, collection: &str, uuid: &str) -> Result<Option<Document>, StoreError>;

    /// Removes every version of `uuid`; false when nothing was stored
    async fn remove(&self, collection: &str, uuid: &str) -> Result<bool, StoreError>;

    /// Empties a collection
    async fn remove_all(&self, collection: &str) -> Result<bool, StoreError>;

    /// Puts each document in turn. Not atomic across documents: the first
    /// failure is returned and earlier writes stay committed.
    async fn multi_put(
        &self,
        collection: &str,
        documents: Vec<(String, Document)>,
    ) -> Result<Vec<Document>, StoreError> {
        let mut stored = Vec::with_capacity(documents.len());
        for (uuid, document) in documents {
            stored.push(self.put(collection, &uuid, document).await?);
        }
        Ok(stored)
    }
}
