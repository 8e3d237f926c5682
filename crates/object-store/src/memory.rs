//! In-memory backend
//!
//! Keeps every collection in process memory. Used by tests and by servers
//! started with `persist_mode: memory`.

use crate::document::{Document, document_version, stamp, validate_collection};
use crate::error::StoreError;
use crate::store_trait::ObjectStoreTrait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// In-memory object store
///
/// Clones share the same storage, so a clone handed to a test can observe
/// (or disrupt) what the engine writes.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    // collection -> uuid -> latest document
    collections: Arc<Mutex<HashMap<String, BTreeMap<String, Document>>>>,
    connected: Arc<AtomicBool>,
    // when false, connect() fails (simulates an unreachable store)
    reachable: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create a new, connected, empty store
    pub fn new() -> Self {
        Self {
            collections: Arc::new(Mutex::new(HashMap::new())),
            connected: Arc::new(AtomicBool::new(true)),
            reachable: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Marks the store reachable or not; an unreachable store also drops its connection
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        if !reachable {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    fn check_connected(&self) -> Result<(), StoreError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::NoConnection("memory store is disconnected".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ObjectStoreTrait for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> Result<(), StoreError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(StoreError::NoConnection("memory store is unreachable".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn put(&self, collection: &str, uuid: &str, document: Document) -> Result<Document, StoreError> {
        self.check_connected()?;
        validate_collection(collection)?;
        let mut collections = self.collections.lock().await;
        let documents = collections.entry(collection.to_string()).or_default();
        let current = documents.get(uuid).map_or(0, document_version);
        let expected = document_version(&document);
        if expected != current {
            return Err(StoreError::conflict(collection, uuid, expected, current));
        }
        let stored = stamp(document, uuid, current + 1);
        documents.insert(uuid.to_string(), stored.clone());
        Ok(stored)
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.check_connected()?;
        validate_collection(collection)?;
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_by_uuid(&self, collection: &str, uuid: &str) -> Result<Option<Document>, StoreError> {
        self.check_connected()?;
        validate_collection(collection)?;
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.get(uuid))
            .cloned())
    }

    async fn remove(&self, collection: &str, uuid: &str) -> Result<bool, StoreError> {
        self.check_connected()?;
        validate_collection(collection)?;
        let mut collections = self.collections.lock().await;
        Ok(collections
            .get_mut(collection)
            .is_some_and(|documents| documents.remove(uuid).is_some()))
    }

    async fn remove_all(&self, collection: &str) -> Result<bool, StoreError> {
        self.check_connected()?;
        validate_collection(collection)?;
        self.collections.lock().await.remove(collection);
        Ok(true)
    }
}
