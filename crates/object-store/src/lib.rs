//! Versioned Object Store
//!
//! Stores JSON documents keyed by `(collection, uuid)`. Every write bumps a
//! per-uuid `version` counter and is accepted only when the caller's document
//! still carries the version currently stored (compare-and-swap).
//!
//! # Example
//!
//! ```no_run
//! use object_store::{Document, MemoryStore, ObjectStoreTrait};
//!
//! # async fn example() -> Result<(), object_store::StoreError> {
//! let store = MemoryStore::new();
//! let mut doc = Document::new();
//! doc.insert("label".to_string(), "web".into());
//!
//! // First write: version 0 -> 1
//! let stored = store.put("policy", "abc", doc).await?;
//! assert_eq!(object_store::document_version(&stored), 1);
//!
//! # Ok(())
//! # }
//! ```
//!
//! # Backends
//!
//! - **Memory**: process-local maps, useful for tests and ephemeral servers
//! - **Journal**: append-only JSON-lines files, one per collection
//! - **SQLite**: one table per collection, `UPDATE ... WHERE version = ?`

pub mod controller;
pub mod document;
pub mod error;
pub mod journal;
pub mod memory;
pub mod sqlite;
#[path = "trait.rs"]
pub mod store_trait;

pub use controller::{PersistController, PersistMode, open_store};
pub use document::{Document, UUID_FIELD, VERSION_FIELD, document_version};
pub use error::StoreError;
pub use journal::JournalStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store_trait::ObjectStoreTrait;

#[cfg(test)]
mod memory_test;
#[cfg(test)]
mod sqlite_test;
