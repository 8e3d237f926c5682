//! Persistence controller
//!
//! Owns the active backend and the explicit check-and-reconnect step that
//! callers run before each batch of operations. Backends may drop their
//! connection silently between requests, so liveness is never assumed.

use crate::error::StoreError;
use crate::journal::JournalStore;
use crate::memory::MemoryStore;
use crate::sqlite::SqliteStore;
use crate::store_trait::ObjectStoreTrait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistMode {
    /// Process memory; nothing survives a restart
    #[default]
    Memory,
    /// Append-only JSON-lines journals under a directory
    Journal,
    /// SQLite database file
    Sqlite,
}

impl fmt::Display for PersistMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Journal => write!(f, "journal"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for PersistMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "journal" => Ok(Self::Journal),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(StoreError::UnknownMode(other.to_string())),
        }
    }
}

/// Builds and connects the backend for `mode`
///
/// `path` is the journal directory or the SQLite file (ignored for memory).
pub async fn open_store(
    mode: PersistMode,
    path: &Path,
    timeout: Duration,
) -> Result<Arc<dyn ObjectStoreTrait>, StoreError> {
    let store: Arc<dyn ObjectStoreTrait> = match mode {
        PersistMode::Memory => Arc::new(MemoryStore::new()),
        PersistMode::Journal => Arc::new(JournalStore::new(path)),
        PersistMode::Sqlite => Arc::new(SqliteStore::new(path, timeout)),
    };
    store.connect().await?;
    info!("Opened {} object store", store.backend());
    Ok(store)
}

/// Wraps the active backend with connection management
#[derive(Clone)]
pub struct PersistController {
    store: Arc<dyn ObjectStoreTrait>,
}

impl fmt::Debug for PersistController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistController")
            .field("backend", &self.store.backend())
            .finish()
    }
}

impl PersistController {
    /// Creates a controller around an already-built backend
    pub fn new(store: Arc<dyn ObjectStoreTrait>) -> Self {
        Self { store }
    }

    /// The backend, for issuing operations after `ensure_connected`
    pub fn store(&self) -> &Arc<dyn ObjectStoreTrait> {
        &self.store
    }

    /// Checks liveness and reconnects once if needed
    ///
    /// Returns `NoConnection` when the backend stays unreachable; the caller
    /// aborts the current request rather than retrying.
    pub async fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.store.is_connected().await {
            return Ok(());
        }
        warn!("{} store connection lost, reconnecting", self.store.backend());
        if let Err(e) = self.store.connect().await {
            warn!("Reconnect to {} store failed: {}", self.store.backend(), e);
            return Err(StoreError::NoConnection(format!(
                "{} store unavailable: {}",
                self.store.backend(),
                e
            )));
        }
        if self.store.is_connected().await {
            info!("Reconnected to {} store", self.store.backend());
            Ok(())
        } else {
            Err(StoreError::NoConnection(format!(
                "{} store unavailable after reconnect",
                self.store.backend()
            )))
        }
    }
}
