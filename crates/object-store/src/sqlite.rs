//! SQLite relational backend
//!
//! One table per collection: `(id TEXT PRIMARY KEY, version INTEGER, value TEXT)`.
//! Updates are compare-and-swap (`UPDATE ... WHERE id = ? AND version = ?`);
//! zero affected rows means another writer got there first.

use crate::document::{Document, document_version, stamp, validate_collection};
use crate::error::StoreError;
use crate::store_trait::ObjectStoreTrait;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// SQLite-backed object store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
    connection: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    /// Create a store for the database file at `path`; call `connect` before use
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
            connection: Arc::new(Mutex::new(None)),
        }
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `op` against the open connection on the blocking pool
    async fn with_connection<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let mut guard = connection.lock().map_err(|e| {
                StoreError::NoConnection(format!("sqlite connection lock poisoned: {e}"))
            })?;
            let conn = guard
                .as_mut()
                .ok_or_else(|| StoreError::NoConnection("sqlite store is not connected".to_string()))?;
            op(conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn ensure_table(conn: &Connection, collection: &str) -> Result<(), StoreError> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {collection} (
                id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                value TEXT NOT NULL
            )"
        ),
        [],
    )?;
    Ok(())
}

fn to_sql_version(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|e| StoreError::InvalidDocument(format!("version {version}: {e}")))
}

fn stored_version(tx: &Transaction<'_>, collection: &str, uuid: &str) -> Result<u64, StoreError> {
    let version: Option<i64> = tx
        .query_row(
            &format!("SELECT version FROM {collection} WHERE id = ?1"),
            params![uuid],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.and_then(|v| u64::try_from(v).ok()).unwrap_or(0))
}

fn decode(value: &str) -> Result<Document, StoreError> {
    Ok(serde_json::from_str::<Document>(value)?)
}

#[async_trait::async_trait]
impl ObjectStoreTrait for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn connect(&self) -> Result<(), StoreError> {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = Connection::open(&path).map_err(|e| {
                StoreError::NoConnection(format!("cannot open {}: {}", path.display(), e))
            })?;
            conn.busy_timeout(busy_timeout)?;
            let mut guard = connection.lock().map_err(|e| {
                StoreError::NoConnection(format!("sqlite connection lock poisoned: {e}"))
            })?;
            *guard = Some(conn);
            debug!("SQLite store connected at {}", path.display());
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn is_connected(&self) -> bool {
        self.with_connection(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(StoreError::from)
        })
        .await
        .is_ok()
    }

    async fn close(&self) {
        if let Ok(mut guard) = self.connection.lock() {
            *guard = None;
        }
    }

    async fn put(&self, collection: &str, uuid: &str, document: Document) -> Result<Document, StoreError> {
        validate_collection(collection)?;
        let collection = collection.to_string();
        let uuid = uuid.to_string();
        self.with_connection(move |conn| {
            let expected = document_version(&document);
            let stored = stamp(document, &uuid, expected + 1);
            let value = serde_json::to_string(&stored)?;
            let tx = conn.transaction()?;
            ensure_table(&tx, &collection)?;
            let rows = if expected == 0 {
                tx.execute(
                    &format!(
                        "INSERT OR IGNORE INTO {collection} (id, version, value) VALUES (?1, 1, ?2)"
                    ),
                    params![uuid, value],
                )?
            } else {
                tx.execute(
                    &format!(
                        "UPDATE {collection} SET version = version + 1, value = ?3
                         WHERE id = ?1 AND version = ?2"
                    ),
                    params![uuid, to_sql_version(expected)?, value],
                )?
            };
            if rows == 0 {
                let actual = stored_version(&tx, &collection, &uuid)?;
                return Err(StoreError::conflict(&collection, &uuid, expected, actual));
            }
            tx.commit()?;
            Ok(stored)
        })
        .await
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        validate_collection(collection)?;
        let collection = collection.to_string();
        self.with_connection(move |conn| {
            ensure_table(conn, &collection)?;
            let mut stmt = conn.prepare(&format!("SELECT value FROM {collection} ORDER BY id"))?;
            let values = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            values.iter().map(|value| decode(value)).collect()
        })
        .await
    }

    async fn get_by_uuid(&self, collection: &str, uuid: &str) -> Result<Option<Document>, StoreError> {
        validate_collection(collection)?;
        let collection = collection.to_string();
        let uuid = uuid.to_string();
        self.with_connection(move |conn| {
            ensure_table(conn, &collection)?;
            let value: Option<String> = conn
                .query_row(
                    &format!("SELECT value FROM {collection} WHERE id = ?1"),
                    params![uuid],
                    |row| row.get(0),
                )
                .optional()?;
            value.as_deref().map(decode).transpose()
        })
        .await
    }

    async fn remove(&self, collection: &str, uuid: &str) -> Result<bool, StoreError> {
        validate_collection(collection)?;
        let collection = collection.to_string();
        let uuid = uuid.to_string();
        self.with_connection(move |conn| {
            ensure_table(conn, &collection)?;
            let rows = conn.execute(
                &format!("DELETE FROM {collection} WHERE id = ?1"),
                params![uuid],
            )?;
            Ok(rows > 0)
        })
        .await
    }

    async fn remove_all(&self, collection: &str) -> Result<bool, StoreError> {
        validate_collection(collection)?;
        let collection = collection.to_string();
        self.with_connection(move |conn| {
            ensure_table(conn, &collection)?;
            conn.execute(&format!("DELETE FROM {collection}"), [])?;
            Ok(true)
        })
        .await
    }
}
