//! Append-only journal backend
//!
//! Each collection lives in `<root>/<collection>.jsonl`. A write appends one
//! record line carrying the new version; existing lines are never edited in
//! place. Reads keep the highest version per uuid, and `get_all` compacts the
//! file (tmp file then rename) once superseded records outnumber live ones.

use crate::document::{Document, document_version, stamp, validate_collection};
use crate::error::StoreError;
use crate::store_trait::ObjectStoreTrait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One line of a collection journal
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalRecord {
    uuid: String,
    version: u64,
    document: Document,
}

/// JSON-lines document store
#[derive(Debug, Clone)]
pub struct JournalStore {
    root: PathBuf,
    // serializes read-check-append so the version check is atomic in-process
    lock: Arc<Mutex<()>>,
    connected: Arc<AtomicBool>,
}

impl JournalStore {
    /// Create a store rooted at `root`; call `connect` before use
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Arc::new(Mutex::new(())),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Directory holding the journals
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn journal_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.jsonl"))
    }

    fn check_connected(&self) -> Result<(), StoreError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::NoConnection(format!(
                "journal store at {} is not connected",
                self.root.display()
            )))
        }
    }

    /// Reads every record of a collection. A final record that does not
    /// parse is the tail of an interrupted append: it is logged and cut off
    /// the file. A bad record before the last one is an error.
    async fn load(&self, collection: &str) -> Result<Vec<JournalRecord>, StoreError> {
        let path = self.journal_path(collection);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        let mut offset = 0;
        for (index, raw) in contents.split_inclusive('\n').enumerate() {
            let start = offset;
            offset += raw.len();
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) if contents[offset..].trim().is_empty() => {
                    warn!(
                        "{}:{}: dropping torn final record: {}",
                        path.display(),
                        index + 1,
                        e
                    );
                    truncate(&path, start).await?;
                    break;
                }
                Err(e) => {
                    return Err(StoreError::InvalidDocument(format!(
                        "{}:{}: {}",
                        path.display(),
                        index + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    async fn append(&self, collection: &str, record: &JournalRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.journal_path(collection))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn rewrite(&self, collection: &str, records: &BTreeMap<String, JournalRecord>) -> Result<(), StoreError> {
        let path = self.journal_path(collection);
        let tmp = path.with_extension("jsonl.tmp");
        let mut contents = String::new();
        for record in records.values() {
            contents.push_str(&serde_json::to_string(record)?);
            contents.push('\n');
        }
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

async fn truncate(path: &Path, len: usize) -> Result<(), StoreError> {
    let len = u64::try_from(len)
        .map_err(|e| StoreError::InvalidDocument(format!("{}: {}", path.display(), e)))?;
    let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    file.set_len(len).await?;
    Ok(())
}

/// Keeps the highest version per uuid
fn latest(records: Vec<JournalRecord>) -> BTreeMap<String, JournalRecord> {
    let mut latest: BTreeMap<String, JournalRecord> = BTreeMap::new();
    for record in records {
        let newer = latest
            .get(&record.uuid)
            .is_none_or(|current| record.version > current.version);
        if newer {
            latest.insert(record.uuid.clone(), record);
        }
    }
    latest
}

#[async_trait::async_trait]
impl ObjectStoreTrait for JournalStore {
    fn backend(&self) -> &'static str {
        "journal"
    }

    async fn connect(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            StoreError::NoConnection(format!("cannot open {}: {}", self.root.display(), e))
        })?;
        self.connected.store(true, Ordering::SeqCst);
        debug!("Journal store connected at {}", self.root.display());
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        tokio::fs::metadata(&self.root)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn put(&self, collection: &str, uuid: &str, document: Document) -> Result<Document, StoreError> {
        self.check_connected()?;
        validate_collection(collection)?;
        let _guard = self.lock.lock().await;
        let records = self.load(collection).await?;
        let current = records
            .iter()
            .filter(|record| record.uuid == uuid)
            .map(|record| record.version)
            .max()
            .unwrap_or(0);
        let expected = document_version(&document);
        if expected != current {
            return Err(StoreError::conflict(collection, uuid, expected, current));
        }
        let stored = stamp(document, uuid, current + 1);
        let record = JournalRecord {
            uuid: uuid.to_string(),
            version: current + 1,
            document: stored.clone(),
        };
        self.append(collection, &record).await?;
        Ok(stored)
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.check_connected()?;
        validate_collection(collection)?;
        let _guard = self.lock.lock().await;
        let records = self.load(collection).await?;
        let total = records.len();
        let latest = latest(records);
        // superseded versions are pruned lazily; failure here only costs disk space
        if total > latest.len() * 2 {
            match self.rewrite(collection, &latest).await {
                Ok(()) => debug!(
                    "Compacted {} journal: {} records -> {}",
                    collection,
                    total,
                    latest.len()
                ),
                Err(e) => warn!("Failed to compact {} journal: {}", collection, e),
            }
        }
        Ok(latest.into_values().map(|record| record.document).collect())
    }

    async fn get_by_uuid(&self, collection: &str, uuid: &str) -> Result<Option<Document>, StoreError> {
        self.check_connected()?;
        validate_collection(collection)?;
        let _guard = self.lock.lock().await;
        let records = self.load(collection).await?;
        Ok(records
            .into_iter()
            .filter(|record| record.uuid == uuid)
            .max_by_key(|record| record.version)
            .map(|record| record.document))
    }

    async fn remove(&self, collection: &str, uuid: &str) -> Result<bool, StoreError> {
        self.check_connected()?;
        validate_collection(collection)?;
        let _guard = self.lock.lock().await;
        let mut latest = latest(self.load(collection).await?);
        if latest.remove(uuid).is_none() {
            return Ok(false);
        }
        self.rewrite(collection, &latest).await?;
        Ok(true)
    }

    async fn remove_all(&self, collection: &str) -> Result<bool, StoreError> {
        self.check_connected()?;
        validate_collection(collection)?;
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(self.journal_path(collection)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}
