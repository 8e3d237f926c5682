//! Document helpers shared by every backend.

use crate::error::StoreError;
use serde_json::{Map, Value};

/// A stored object: a flat JSON map carrying at least `uuid` and `version`
pub type Document = Map<String, Value>;

/// Key holding the object identifier
pub const UUID_FIELD: &str = "uuid";

/// Key holding the per-uuid version counter
pub const VERSION_FIELD: &str = "version";

/// Returns the version carried by a document (0 when never stored)
pub fn document_version(document: &Document) -> u64 {
    document
        .get(VERSION_FIELD)
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Stamps uuid and version onto a document about to be written
pub(crate) fn stamp(mut document: Document, uuid: &str, version: u64) -> Document {
    document.insert(UUID_FIELD.to_string(), Value::String(uuid.to_string()));
    document.insert(VERSION_FIELD.to_string(), Value::from(version));
    document
}

/// Collection names double as file and table names, so keep them to `[a-z_][a-z0-9_]*`
pub(crate) fn validate_collection(collection: &str) -> Result<(), StoreError> {
    let mut chars = collection.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => {
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(collection.to_string()))
    }
}
