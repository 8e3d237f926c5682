//! Domain model errors

use thiserror::Error;

/// Errors raised while validating or hydrating domain objects
#[derive(Debug, Error)]
pub enum ModelError {
    /// Stored type tag has no registered constructor
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// Document carries no type tag
    #[error("Document has no type tag")]
    MissingTypeTag,

    /// Document is not a JSON object
    #[error("Not an object: {0}")]
    NotAnObject(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid user-supplied value
    #[error("Input error: {0}")]
    InputError(String),

    /// Metadata value failed its validation pattern
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Required metadata absent and without default
    #[error("Missing metadata: {0}")]
    MissingMetadata(String),

    /// MAC address could not be parsed
    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),
}
