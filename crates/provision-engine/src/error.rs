//! Engine errors
//!
//! Every variant maps to a stable machine-readable kind through
//! [`EngineError::kind`]; the HTTP layer turns kinds into status codes.

use object_store::StoreError;
use provision_model::ModelError;
use thiserror::Error;

/// Errors that can occur while serving provisioning requests
#[derive(Debug, Error)]
pub enum EngineError {
    /// Object store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Domain model error
    #[error("{0}")]
    Model(#[from] ModelError),

    /// Required argument absent
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    /// Argument present but not acceptable
    #[error("Input error: {0}")]
    InputError(String),

    /// Uuid does not resolve to an object
    #[error("Invalid UUID: {0}")]
    InvalidUuid(String),

    /// Unknown or hidden policy template
    #[error("Invalid policy template: {0}")]
    InvalidPolicyTemplate(String),

    /// Active model uuid missing or stale
    #[error("Active model invalid: {0}")]
    ActiveModelInvalid(String),

    /// Callback namespace not handled by the model
    #[error("No callback found: {0}")]
    NoCallbackFound(String),

    /// External command (ipmitool, ssh) failed or timed out
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal invariant broken (e.g. malformed transition table)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration file I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file parse
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl EngineError {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store(StoreError::NoConnection(_)) => "no_connection",
            Self::Store(StoreError::Conflict(_)) => "conflict",
            Self::Store(_) => "store_error",
            Self::Model(ModelError::InvalidMetadata(_)) => "invalid_metadata",
            Self::Model(ModelError::MissingMetadata(_)) => "missing_metadata",
            Self::Model(ModelError::UnknownType(_)) => "unknown_type",
            Self::Model(ModelError::InputError(_) | ModelError::InvalidMac(_)) => "input_error",
            Self::Model(_) => "internal_error",
            Self::MissingArgument(_) => "missing_argument",
            Self::InputError(_) => "input_error",
            Self::InvalidUuid(_) => "invalid_uuid",
            Self::InvalidPolicyTemplate(_) => "invalid_policy_template",
            Self::ActiveModelInvalid(_) => "active_model_invalid",
            Self::NoCallbackFound(_) => "no_callback_found",
            Self::CommandFailed(_) => "command_failed",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Internal(_) | Self::Io(_) | Self::Yaml(_) => "internal_error",
        }
    }

    /// Short human message without the kind prefix
    pub fn message(&self) -> String {
        match self {
            Self::MissingArgument(m)
            | Self::InputError(m)
            | Self::InvalidUuid(m)
            | Self::InvalidPolicyTemplate(m)
            | Self::ActiveModelInvalid(m)
            | Self::NoCallbackFound(m)
            | Self::CommandFailed(m)
            | Self::InvalidConfig(m)
            | Self::Internal(m) => m.clone(),
            Self::Model(
                ModelError::InputError(m)
                | ModelError::InvalidMetadata(m)
                | ModelError::MissingMetadata(m),
            ) => m.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }

    /// Not-found style errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::InvalidUuid(_) | Self::ActiveModelInvalid(_))
    }
}
