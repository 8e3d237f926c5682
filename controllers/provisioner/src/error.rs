//! Controller-specific error types.
//!
//! Startup and serving failures of the provisioning server. Request-level
//! failures never reach here; the API layer turns them into responses.

use provision_engine::EngineError;
use thiserror::Error;

/// Errors that can stop the provisioning server.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Engine wiring or store failure
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// A server or sweeper task ended unexpectedly
    #[error("Task failed: {0}")]
    Task(String),

    /// Listener bind or serve failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
