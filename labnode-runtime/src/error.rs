//! Error types for the container runtime abstraction.

use thiserror::Error;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Container was not found.
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    /// Failed to create a container.
    #[error("Failed to create container: {0}")]
    CreateFailed(String),

    /// Failed to start a container.
    #[error("Failed to start container: {0}")]
    StartFailed(String),

    /// Failed to execute a command inside a container.
    #[error("Exec failed: {0}")]
    ExecFailed(String),

    /// A VM-backed container reported a failed boot.
    #[error("VM boot failed: {0}")]
    VmBootFailed(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
