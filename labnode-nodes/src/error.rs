//! Error types for node lifecycle operations.

use labnode_runtime::RuntimeError;
use thiserror::Error;

/// Errors that can occur while driving a node through its lifecycle.
#[derive(Error, Debug)]
pub enum NodeError {
    /// A kind name was registered twice.
    #[error("node kind {0:?} is already registered")]
    DuplicateKind(String),

    /// No kind with this name is registered.
    #[error("unknown node kind {0:?}")]
    UnknownKind(String),

    /// The host bridge a bridge node refers to does not exist.
    #[error("bridge {name:?} referenced in topology does not exist: {reason}")]
    BridgeNotFound { name: String, reason: String },

    /// An endpoint name violates the naming rules of the kind.
    #[error("{kind} interface name {name:?} doesn't match the required pattern. {hint}")]
    InvalidInterfaceName {
        kind: String,
        name: String,
        hint: &'static str,
    },

    /// The host cannot satisfy the node's resource requirements.
    #[error("host requirements not met for node {node}: {reason}")]
    HostRequirements { node: String, reason: String },

    /// An external command exited unsuccessfully.
    #[error("{reason}: `{command}` returned: {output}")]
    Command {
        command: String,
        reason: String,
        output: String,
    },

    /// Filesystem or process spawning failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The kind has no notion of executing commands.
    #[error("exec operation is not supported for kind {kind:?}")]
    ExecNotSupported { kind: String },

    /// VM-backed node reported a failed boot.
    #[error("VM readiness wait failed for node {node}: {source}")]
    Readiness {
        node: String,
        #[source]
        source: RuntimeError,
    },

    /// The surrounding context was cancelled.
    #[error("operation cancelled for node {0}")]
    Cancelled(String),

    /// Runtime operation failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Hook needs a runtime but none was supplied at init.
    #[error("node {0} has no container runtime attached")]
    NoRuntime(String),

    /// Persisting the running configuration failed.
    #[error("failed to save configuration of {node}: {reason}")]
    SaveConfig { node: String, reason: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl NodeError {
    /// True when the operation is not applicable to the kind, as opposed to
    /// having been attempted and failed.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, NodeError::ExecNotSupported { .. })
    }

    /// True when the error stems from context cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NodeError::Cancelled(_))
    }
}

/// Result type alias for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
