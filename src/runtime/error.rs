//! Error types for the livemsg runtime
//!
//! Domain errors use thiserror, one enum per concern, with conversions into
//! the top-level `RuntimeError` at the public boundary.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level runtime error
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Render or commit errors
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Translation errors raised outside of a render call
    #[error("Translation error: {0}")]
    Translate(#[from] TranslateError),

    /// Errors from the external message host
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Initialization errors
    #[error("Initialization failed: {0}")]
    Init(String),
}

/// Structural limit named by a `CapacityExceeded` error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Number of embeds in one message
    Embeds,
    /// Number of action rows in one message
    Rows,
    /// Width units of controls inside one row
    ComponentsPerRow,
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Limit::Embeds => "embeds",
            Limit::Rows => "action rows",
            Limit::ComponentsPerRow => "components per row",
        };
        f.write_str(name)
    }
}

/// Errors produced while translating a snapshot into a message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    /// A structural limit of the host platform would be exceeded
    #[error("Too many {limit}: {actual} exceeds the maximum of {max}")]
    CapacityExceeded {
        /// Which limit was hit
        limit: Limit,
        /// Configured maximum
        max: usize,
        /// Count the snapshot would have produced
        actual: usize,
    },

    /// Two interactive nodes share a custom id
    #[error("Duplicate custom id '{0}'")]
    DuplicateIdentifier(String),

    /// A node appeared somewhere it cannot be placed
    #[error("Invalid nesting: {0}")]
    InvalidNesting(String),
}

/// Convenience result alias for translation
pub type TranslateResult<T> = std::result::Result<T, TranslateError>;

/// Errors reported by the external message host
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The operation failed on the remote side
    #[error("{operation} failed: {detail}")]
    OperationFailed {
        /// Operation name (send, edit, disable, delete)
        operation: &'static str,
        /// Error details
        detail: String,
    },

    /// The operation did not complete within the configured timeout
    #[error("{operation} timed out")]
    Timeout {
        /// Operation name
        operation: &'static str,
    },
}

/// Convenience result alias for host operations
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Errors delivered to callers of render, deactivate and destroy
///
/// Cloneable because one commit outcome is delivered to every request that
/// was coalesced into it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The snapshot could not be translated
    #[error(transparent)]
    Translate(#[from] TranslateError),

    /// The instance has been destroyed
    #[error("Instance {0} has been destroyed")]
    InstanceDestroyed(String),

    /// The instance was deactivated before this render was committed
    #[error("Instance {0} was deactivated before the render was committed")]
    InstanceDeactivated(String),

    /// The external edit, disable or delete failed
    #[error("Host operation failed: {0}")]
    HostOperationFailed(#[from] HostError),

    /// The commit driver stopped before reporting an outcome
    #[error("Commit abandoned before completion")]
    Abandoned,
}

/// Convenience result alias for render operations
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Reasons an interaction is dropped by the router
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// No active instance owns the referenced message
    #[error("No active instance owns message '{0}'")]
    UnknownInstance(String),

    /// The custom id is not in the instance's current handler table
    #[error("No live handler for custom id '{0}'")]
    StaleInteraction(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `max_instances` must be positive
    #[error("max_instances must be at least 1")]
    ZeroCapacity,

    /// Structural limits must be positive
    #[error("Message limit '{0}' must be at least 1")]
    ZeroLimit(&'static str),

    /// Invalid per-instance send options
    #[error("Invalid send options: {0}")]
    InvalidSendOptions(String),

    /// Config file could not be read or written
    #[error("Config file {path}: {source}")]
    File {
        /// Path of the config file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Config file contents are not valid
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias for configuration
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type using RuntimeError
pub type Result<T> = std::result::Result<T, RuntimeError>;
