//! Error types for kay.

use thiserror::Error;

/// Result type alias for kay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while moving items between storages.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration or option combination.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No source, sink or backend registered under this name.
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    /// The source storage could not be read or returned malformed items.
    #[error("Source read error: {0}")]
    SourceRead(String),

    /// A batch could not be committed to the target storage.
    #[error("Sink commit error: {0}")]
    SinkCommit(String),

    /// The target index or its alias could not be created.
    #[error("Index lifecycle error: {0}")]
    IndexLifecycle(String),

    /// The remote service could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A request exceeded the configured timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The remote service rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The remote service answered with a non-success status.
    #[error("{service} error {status}: {body}")]
    Status {
        /// Service name used in logs.
        service: String,
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The transfer was interrupted before the item could be enqueued.
    #[error("Transfer interrupted")]
    Interrupted,

    /// The relay reader is gone; nothing can be enqueued anymore.
    #[error("Relay closed")]
    RelayClosed,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Returns the HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
