//! Unified error types for pagemirror.
//!
//! A cache miss on the read path is not an error; see `PageData::NotReady`
//! in the tasks crate. Everything here is either a genuine 404 for the
//! caller or a failure that voids the task it happened in.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the pagemirror pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The version is cached but does not contain the requested path.
    #[error("FILE_NOT_FOUND: {0}")]
    FileNotFound(String),

    /// Forge API or download failure (network, non-200 status, pagination).
    #[error("UPSTREAM_FAILURE: {0}")]
    Upstream(String),

    /// Downloaded bytes do not hash to the declared content hash.
    #[error("INTEGRITY_FAILURE: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// Malformed task data, e.g. unparsable release identifiers.
    #[error("CONFIGURATION_FAILURE: {0}")]
    Configuration(String),

    /// A queued payload could not be decoded into a task.
    #[error("INVALID_JOB: {0}")]
    InvalidJob(String),

    /// Invalid input parameters from a caller.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No index entry for the given repository.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// A stored value could not be encoded or decoded.
    #[error("STORE_ERROR: codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// The archive could not be opened or an entry could not be read.
    #[error("ARCHIVE_ERROR: {0}")]
    Archive(String),

    /// Local file I/O failed (temporary download files).
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// The namespace was closed, or was never opened.
    #[error("STORE_ERROR: namespace {0} is closed")]
    StoreClosed(String),

    /// A namespace with this name is already registered on the shared handle.
    #[error("STORE_ERROR: namespace {0} is already open")]
    NamespaceInUse(String),

    /// The queue has been shut down.
    #[error("QUEUE_ERROR: queue is closed")]
    QueueClosed,

    /// No queue is registered under this name.
    #[error("QUEUE_ERROR: unknown queue {0}")]
    UnknownQueue(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) | Error::InvalidJob(_) => -32602,
            Error::FileNotFound(_) => -32001,
            Error::CacheMiss(_) => -32002,
            Error::Upstream(_) => -32003,
            Error::Integrity { .. } => -32004,
            Error::Configuration(_) => -32005,
            Error::Archive(_) => -32006,
            Error::QueueClosed | Error::UnknownQueue(_) => -32007,
            Error::Codec(_)
            | Error::Io(_)
            | Error::Database(_)
            | Error::MigrationFailed(_)
            | Error::StoreClosed(_)
            | Error::NamespaceInUse(_) => -32000,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
