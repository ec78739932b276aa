//! Error taxonomy.
//!
//! Startup errors are fatal and bubble up to a single handler in `main`.
//! Serve errors are scoped to one request and never affect other requests.

use std::io;
use thiserror::Error;

/// Errors reported by a key-value store backend.
#[derive(Debug, Error)]
pub enum KvError {
    /// The partition has no free pages left (or holds unusable data).
    #[error("key-value partition has no free pages")]
    NoFreePages,

    /// The partition was written by a newer storage format.
    #[error("key-value partition contains data in a newer format")]
    NewVersionFound,

    /// The store was used before `init` succeeded.
    #[error("key-value store is not initialized")]
    NotInitialized,

    /// Any other backend failure.
    #[error("key-value store error: {0}")]
    Backend(String),
}

impl KvError {
    /// Whether erasing the partition and initializing again may recover.
    pub fn is_recoverable_by_erase(&self) -> bool {
        matches!(self, KvError::NoFreePages | KvError::NewVersionFound)
    }
}

/// Errors reported while mounting or inspecting a filesystem partition.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("failed to mount partition at {base_path}: {reason}")]
    Mount { base_path: String, reason: String },

    #[error("failed to read partition info: {0}")]
    Info(#[source] io::Error),
}

/// Errors reported by the access-point manager.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("invalid access point configuration: {0}")]
    InvalidConfig(String),

    #[error("wifi driver error: {0}")]
    Driver(String),
}

/// Errors reported by the HTTP transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to start http server: {0}")]
    Start(String),

    #[error("http server is not running")]
    NotStarted,

    #[error("failed to register handler for {pattern}: {reason}")]
    Register { pattern: String, reason: String },
}

/// Fatal startup failures. Any of these halts the device.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("storage init failed: {0}")]
    Storage(#[from] KvError),

    #[error("filesystem mount failed: {0}")]
    FilesystemMount(#[from] MountError),

    #[error("network config failed: {0}")]
    NetworkConfig(#[from] NetError),

    #[error("http transport failed: {0}")]
    Transport(#[from] TransportError),
}

/// The response stream refused a chunk, usually because the client went away.
#[derive(Debug, Error)]
#[error("response stream closed: {0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Per-request failures of the static file server.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The resolved path does not exist or cannot be opened for reading.
    #[error("cannot open {path}")]
    NotFound {
        path: String,
        #[source]
        source: io::Error,
    },

    /// A chunk could not be delivered to the transport.
    #[error("failed to write chunk: {0}")]
    StreamWrite(#[from] SinkError),

    /// Reading the open file failed mid-stream.
    #[error("failed to read file: {0}")]
    Read(#[source] io::Error),
}

impl ServeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServeError::NotFound { .. })
    }
}
