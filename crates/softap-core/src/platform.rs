//! Collaborator abstractions.
//!
//! Each trait is implemented once per platform:
//! - Host: file-backed store, directory-backed partition, simulated access
//!   point, axum transport (`softap-host`)
//! - ESP32: NVS flash, SPIFFS VFS, `EspWifi`, `EspHttpServer` (`softap-esp32`)
//!
//! All methods are synchronous to support embedded platforms.

use std::io::{self, Read};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::config::{ApConfig, HttpConfig, MountConfig};
use crate::error::{KvError, MountError, NetError, ServeError, SinkError, TransportError};
use crate::events::ApEvent;

// ============================================================================
// Persistent key-value store
// ============================================================================

/// Flash-backed key-value store (NVS on the device).
pub trait KeyValueStore {
    /// Initialize the store. May fail with an error that erasing fixes.
    fn init(&mut self) -> Result<(), KvError>;

    /// Wipe the whole partition.
    fn erase(&mut self) -> Result<(), KvError>;

    /// Read a string value. `Ok(None)` if the key is absent.
    fn get_str(&self, namespace: &str, key: &str) -> Result<Option<String>, KvError>;

    /// Write a string value.
    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), KvError>;
}

// ============================================================================
// Filesystem
// ============================================================================

/// Capacity of a mounted partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

/// A mounted filesystem exposing read access to absolute paths under the
/// mount point.
///
/// Implementations must tolerate concurrent `open` calls; the server only
/// ever reads.
pub trait FileSystem: Send + Sync + 'static {
    /// Open file handle. Dropping it releases the handle.
    type File: Read + Send;

    fn open(&self, path: &str) -> io::Result<Self::File>;

    fn info(&self) -> io::Result<FsInfo>;
}

/// Mounts a storage partition and hands back the mounted filesystem.
pub trait FilesystemMount {
    type Volume: FileSystem;

    fn mount(&mut self, config: &MountConfig) -> Result<Self::Volume, MountError>;
}

// ============================================================================
// Access point
// ============================================================================

/// Wireless access point manager.
pub trait AccessPoint {
    /// Subscribe to lifecycle events. Must be called before [`start`] so the
    /// `ApStarted` event is not missed.
    ///
    /// [`start`]: AccessPoint::start
    fn subscribe(&mut self) -> Result<Receiver<ApEvent>, NetError>;

    fn configure(&mut self, config: &ApConfig) -> Result<(), NetError>;

    fn start(&mut self) -> Result<(), NetError>;
}

// ============================================================================
// HTTP transport
// ============================================================================

/// HTTP request methods a handler can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }
}

/// Output side of one in-flight response.
pub trait ResponseSink {
    /// Set the `Content-Type` header. Must be called before the first chunk.
    fn set_content_type(&mut self, content_type: &'static str) -> Result<(), SinkError>;

    /// Send one body chunk. An empty chunk terminates the body.
    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), SinkError>;
}

/// A request handler the transport invokes once per matching request.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle the request for `uri` (path only, no query string).
    fn handle(&self, uri: &str, sink: &mut dyn ResponseSink) -> Result<(), ServeError>;
}

/// HTTP server that dispatches requests to registered handlers.
pub trait HttpTransport {
    fn start(&mut self, config: &HttpConfig) -> Result<(), TransportError>;

    /// Register `handler` for requests with `method` whose path matches the
    /// wildcard `pattern` (see [`crate::uri::matches_wildcard`]).
    fn register(
        &mut self,
        pattern: &str,
        method: Method,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), TransportError>;
}
