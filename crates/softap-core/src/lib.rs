//! # softap-core
//!
//! Core of the access-point bootstrap: a static file server plus the
//! startup sequence that brings up its collaborators.
//!
//! This crate provides:
//! - The static file server (path resolution, MIME lookup, chunked streaming)
//! - URI wildcard matching compatible with the ESP-IDF HTTP server
//! - Collaborator traits for the key-value store, filesystem mount,
//!   access point and HTTP transport
//! - The startup sequence and the access-point event dispatcher
//! - Compiled-in device configuration
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! making it usable on both the host (tokio) and ESP32 (esp-idf) targets.

pub mod config;
pub mod error;
pub mod events;
pub mod mime;
pub mod platform;
pub mod server;
pub mod startup;
pub mod uri;

pub use config::{ApConfig, AuthMode, DeviceConfig, HttpConfig, MountConfig};
pub use error::{
    KvError, MountError, NetError, ServeError, SinkError, StartupError, TransportError,
};
pub use events::{ApEvent, EventDispatcher, MacAddr};
pub use platform::{
    AccessPoint, FileSystem, FilesystemMount, FsInfo, HttpTransport, KeyValueStore, Method,
    RequestHandler, ResponseSink,
};
pub use server::{StaticFileServer, CHUNK_SIZE};
pub use startup::{Bootstrap, Device};
