//! # softap-host
//!
//! Host-side implementations of the softap collaborators, used to run and
//! test the full bootstrap without a device:
//!
//! - [`FileKvStore`] - JSON file standing in for the NVS partition
//! - [`DirMount`] - directory standing in for the SPIFFS partition
//! - [`SimulatedAccessPoint`] - access point whose stations are driven by an
//!   [`ApHandle`]
//! - [`AxumTransport`] - HTTP transport on tokio + axum with chunked bodies
//!
//! ## Usage
//!
//! ```rust,ignore
//! use softap_core::{Bootstrap, DeviceConfig};
//! use softap_host::{AxumTransport, DirMount, FileKvStore, SimulatedAccessPoint};
//!
//! let device = Bootstrap::new(
//!     FileKvStore::new("nvs.json"),
//!     DirMount::new("data"),
//!     SimulatedAccessPoint::new(),
//!     DeviceConfig::default(),
//! )
//! .run()?;
//!
//! let transport = AxumTransport::new(tokio::runtime::Handle::current());
//! tokio::task::spawn_blocking(move || device.serve(transport));
//! ```

pub mod access_point;
pub mod kv;
pub mod transport;
pub mod volume;

pub use access_point::{ApHandle, SimulatedAccessPoint};
pub use kv::FileKvStore;
pub use transport::{router, AxumTransport, RouteTable};
pub use volume::{DirMount, DirVolume};
