//! ESP32 implementations of the softap collaborators.
//!
//! This crate provides the device side of every platform trait in
//! `softap-core`:
//! - [`nvs::EspKvStore`] - NVS flash, with the raw init status exposed so
//!   the startup sequence can erase and retry
//! - [`spiffs::SpiffsMount`] - SPIFFS registered on the VFS
//! - [`wifi::EspAccessPoint`] - `EspWifi` in access point mode, created during
//!   access point bring-up and publishing system event loop notifications as
//!   `ApEvent`s
//! - [`http::EspTransport`] - `EspHttpServer` with wildcard URI matching
//!
//! # Example
//!
//! ```ignore
//! use softap_core::{Bootstrap, DeviceConfig};
//! use softap_esp32::{http::EspTransport, nvs::EspKvStore, spiffs::SpiffsMount, wifi::EspAccessPoint};
//!
//! let ap = EspAccessPoint::new(peripherals.modem, sysloop);
//! let device = Bootstrap::new(EspKvStore::new(), SpiffsMount, ap, DeviceConfig::default()).run()?;
//! device.serve(EspTransport::new());
//! ```

pub mod http;
pub mod nvs;
pub mod spiffs;
pub mod wifi;
