//! Access-point static file server for ESP32.
//!
//! This binary requires the ESP32 Rust toolchain.
//! It will not compile with the standard Rust toolchain.
//!
//! Brings up NVS, mounts the `storage` SPIFFS partition at `/spiffs`, starts
//! the access point and serves the partition over HTTP once the access point
//! is up. Any startup failure is fatal.

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::prelude::Peripherals;
use log::{error, info};

use softap_core::{Bootstrap, DeviceConfig};
use softap_esp32::http::EspTransport;
use softap_esp32::nvs::EspKvStore;
use softap_esp32::spiffs::SpiffsMount;
use softap_esp32::wifi::EspAccessPoint;

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("softap server starting...");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    // The WiFi driver is initialized by the access point step, after NVS
    let ap = EspAccessPoint::new(peripherals.modem, sysloop);
    let device = match Bootstrap::new(EspKvStore::new(), SpiffsMount, ap, DeviceConfig::default())
        .run()
    {
        Ok(device) => device,
        Err(e) => {
            error!("Startup failed: {}", e);
            return Err(e.into());
        }
    };

    info!("Access point \"{}\" up, waiting for it to start", device.config().ap.ssid);

    // Blocks for as long as the access point driver is alive
    let _transport = device.serve(EspTransport::new());

    error!("Access point event loop ended");
    Ok(())
}
