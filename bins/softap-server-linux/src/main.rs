use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use softap_core::{Bootstrap, DeviceConfig};
use softap_host::{AxumTransport, DirMount, FileKvStore, SimulatedAccessPoint};

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,softap_core=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("softap server starting...");

    // Configuration
    let partition_dir = PathBuf::from(env_or("SOFTAP_PARTITION_DIR", "./data"));
    let nvs_file = PathBuf::from(env_or("SOFTAP_NVS_FILE", "./nvs.json"));
    let http_addr: SocketAddr = env_or("SOFTAP_HTTP_ADDR", "0.0.0.0:8080")
        .parse()
        .context("SOFTAP_HTTP_ADDR is not a socket address")?;

    let config = DeviceConfig::default();
    let ap = SimulatedAccessPoint::new();
    let ap_handle = ap.handle();

    let device = Bootstrap::new(
        FileKvStore::new(&nvs_file),
        DirMount::new(&partition_dir),
        ap,
        config,
    )
    .run()
    .with_context(|| {
        format!(
            "startup failed (partition {}, store {})",
            partition_dir.display(),
            nvs_file.display()
        )
    })?;

    tracing::info!(
        "Access point \"{}\" up, serving {} on http://{}",
        device.config().ap.ssid,
        partition_dir.display(),
        http_addr
    );

    let transport = AxumTransport::new(tokio::runtime::Handle::current()).with_bind_addr(http_addr);
    let mut server = tokio::task::spawn_blocking(move || device.serve(transport));

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
            ap_handle.stop();
            server.await.context("event loop panicked")?;
        }
        result = &mut server => {
            result.context("event loop panicked")?;
            tracing::warn!("Access point event loop ended");
        }
    }

    Ok(())
}
