//! Device startup sequence.
//!
//! Each step is fallible and returns a [`StartupError`]; [`Bootstrap::run`]
//! chains them with `?` so the first failure reaches the caller, which treats
//! it as fatal. There is no partially started mode.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{ApConfig, DeviceConfig, MountConfig, AP_OVERRIDE_KEY, SETTINGS_NAMESPACE};
use crate::error::{MountError, StartupError};
use crate::events::{ApEvent, EventDispatcher};
use crate::platform::{AccessPoint, FileSystem, FilesystemMount, HttpTransport, KeyValueStore};
use crate::server::StaticFileServer;

/// Initialize the key-value store, erasing it once if its contents are
/// unusable (no free pages or a newer format).
pub fn init_storage<K: KeyValueStore>(kv: &mut K) -> Result<(), StartupError> {
    info!("Initialize key-value store");
    match kv.init() {
        Ok(()) => Ok(()),
        Err(e) if e.is_recoverable_by_erase() => {
            warn!("Key-value store unusable ({}), erasing", e);
            kv.erase()?;
            kv.init()?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Access point settings: the persisted override if present, valid JSON and
/// within the driver limits, otherwise `defaults`.
///
/// A bad override never fails startup; only the compiled-in settings can.
pub fn load_ap_override<K: KeyValueStore>(kv: &K, defaults: ApConfig) -> ApConfig {
    match kv.get_str(SETTINGS_NAMESPACE, AP_OVERRIDE_KEY) {
        Ok(Some(json)) => match ApConfig::from_json(&json) {
            Ok(ap) => match ap.validate() {
                Ok(()) => {
                    info!("Using persisted access point settings (ssid {})", ap.ssid);
                    ap
                }
                Err(e) => {
                    warn!("Ignoring persisted access point settings: {}", e);
                    defaults
                }
            },
            Err(e) => {
                warn!("Ignoring malformed access point settings: {}", e);
                defaults
            }
        },
        Ok(None) => defaults,
        Err(e) => {
            warn!("Cannot read access point settings: {}", e);
            defaults
        }
    }
}

/// Mount the filesystem partition and log its capacity.
pub fn mount_filesystem<M: FilesystemMount>(
    mount: &mut M,
    config: &MountConfig,
) -> Result<M::Volume, StartupError> {
    info!("Mount filesystem at {}", config.base_path);
    let volume = mount.mount(config)?;

    let fs_info = volume.info().map_err(MountError::Info)?;
    info!(
        "Filesystem total = {} bytes, used = {} bytes",
        fs_info.total_bytes, fs_info.used_bytes
    );
    Ok(volume)
}

/// Configure and start the access point. Subscribes to its events first so
/// `ApStarted` is never missed.
pub fn bring_up_access_point<A: AccessPoint>(
    ap: &mut A,
    config: &ApConfig,
) -> Result<Receiver<ApEvent>, StartupError> {
    config.validate()?;

    info!("Register access point event handler");
    let events = ap.subscribe()?;

    info!("Configure access point (ssid {}, max {} stations)", config.ssid, config.max_connections);
    ap.configure(config)?;

    info!("Start access point");
    ap.start()?;
    Ok(events)
}

/// Collaborators and configuration needed to bring the device up.
pub struct Bootstrap<K, M, A> {
    kv: K,
    mount: M,
    ap: A,
    config: DeviceConfig,
}

impl<K, M, A> Bootstrap<K, M, A>
where
    K: KeyValueStore,
    M: FilesystemMount,
    A: AccessPoint,
{
    pub fn new(kv: K, mount: M, ap: A, config: DeviceConfig) -> Self {
        Self {
            kv,
            mount,
            ap,
            config,
        }
    }

    /// Storage, filesystem, then access point. Stops at the first failure.
    pub fn run(mut self) -> Result<Device<K, A, M::Volume>, StartupError> {
        init_storage(&mut self.kv)?;
        let ap_config = load_ap_override(&self.kv, self.config.ap.clone());

        let volume = Arc::new(mount_filesystem(&mut self.mount, &self.config.mount)?);
        let server = Arc::new(StaticFileServer::new(volume, self.config.mount.base_path.clone()));

        let events = bring_up_access_point(&mut self.ap, &ap_config)?;

        self.config.ap = ap_config;
        Ok(Device {
            kv: self.kv,
            ap: self.ap,
            server,
            config: self.config,
            events,
        })
    }
}

/// A brought-up device waiting for access point events.
///
/// Holds the store and the access point so they stay alive while serving.
pub struct Device<K, A, V> {
    kv: K,
    ap: A,
    server: Arc<StaticFileServer<V>>,
    config: DeviceConfig,
    events: Receiver<ApEvent>,
}

impl<K, A, V: FileSystem> Device<K, A, V> {
    /// Effective configuration (after applying the persisted override).
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn server(&self) -> &Arc<StaticFileServer<V>> {
        &self.server
    }

    pub fn kv_store(&self) -> &K {
        &self.kv
    }

    pub fn access_point(&self) -> &A {
        &self.ap
    }

    /// Dispatch access point events until the event channel closes. Blocks
    /// the calling thread. Returns the transport.
    pub fn serve<T: HttpTransport>(self, transport: T) -> T {
        let Device {
            kv,
            ap,
            server,
            config,
            events,
        } = self;

        let dispatcher = EventDispatcher::new(transport, config.http, server);
        let transport = dispatcher.run(events);

        drop(ap);
        drop(kv);
        transport
    }
}
