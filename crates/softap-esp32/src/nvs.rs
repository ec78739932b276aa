//! NVS (Non-Volatile Storage) key-value store.
//!
//! `EspDefaultNvsPartition::take` erases and retries on its own, which would
//! hide the failure from the startup sequence. `init` therefore calls
//! `nvs_flash_init` directly and only takes the partition once that succeeded.

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_svc::sys::{
    self, EspError, ESP_ERR_NVS_NEW_VERSION_FOUND, ESP_ERR_NVS_NOT_FOUND,
    ESP_ERR_NVS_NO_FREE_PAGES,
};
use log::{debug, info};

use softap_core::{KeyValueStore, KvError};

fn to_kv_error(e: EspError) -> KvError {
    match e.code() as u32 {
        ESP_ERR_NVS_NO_FREE_PAGES => KvError::NoFreePages,
        ESP_ERR_NVS_NEW_VERSION_FOUND => KvError::NewVersionFound,
        _ => KvError::Backend(e.to_string()),
    }
}

/// The default NVS partition.
#[derive(Default)]
pub struct EspKvStore {
    partition: Option<EspDefaultNvsPartition>,
}

impl EspKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The partition handle, for drivers that persist their own state.
    pub fn partition(&self) -> Option<EspDefaultNvsPartition> {
        self.partition.clone()
    }

    fn open(&self, namespace: &str, read_write: bool) -> Result<EspNvs<NvsDefault>, KvError> {
        let partition = self.partition.clone().ok_or(KvError::NotInitialized)?;
        EspNvs::new(partition, namespace, read_write).map_err(to_kv_error)
    }
}

impl KeyValueStore for EspKvStore {
    fn init(&mut self) -> Result<(), KvError> {
        sys::esp!(unsafe { sys::nvs_flash_init() }).map_err(to_kv_error)?;
        self.partition = Some(EspDefaultNvsPartition::take().map_err(to_kv_error)?);
        debug!("NVS partition ready");
        Ok(())
    }

    fn erase(&mut self) -> Result<(), KvError> {
        info!("Erasing NVS partition");
        self.partition = None;
        sys::esp!(unsafe { sys::nvs_flash_deinit() }).ok();
        sys::esp!(unsafe { sys::nvs_flash_erase() }).map_err(to_kv_error)
    }

    fn get_str(&self, namespace: &str, key: &str) -> Result<Option<String>, KvError> {
        let partition = self.partition.clone().ok_or(KvError::NotInitialized)?;
        let nvs = match EspNvs::new(partition, namespace, false) {
            Ok(nvs) => nvs,
            // A namespace that was never written does not exist yet
            Err(e) if e.code() as u32 == ESP_ERR_NVS_NOT_FOUND => {
                debug!("NVS namespace {} not found", namespace);
                return Ok(None);
            }
            Err(e) => return Err(to_kv_error(e)),
        };

        let Some(len) = nvs.str_len(key).map_err(to_kv_error)? else {
            return Ok(None);
        };
        let mut buf = vec![0u8; len];
        match nvs.get_str(key, &mut buf) {
            Ok(value) => Ok(value.map(str::to_string)),
            Err(e) if e.code() as u32 == ESP_ERR_NVS_NOT_FOUND => Ok(None),
            Err(e) => Err(to_kv_error(e)),
        }
    }

    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), KvError> {
        let mut nvs = self.open(namespace, true)?;
        nvs.set_str(key, value).map_err(to_kv_error)
    }
}
