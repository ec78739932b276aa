//! SPIFFS partition registered on the VFS.
//!
//! Once registered, files under the base path are ordinary VFS files and are
//! read with `std::fs`.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::ptr;

use esp_idf_svc::sys::{self, esp_vfs_spiffs_conf_t};
use log::{info, warn};

use softap_core::{FileSystem, FilesystemMount, FsInfo, MountConfig, MountError};

/// Registers the SPIFFS partition named in the mount settings.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpiffsMount;

impl FilesystemMount for SpiffsMount {
    type Volume = SpiffsVolume;

    fn mount(&mut self, config: &MountConfig) -> Result<SpiffsVolume, MountError> {
        let mount_error = |reason: String| MountError::Mount {
            base_path: config.base_path.clone(),
            reason,
        };

        let base_path =
            CString::new(config.base_path.as_str()).map_err(|e| mount_error(e.to_string()))?;
        let label = config
            .partition_label
            .as_deref()
            .map(CString::new)
            .transpose()
            .map_err(|e| mount_error(e.to_string()))?;

        let conf = esp_vfs_spiffs_conf_t {
            base_path: base_path.as_ptr(),
            partition_label: label.as_ref().map_or(ptr::null(), |l| l.as_ptr()),
            max_files: config.max_files,
            format_if_mount_failed: config.format_if_mount_failed,
        };

        sys::esp!(unsafe { sys::esp_vfs_spiffs_register(&conf) })
            .map_err(|e| mount_error(e.to_string()))?;
        info!("SPIFFS registered at {}", config.base_path);

        Ok(SpiffsVolume { base_path, label })
    }
}

/// A registered SPIFFS partition. Unregistered on drop.
#[derive(Debug)]
pub struct SpiffsVolume {
    base_path: CString,
    label: Option<CString>,
}

impl SpiffsVolume {
    fn label_ptr(&self) -> *const core::ffi::c_char {
        self.label.as_ref().map_or(ptr::null(), |l| l.as_ptr())
    }
}

impl FileSystem for SpiffsVolume {
    type File = File;

    fn open(&self, path: &str) -> io::Result<File> {
        File::open(path)
    }

    fn info(&self) -> io::Result<FsInfo> {
        let mut total: usize = 0;
        let mut used: usize = 0;
        sys::esp!(unsafe { sys::esp_spiffs_info(self.label_ptr(), &mut total, &mut used) })
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(FsInfo {
            total_bytes: total as u64,
            used_bytes: used as u64,
        })
    }
}

impl Drop for SpiffsVolume {
    fn drop(&mut self) {
        if let Err(e) = sys::esp!(unsafe { sys::esp_vfs_spiffs_unregister(self.label_ptr()) }) {
            warn!("Failed to unregister SPIFFS at {:?}: {}", self.base_path, e);
        }
    }
}
