//! Directory-backed partition.
//!
//! A host directory stands in for the SPIFFS partition. Paths are absolute
//! device paths (`/spiffs/index.html`) that are mapped below the directory.
//! Like SPIFFS the volume has no notion of parent directories: a `..`
//! component never resolves to anything.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use softap_core::{FileSystem, FilesystemMount, FsInfo, MountConfig, MountError};

/// Capacity reported for the partition: the usable size of a 1 MB SPIFFS
/// partition.
pub const DEFAULT_CAPACITY: u64 = 956_561;

/// Mounts a host directory as the device partition.
#[derive(Debug, Clone)]
pub struct DirMount {
    root: PathBuf,
    capacity: u64,
}

impl DirMount {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }
}

impl FilesystemMount for DirMount {
    type Volume = DirVolume;

    fn mount(&mut self, config: &MountConfig) -> Result<DirVolume, MountError> {
        let mount_error = |reason: String| MountError::Mount {
            base_path: config.base_path.clone(),
            reason,
        };

        if !self.root.is_dir() {
            if !config.format_if_mount_failed {
                return Err(mount_error(format!(
                    "{} is not a directory",
                    self.root.display()
                )));
            }
            info!("Formatting partition at {}", self.root.display());
            fs::create_dir_all(&self.root).map_err(|e| mount_error(e.to_string()))?;
        }

        debug!(
            "Mounted {} at {} (max {} open files)",
            self.root.display(),
            config.base_path,
            config.max_files
        );
        Ok(DirVolume {
            root: self.root.clone(),
            base_path: config.base_path.trim_end_matches('/').to_string(),
            capacity: self.capacity,
            max_files: config.max_files,
            open_files: Arc::new(AtomicUsize::new(0)),
        })
    }
}

/// A mounted directory.
#[derive(Debug)]
pub struct DirVolume {
    root: PathBuf,
    base_path: String,
    capacity: u64,
    max_files: usize,
    open_files: Arc<AtomicUsize>,
}

impl DirVolume {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of handles currently open.
    pub fn open_files(&self) -> usize {
        self.open_files.load(Ordering::SeqCst)
    }

    /// Host path for a device path, or `None` if it is outside the mount
    /// point or contains anything other than plain components.
    fn host_path(&self, path: &str) -> Option<PathBuf> {
        let relative = path.strip_prefix(&self.base_path)?;
        let relative = relative.strip_prefix('/')?;

        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn acquire_slot(&self) -> io::Result<()> {
        let prev = self.open_files.fetch_add(1, Ordering::SeqCst);
        if prev >= self.max_files {
            self.open_files.fetch_sub(1, Ordering::SeqCst);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("too many open files ({}/{})", prev, self.max_files),
            ));
        }
        Ok(())
    }
}

/// Open file on a [`DirVolume`]; releases its slot when dropped.
#[derive(Debug)]
pub struct VolumeFile {
    file: File,
    open_files: Arc<AtomicUsize>,
}

impl Read for VolumeFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Drop for VolumeFile {
    fn drop(&mut self) {
        self.open_files.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FileSystem for DirVolume {
    type File = VolumeFile;

    fn open(&self, path: &str) -> io::Result<VolumeFile> {
        let host_path = self
            .host_path(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;

        if !host_path.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, path.to_string()));
        }

        self.acquire_slot()?;
        match File::open(&host_path) {
            Ok(file) => Ok(VolumeFile {
                file,
                open_files: Arc::clone(&self.open_files),
            }),
            Err(e) => {
                self.open_files.fetch_sub(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn info(&self) -> io::Result<FsInfo> {
        Ok(FsInfo {
            total_bytes: self.capacity,
            used_bytes: dir_size(&self.root)?,
        })
    }
}

fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        total += if meta.is_dir() {
            dir_size(&entry.path())?
        } else {
            meta.len()
        };
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mounted(dir: &tempfile::TempDir, max_files: usize) -> DirVolume {
        let config = MountConfig {
            max_files,
            ..Default::default()
        };
        DirMount::new(dir.path()).mount(&config).unwrap()
    }

    #[test]
    fn test_open_maps_device_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        fs::create_dir(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/site.css"), "body{}").unwrap();
        let volume = mounted(&dir, 5);

        let mut body = String::new();
        volume
            .open("/spiffs/index.html")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "<h1>hi</h1>");
        assert!(volume.open("/spiffs/css/site.css").is_ok());
    }

    #[test]
    fn test_open_rejects_paths_outside_partition() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("www")).unwrap();
        fs::write(dir.path().join("secret.txt"), "nope").unwrap();
        let volume = DirMount::new(dir.path().join("www"))
            .mount(&MountConfig::default())
            .unwrap();

        for path in [
            "/spiffs/../secret.txt",
            "/spiffsx/index.html",
            "/other/index.html",
            "/spiffs",
            "/spiffs/",
        ] {
            let err = volume.open(path).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::NotFound, "{path}");
        }
    }

    #[test]
    fn test_max_open_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let volume = mounted(&dir, 2);

        let first = volume.open("/spiffs/a.txt").unwrap();
        let second = volume.open("/spiffs/a.txt").unwrap();
        assert!(volume.open("/spiffs/a.txt").is_err());
        assert_eq!(volume.open_files(), 2);

        drop(first);
        assert!(volume.open("/spiffs/a.txt").is_ok());
        drop(second);
        assert_eq!(volume.open_files(), 0);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("partition");

        let err = DirMount::new(&root)
            .mount(&MountConfig::default())
            .unwrap_err();
        assert!(matches!(err, MountError::Mount { .. }));

        let config = MountConfig {
            format_if_mount_failed: true,
            ..Default::default()
        };
        DirMount::new(&root).mount(&config).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_info_reports_used_bytes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), vec![0u8; 1000]).unwrap();
        fs::create_dir(dir.path().join("img")).unwrap();
        fs::write(dir.path().join("img/b.bin"), vec![0u8; 24]).unwrap();
        let volume = DirMount::new(dir.path())
            .with_capacity(4096)
            .mount(&MountConfig::default())
            .unwrap();

        let info = volume.info().unwrap();

        assert_eq!(info.total_bytes, 4096);
        assert_eq!(info.used_bytes, 1024);
    }
}
