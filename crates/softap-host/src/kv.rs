//! File-backed key-value store.
//!
//! The whole "partition" is one JSON document holding a format version and
//! string entries grouped by namespace. It reproduces the two failure modes
//! the startup sequence recovers from:
//! - an unparseable file reports [`KvError::NoFreePages`]
//! - a file written by a newer format reports [`KvError::NewVersionFound`]

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use softap_core::{KeyValueStore, KvError};

/// Format version written by this store.
pub const FORMAT_VERSION: u32 = 2;

/// Default number of entries before the store reports no free pages.
pub const DEFAULT_MAX_ENTRIES: usize = 126;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Image {
    version: u32,
    #[serde(default)]
    namespaces: BTreeMap<String, BTreeMap<String, String>>,
}

impl Image {
    fn fresh() -> Self {
        Self {
            version: FORMAT_VERSION,
            namespaces: BTreeMap::new(),
        }
    }

    fn entry_count(&self) -> usize {
        self.namespaces.values().map(BTreeMap::len).sum()
    }
}

/// Key-value store persisted to a single JSON file.
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    max_entries: usize,
    image: Option<Image>,
}

impl FileKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_entries: DEFAULT_MAX_ENTRIES,
            image: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_initialized(&self) -> bool {
        self.image.is_some()
    }

    fn load(&self) -> Result<Image, KvError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No store file at {}, creating", self.path.display());
                let image = Image::fresh();
                self.persist(&image)?;
                return Ok(image);
            }
            Err(e) => return Err(backend(e)),
        };

        let mut image: Image = serde_json::from_slice(&bytes).map_err(|_| KvError::NoFreePages)?;
        if image.version > FORMAT_VERSION {
            return Err(KvError::NewVersionFound);
        }
        if image.version < FORMAT_VERSION {
            info!(
                "Upgrading store format from version {} to {}",
                image.version, FORMAT_VERSION
            );
            image.version = FORMAT_VERSION;
            self.persist(&image)?;
        }
        Ok(image)
    }

    fn persist(&self, image: &Image) -> Result<(), KvError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(backend)?;
            }
        }
        let json = serde_json::to_vec_pretty(image).map_err(|e| KvError::Backend(e.to_string()))?;
        fs::write(&self.path, json).map_err(backend)
    }
}

fn backend(e: io::Error) -> KvError {
    KvError::Backend(e.to_string())
}

impl KeyValueStore for FileKvStore {
    fn init(&mut self) -> Result<(), KvError> {
        let image = self.load()?;
        debug!("Key-value store ready with {} entries", image.entry_count());
        self.image = Some(image);
        Ok(())
    }

    fn erase(&mut self) -> Result<(), KvError> {
        self.image = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(backend(e)),
        }
    }

    fn get_str(&self, namespace: &str, key: &str) -> Result<Option<String>, KvError> {
        let image = self.image.as_ref().ok_or(KvError::NotInitialized)?;
        Ok(image
            .namespaces
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), KvError> {
        let max_entries = self.max_entries;
        let image = self.image.as_mut().ok_or(KvError::NotInitialized)?;

        let exists = image
            .namespaces
            .get(namespace)
            .is_some_and(|entries| entries.contains_key(key));
        if !exists && image.entry_count() >= max_entries {
            return Err(KvError::NoFreePages);
        }

        image
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());

        let image = self.image.as_ref().ok_or(KvError::NotInitialized)?;
        self.persist(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use softap_core::startup::init_storage;

    fn store_in(dir: &tempfile::TempDir) -> FileKvStore {
        FileKvStore::new(dir.path().join("nvs.json"))
    }

    #[test]
    fn test_init_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = store_in(&dir);

        kv.init().unwrap();

        assert!(kv.path().exists());
        assert_eq!(kv.get_str("softap", "ap").unwrap(), None);
    }

    #[test]
    fn test_values_survive_reinit() {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = store_in(&dir);
        kv.init().unwrap();
        kv.set_str("softap", "ap", r#"{"ssid":"x"}"#).unwrap();

        let mut reopened = store_in(&dir);
        reopened.init().unwrap();

        assert_eq!(
            reopened.get_str("softap", "ap").unwrap().as_deref(),
            Some(r#"{"ssid":"x"}"#)
        );
    }

    #[test]
    fn test_use_before_init() {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = store_in(&dir);

        assert!(matches!(kv.get_str("a", "b"), Err(KvError::NotInitialized)));
        assert!(matches!(kv.set_str("a", "b", "c"), Err(KvError::NotInitialized)));
    }

    #[test]
    fn test_newer_version_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nvs.json");
        fs::write(&path, r#"{"version":99,"namespaces":{}}"#).unwrap();

        let mut kv = FileKvStore::new(&path);

        assert!(matches!(kv.init(), Err(KvError::NewVersionFound)));
    }

    #[test]
    fn test_garbage_is_reported_as_no_free_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nvs.json");
        fs::write(&path, b"\xff\xff\xff\xff").unwrap();

        let mut kv = FileKvStore::new(&path);

        assert!(matches!(kv.init(), Err(KvError::NoFreePages)));
    }

    #[test]
    fn test_startup_recovers_by_erasing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nvs.json");
        fs::write(&path, r#"{"version":99,"namespaces":{"softap":{"ap":"{}"}}}"#).unwrap();

        let mut kv = FileKvStore::new(&path);
        init_storage(&mut kv).unwrap();

        assert!(kv.is_initialized());
        assert_eq!(kv.get_str("softap", "ap").unwrap(), None);
    }

    #[test]
    fn test_older_version_is_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nvs.json");
        fs::write(&path, r#"{"version":1,"namespaces":{"softap":{"k":"v"}}}"#).unwrap();

        let mut kv = FileKvStore::new(&path);
        kv.init().unwrap();

        assert_eq!(kv.get_str("softap", "k").unwrap().as_deref(), Some("v"));
        let on_disk: Image = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.version, FORMAT_VERSION);
    }

    #[test]
    fn test_full_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = store_in(&dir).with_max_entries(2);
        kv.init().unwrap();

        kv.set_str("ns", "a", "1").unwrap();
        kv.set_str("ns", "b", "2").unwrap();
        kv.set_str("ns", "a", "updated").unwrap();

        assert!(matches!(kv.set_str("ns", "c", "3"), Err(KvError::NoFreePages)));
    }
}
