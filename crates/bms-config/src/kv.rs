//! Tiny persistent key-value store, the host-side analog of the NVS
//! `storage` namespace. One namespace = one JSON file of string -> u8.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::ConfigError;

/// File-backed key-value store for small persistent flags.
#[derive(Debug)]
pub struct KvStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, u8>>,
}

impl KvStore {
    /// Open the namespace file, creating an empty store when it does not
    /// exist yet. A corrupt file is discarded with a warning, matching
    /// the erase-and-reinit fallback of the flash store it stands in for.
    pub fn open(path: PathBuf) -> Result<Self, ConfigError> {
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "kv store corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn get_u8(&self, key: &str) -> Option<u8> {
        self.entries.lock().get(key).copied()
    }

    /// Set a key and commit to disk.
    pub fn set_u8(&self, key: &str, value: u8) -> Result<(), ConfigError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value);
        self.commit(&entries)
    }

    /// Read a flag and clear it in the same operation when it was set.
    /// Returns `true` only when the stored value was 1.
    pub fn take_flag(&self, key: &str) -> Result<bool, ConfigError> {
        let mut entries = self.entries.lock();
        if entries.get(key).copied() == Some(1) {
            entries.insert(key.to_string(), 0);
            self.commit(&entries)?;
            debug!(key, "flag taken and cleared");
            return Ok(true);
        }
        Ok(false)
    }

    fn commit(&self, entries: &BTreeMap<String, u8>) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(entries)?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
