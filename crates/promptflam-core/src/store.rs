//! Key-value store capability for persisted UI state (favorites, archives).
//!
//! Callers hold a `dyn KeyValueStore` instead of touching a global, so a
//! `MemoryStore` can stand in for the file-backed store under test.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;

/// Nominal capacity, matching the browser storage quota the UI targets.
pub const STORAGE_CAPACITY: usize = 5 * 1024 * 1024;

/// Approximate storage usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub used: usize,
    pub total: usize,
    pub percentage: u32,
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
    fn usage(&self) -> StorageUsage;
}

/// Read `key` as `T`, falling back to `default` when absent or of the wrong shape.
pub fn get_or<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str, default: T) -> T {
    match store.get(key) {
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            warn!("Stored value for '{}' has unexpected shape: {}", key, e);
            default
        }),
        None => default,
    }
}

/// Serialize `value` and store it under `key`.
pub fn put<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    store.set(key, serde_json::to_value(value)?)
}

fn usage_of(entries: &BTreeMap<String, Value>) -> StorageUsage {
    let used: usize = entries
        .iter()
        .map(|(k, v)| k.len() + v.to_string().len())
        .sum();
    let percentage = ((used as f64 / STORAGE_CAPACITY as f64) * 100.0).round() as u32;
    StorageUsage {
        used,
        total: STORAGE_CAPACITY,
        percentage,
    }
}

// ---------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    fn usage(&self) -> StorageUsage {
        usage_of(&self.entries.read())
    }
}

// ---------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------

/// File-backed store: loaded once at open, rewritten on every mutation.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, Value>>,
}

impl FileStore {
    pub fn open(path: &Path) -> Self {
        let entries = load_entries(path);
        info!("FileStore: {} keys loaded from {}", entries.len(), path.display());

        Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, Value> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(_) => return BTreeMap::new(),
    };
    serde_json::from_str(&data).unwrap_or_else(|e| {
        warn!("Ignoring unreadable store file {}: {}", path.display(), e);
        BTreeMap::new()
    })
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value);
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write();
        entries.clear();
        self.save(&entries)
    }

    fn usage(&self) -> StorageUsage {
        usage_of(&self.entries.read())
    }
}
