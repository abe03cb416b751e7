//! Persistent fingerprint cache.
//!
//! Maps project-relative paths (`content/a.md`) to hex fingerprints. The
//! whole mapping is loaded at build start and written back once at the end.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::debug;
use crate::error::{BuildError, Result};
use crate::output::atomic_write;

/// Cache file name inside the output directory.
pub const CACHE_FILE: &str = ".cache";

/// Thread-safe fingerprint cache backed by a JSON file.
#[derive(Debug)]
pub struct Cache {
    path: PathBuf,
    entries: RwLock<FxHashMap<String, String>>,
}

impl Cache {
    /// Empty cache that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Create a cache and load whatever `path` holds.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let cache = Self::new(path);
        cache.load()?;
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory mapping with the persisted one.
    ///
    /// A missing or empty file is a cold cache.
    pub fn load(&self) -> Result<()> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("cache"; "no cache at {}, starting cold", self.path.display());
                self.entries.write().clear();
                return Ok(());
            }
            Err(e) => return Err(BuildError::io("read", &self.path, e)),
        };

        let loaded: FxHashMap<String, String> = if bytes.iter().all(u8::is_ascii_whitespace) {
            FxHashMap::default()
        } else {
            serde_json::from_slice(&bytes).map_err(|source| BuildError::Cache {
                path: self.path.clone(),
                source,
            })?
        };

        debug!("cache"; "loaded {} entries", loaded.len());
        *self.entries.write() = loaded;
        Ok(())
    }

    /// Write the mapping back, keys sorted.
    ///
    /// Skips the write when the file already holds the same bytes.
    pub fn save(&self) -> Result<()> {
        let sorted: BTreeMap<String, String> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut json = serde_json::to_vec_pretty(&sorted).map_err(|source| BuildError::Cache {
            path: self.path.clone(),
            source,
        })?;
        json.push(b'\n');

        if fs::read(&self.path).is_ok_and(|existing| existing == json) {
            return Ok(());
        }

        atomic_write(&self.path, &json)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, fingerprint: impl Into<String>) {
        self.entries.write().insert(key.into(), fingerprint.into());
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Delete a persisted cache file. Missing files are fine.
    pub fn remove_file(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BuildError::io("remove", path, e)),
        }
    }
}
