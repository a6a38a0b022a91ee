//! Persistent pin set: `<cache_dir>/.pinned.json`, `{"paths":[sorted]}`,
//! rewritten atomically via temp-file rename.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use torrentfs_core::{Error, Result};

/// File name of the persisted pin set inside the cache directory.
pub const PINNED_FILE: &str = ".pinned.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct PinnedFile {
    paths: Vec<String>,
}

/// In-memory pin set kept in sync with its on-disk form.
///
/// Paths and file indexes are stored together so the invariant "pinned
/// paths and pinned file indexes describe the same files" holds by
/// construction.
#[derive(Debug, Default)]
pub struct PinSet {
    by_path: BTreeMap<String, u32>,
}

impl PinSet {
    /// Whether a path is pinned.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    /// Whether a file index is pinned.
    #[must_use]
    pub fn contains_index(&self, file_index: u32) -> bool {
        self.by_path.values().any(|&index| index == file_index)
    }

    /// Record a pin. Returns `false` when the path was already pinned.
    pub fn insert(&mut self, path: String, file_index: u32) -> bool {
        self.by_path.insert(path, file_index).is_none()
    }

    /// Drop a pin. Returns `false` when the path was not pinned.
    pub fn remove(&mut self, path: &str) -> bool {
        self.by_path.remove(path).is_some()
    }

    /// Sorted pinned paths.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.by_path.keys().cloned().collect()
    }

    /// Pinned `(path, file_index)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.by_path
            .iter()
            .map(|(path, &index)| (path.as_str(), index))
    }

    /// Number of pinned files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Drop every pin.
    pub fn clear(&mut self) {
        self.by_path.clear();
    }
}

/// On-disk store for one engine's pin set.
#[derive(Debug, Clone)]
pub struct PinStore {
    path: PathBuf,
}

impl PinStore {
    /// Store rooted at a cache directory.
    #[must_use]
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            path: cache_dir.join(PINNED_FILE),
        }
    }

    /// Read the persisted paths; a missing file is an empty set.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or decoded.
    pub fn load(&self) -> Result<Vec<String>> {
        let payload = match fs::read_to_string(&self.path) {
            Ok(payload) => payload,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new());
            }
            Err(err) => return Err(Error::io("read_pinned_file", &self.path, err)),
        };
        let parsed: PinnedFile =
            serde_json::from_str(&payload).map_err(|err| Error::MetainfoInvalid {
                reason: format!("pinned file decode failed: {err}"),
            })?;
        Ok(parsed.paths)
    }

    /// Persist the pin set atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns an error when the temp file cannot be written or renamed.
    pub fn save(&self, pins: &PinSet) -> Result<()> {
        let payload = PinnedFile { paths: pins.paths() };
        let encoded = serde_json::to_vec(&payload).map_err(|err| Error::MetainfoInvalid {
            reason: format!("pinned file encode failed: {err}"),
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, encoded).map_err(|err| Error::io("write_pinned_tmp", &tmp, err))?;
        fs::rename(&tmp, &self.path)
            .map_err(|err| Error::io("rename_pinned_file", &self.path, err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = PinStore::new(dir.path());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_load_round_trip_is_sorted() {
        let dir = TempDir::new().unwrap();
        let store = PinStore::new(dir.path());
        let mut pins = PinSet::default();
        assert!(pins.insert("z/last.bin".to_string(), 2));
        assert!(pins.insert("a/first.bin".to_string(), 0));
        assert!(!pins.insert("a/first.bin".to_string(), 0));
        store.save(&pins).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, vec!["a/first.bin", "z/last.bin"]);
        // The temp file never survives a successful save.
        assert!(!dir.path().join(".pinned.json.tmp").exists());
    }

    #[test]
    fn on_disk_format_is_the_documented_shape() {
        let dir = TempDir::new().unwrap();
        let store = PinStore::new(dir.path());
        let mut pins = PinSet::default();
        pins.insert("a/b.mp4".to_string(), 1);
        store.save(&pins).unwrap();

        let raw = fs::read_to_string(dir.path().join(PINNED_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["paths"][0], "a/b.mp4");
    }

    #[test]
    fn set_tracks_paths_and_indexes_together() {
        let mut pins = PinSet::default();
        pins.insert("x".to_string(), 4);
        assert!(pins.contains("x"));
        assert!(pins.contains_index(4));
        assert!(!pins.contains_index(5));
        assert!(pins.remove("x"));
        assert!(!pins.remove("x"));
        assert!(pins.is_empty());
    }

    #[test]
    fn garbage_on_disk_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PINNED_FILE), b"not json").unwrap();
        let store = PinStore::new(dir.path());
        assert!(store.load().is_err());
    }
}
