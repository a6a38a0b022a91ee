//! Minimal fallback index: linear scans over the raw entry list.
//!
//! Kept deliberately simple; the engine only reaches for it when the tree
//! index cannot be built from the metadata it was given.

use std::collections::BTreeMap;

use torrentfs_core::{DirEntry, EntryKind, Error, FileEntry, PathStat, Result};

use super::{PathLookup, normalize};

/// Fallback index over an owned copy of the file entries.
pub struct FlatIndex {
    entries: Vec<FileEntry>,
}

impl FlatIndex {
    /// Keep the entries as-is; there is nothing to precompute.
    #[must_use]
    pub fn new(entries: Vec<FileEntry>) -> Self {
        Self { entries }
    }

    fn find_file(&self, path: &str) -> Option<&FileEntry> {
        self.entries
            .iter()
            .find(|entry| normalize(&entry.path) == path)
    }

    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        let prefix = format!("{path}/");
        self.entries
            .iter()
            .any(|entry| normalize(&entry.path).starts_with(&prefix))
    }
}

impl PathLookup for FlatIndex {
    fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let path = normalize(path);
        if let Some(_file) = self.find_file(path) {
            return Err(Error::NotADirectory {
                path: path.to_string(),
            });
        }
        if !self.is_dir(path) {
            return Err(Error::FileNotFound {
                path: path.to_string(),
            });
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut out: BTreeMap<String, DirEntry> = BTreeMap::new();
        for entry in &self.entries {
            let Some(rest) = normalize(&entry.path).strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((name, _)) => {
                    out.entry(name.to_string()).or_insert_with(|| DirEntry {
                        name: name.to_string(),
                        kind: EntryKind::Dir,
                        size: 0,
                    });
                }
                None => {
                    out.insert(
                        rest.to_string(),
                        DirEntry {
                            name: rest.to_string(),
                            kind: EntryKind::File,
                            size: entry.size,
                        },
                    );
                }
            }
        }
        Ok(out.into_values().collect())
    }

    fn stat(&self, path: &str) -> Result<PathStat> {
        let path = normalize(path);
        if let Some(file) = self.find_file(path) {
            return Ok(PathStat {
                kind: EntryKind::File,
                size: file.size,
                file_index: Some(file.index),
            });
        }
        if self.is_dir(path) {
            return Ok(PathStat {
                kind: EntryKind::Dir,
                size: 0,
                file_index: None,
            });
        }
        Err(Error::FileNotFound {
            path: path.to_string(),
        })
    }
}
