//! Tree-backed path index: one node per directory, O(depth) lookups.

use std::collections::HashMap;

use torrentfs_core::{DirEntry, EntryKind, Error, FileEntry, PathStat, Result};

use super::{PathLookup, normalize};

enum Node {
    Dir(Dir),
    File { file_index: u32, size: u64 },
}

/// Directory node: insertion-ordered children plus a name lookup table.
#[derive(Default)]
struct Dir {
    children: Vec<(String, Node)>,
    lookup: HashMap<String, usize>,
}

impl Dir {
    fn get(&self, name: &str) -> Option<&Node> {
        self.lookup
            .get(name)
            .map(|&slot| &self.children[slot].1)
    }

    fn ensure_dir(&mut self, name: &str) -> Result<&mut Dir> {
        let slot = match self.lookup.get(name) {
            Some(&slot) => slot,
            None => {
                let slot = self.children.len();
                self.children
                    .push((name.to_string(), Node::Dir(Dir::default())));
                self.lookup.insert(name.to_string(), slot);
                slot
            }
        };
        match &mut self.children[slot].1 {
            Node::Dir(dir) => Ok(dir),
            Node::File { .. } => Err(Error::MetainfoInvalid {
                reason: format!("path component {name} is both a file and a directory"),
            }),
        }
    }

    fn insert_file(&mut self, name: &str, file_index: u32, size: u64) -> Result<()> {
        if self.lookup.contains_key(name) {
            return Err(Error::MetainfoInvalid {
                reason: format!("duplicate entry {name}"),
            });
        }
        let slot = self.children.len();
        self.children
            .push((name.to_string(), Node::File { file_index, size }));
        self.lookup.insert(name.to_string(), slot);
        Ok(())
    }
}

/// The primary index implementation.
pub struct PathIndex {
    root: Dir,
}

impl PathIndex {
    /// Build the tree from the torrent's file entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetainfoInvalid`] on empty path components, duplicate
    /// names, or file/directory conflicts.
    pub fn build(entries: &[FileEntry]) -> Result<Self> {
        let mut root = Dir::default();
        for entry in entries {
            let path = normalize(&entry.path);
            if path.is_empty() {
                return Err(Error::MetainfoInvalid {
                    reason: "file entry with empty path".to_string(),
                });
            }
            let mut components = path.split('/').peekable();
            let mut current = &mut root;
            while let Some(component) = components.next() {
                if component.is_empty() {
                    return Err(Error::MetainfoInvalid {
                        reason: format!("empty path component in {path}"),
                    });
                }
                if components.peek().is_some() {
                    current = current.ensure_dir(component)?;
                } else {
                    current.insert_file(component, entry.index, entry.size)?;
                }
            }
        }
        Ok(Self { root })
    }

    fn walk_dir(&self, path: &str) -> Result<&Dir> {
        let trimmed = normalize(path);
        if trimmed.is_empty() {
            return Ok(&self.root);
        }
        let mut dir = &self.root;
        for component in trimmed.split('/') {
            let node = dir.get(component).ok_or_else(|| Error::FileNotFound {
                path: trimmed.to_string(),
            })?;
            match node {
                Node::Dir(next) => dir = next,
                Node::File { .. } => {
                    return Err(Error::NotADirectory {
                        path: trimmed.to_string(),
                    });
                }
            }
        }
        Ok(dir)
    }
}

impl PathLookup for PathIndex {
    fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let dir = self.walk_dir(path)?;
        let mut entries: Vec<DirEntry> = dir
            .children
            .iter()
            .map(|(name, node)| match node {
                Node::Dir(_) => DirEntry {
                    name: name.clone(),
                    kind: EntryKind::Dir,
                    size: 0,
                },
                Node::File { size, .. } => DirEntry {
                    name: name.clone(),
                    kind: EntryKind::File,
                    size: *size,
                },
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, path: &str) -> Result<PathStat> {
        let trimmed = normalize(path);
        if trimmed.is_empty() {
            return Ok(PathStat {
                kind: EntryKind::Dir,
                size: 0,
                file_index: None,
            });
        }
        let mut dir = &self.root;
        let mut components = trimmed.split('/').peekable();
        while let Some(component) = components.next() {
            let node = dir.get(component).ok_or_else(|| Error::FileNotFound {
                path: trimmed.to_string(),
            })?;
            match (node, components.peek()) {
                (Node::Dir(next), Some(_)) => dir = next,
                (Node::Dir(_), None) => {
                    return Ok(PathStat {
                        kind: EntryKind::Dir,
                        size: 0,
                        file_index: None,
                    });
                }
                (Node::File { file_index, size }, None) => {
                    return Ok(PathStat {
                        kind: EntryKind::File,
                        size: *size,
                        file_index: Some(*file_index),
                    });
                }
                (Node::File { .. }, Some(_)) => {
                    return Err(Error::FileNotFound {
                        path: trimmed.to_string(),
                    });
                }
            }
        }
        Err(Error::FileNotFound {
            path: trimmed.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract_tests::{assert_contract, sample_entries};
    use super::*;

    #[test]
    fn satisfies_the_lookup_contract() {
        let index = PathIndex::build(&sample_entries()).unwrap();
        assert_contract(&index);
    }

    #[test]
    fn rejects_conflicting_entries() {
        let entries = vec![
            FileEntry {
                index: 0,
                path: "demo/a".to_string(),
                size: 1,
            },
            FileEntry {
                index: 1,
                path: "demo/a/b".to_string(),
                size: 1,
            },
        ];
        assert!(PathIndex::build(&entries).is_err());

        let duplicates = vec![
            FileEntry {
                index: 0,
                path: "demo/a".to_string(),
                size: 1,
            },
            FileEntry {
                index: 1,
                path: "demo/a".to_string(),
                size: 2,
            },
        ];
        assert!(PathIndex::build(&duplicates).is_err());
    }

    #[test]
    fn traversal_through_a_file_is_not_found() {
        let index = PathIndex::build(&sample_entries()).unwrap();
        assert!(matches!(
            index.stat("demo/a.bin/deeper"),
            Err(Error::FileNotFound { .. })
        ));
    }
}
