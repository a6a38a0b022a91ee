//! Path resolution over a torrent's file list.
//!
//! [`PathIndex`] is the tree the engine normally queries; [`FlatIndex`] is
//! the minimal fallback behind the same contract, used when the tree cannot
//! be built from the metadata. Both are immutable after construction.

mod flat;
mod tree;

pub use flat::FlatIndex;
pub use tree::PathIndex;

use torrentfs_core::{DirEntry, PathStat, Result};

/// Lookup contract shared by both index implementations.
pub trait PathLookup: Send + Sync {
    /// List one directory, entries sorted by name, directory sizes 0.
    ///
    /// # Errors
    ///
    /// `FileNotFound` when the path is absent, `NotADirectory` when it
    /// resolves to a file.
    fn list(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Stat one path. The empty path is the root directory.
    ///
    /// # Errors
    ///
    /// `FileNotFound` when the path is absent.
    fn stat(&self, path: &str) -> Result<PathStat>;
}

/// Strip surrounding slashes; the empty string addresses the root.
#[must_use]
pub(crate) fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}
