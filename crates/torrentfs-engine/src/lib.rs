#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! The torrentfs read-through engine.
//!
//! One [`TorrentEngine`] per torrent owns the swarm session, the sparse
//! cache directory, the path index, and the pin/resume persistence; the
//! [`TorrentManager`] registers engines by path-derived id, arbitrates
//! hash-check admission, and prunes the cache root; the
//! [`TorrentDirWatcher`] feeds the manager from a watched directory.

pub mod engine;
pub mod index;
pub mod manager;
pub mod pins;
pub mod prefetch;
pub mod resume;
pub mod trackers;
pub mod watcher;

pub use engine::TorrentEngine;
pub use index::{FlatIndex, PathIndex, PathLookup};
pub use manager::{TorrentManager, torrent_id_from_path};
pub use prefetch::PrefetchPolicy;
pub use watcher::TorrentDirWatcher;
