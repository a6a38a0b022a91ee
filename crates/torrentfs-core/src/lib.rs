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

//! Shared domain types for the torrentfs daemon: the error taxonomy with its
//! stable RPC tokens, the wire-visible DTOs, `.torrent` metainfo parsing, and
//! the piece/byte layout arithmetic every other crate leans on.

pub mod error;
pub mod layout;
pub mod metainfo;
pub mod model;

pub use error::{Error, Result};
pub use layout::{FileSlice, PieceLayout, PieceSpan};
pub use metainfo::{FileEntry, TorrentMetainfo};
pub use model::{
    CacheUsage, DirEntry, EngineState, EntryKind, FileReport, InfohashReport, ListedTorrent,
    PathStat, PeerSnapshot, PinRecord, PrefetchRange, PrefetchReport, PruneReport, ReadMode,
    TorrentInfoSnapshot, TorrentStatusSnapshot, TrackerEntry, TransferTotals,
};
