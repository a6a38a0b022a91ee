//! Wire-visible DTOs shared between the engine, manager, and RPC server.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Whether a path resolves to a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Regular file backed by a torrent file entry.
    File,
    /// Directory synthesised from the torrent's path structure.
    Dir,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name within its parent directory.
    pub name: String,
    /// File or directory.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// File size in bytes; directories report 0.
    pub size: u64,
}

/// Result of a `stat` lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathStat {
    /// File or directory.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// File size in bytes; directories report 0.
    pub size: u64,
    /// Index into the torrent's file list; absent for directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_index: Option<u32>,
}

impl PathStat {
    /// Interpret the stat as a file, or fail with `IsADirectory`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IsADirectory`] when the stat describes a directory.
    pub fn as_file(&self, path: &str) -> crate::Result<(u32, u64)> {
        match (self.kind, self.file_index) {
            (EntryKind::File, Some(index)) => Ok((index, self.size)),
            _ => Err(Error::IsADirectory {
                path: path.to_string(),
            }),
        }
    }
}

/// Read prioritisation mode requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Sequential bias plus top priorities, for media playback.
    Stream,
    /// No sequential bias; only the required pieces jump the queue.
    Normal,
    /// `Stream` when the file extension is in the configured media set.
    #[default]
    Auto,
}

impl ReadMode {
    /// Parse the wire representation of a read mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for unrecognised mode strings.
    pub fn parse(value: &str) -> crate::Result<Self> {
        match value {
            "stream" => Ok(Self::Stream),
            "normal" => Ok(Self::Normal),
            "auto" => Ok(Self::Auto),
            _ => Err(Error::InvalidArgument {
                reason: "mode must be one of auto, stream, normal",
            }),
        }
    }
}

/// Lifecycle state reported in status snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Initial or forced hash verification in progress.
    Checking,
    /// Session live and serving reads.
    Serving,
    /// Session paused on explicit request.
    Paused,
    /// Session shut down; the engine is about to be dropped.
    Stopped,
}

/// Per-torrent status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentStatusSnapshot {
    /// Torrent display name.
    pub name: String,
    /// Lifecycle state.
    pub state: EngineState,
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
    /// Connected peer count.
    pub peers: u32,
    /// Connected seed count.
    pub seeds: u32,
    /// Total number of pieces.
    pub pieces_total: u32,
    /// Pieces verified and on disk.
    pub pieces_done: u32,
    /// Pieces still outstanding.
    pub pieces_missing: u32,
    /// Total payload bytes downloaded.
    pub downloaded: u64,
    /// Total payload bytes uploaded.
    pub uploaded: u64,
    /// Current download rate in bytes per second.
    pub download_rate: u64,
    /// Current upload rate in bytes per second.
    pub upload_rate: u64,
    /// Whether a hash check is in progress.
    pub checking: bool,
    /// Hash-check completion fraction when `checking`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checking_progress: Option<f64>,
    /// Whether the session is paused.
    pub paused: bool,
}

/// Aggregated transfer counters across all torrents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferTotals {
    /// Sum of downloaded bytes.
    pub downloaded: u64,
    /// Sum of uploaded bytes.
    pub uploaded: u64,
    /// Sum of download rates.
    pub download_rate: u64,
    /// Sum of upload rates.
    pub upload_rate: u64,
    /// Sum of connected peers.
    pub peers: u32,
    /// Sum of connected seeds.
    pub seeds: u32,
}

impl TransferTotals {
    /// Fold one torrent's status into the running totals.
    pub fn add(&mut self, status: &TorrentStatusSnapshot) {
        self.downloaded += status.downloaded;
        self.uploaded += status.uploaded;
        self.download_rate += status.download_rate;
        self.upload_rate += status.upload_rate;
        self.peers += status.peers;
        self.seeds += status.seeds;
    }
}

/// One connected peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSnapshot {
    /// Peer address.
    pub ip: String,
    /// Peer port.
    pub port: u16,
    /// Client identification string.
    pub client: String,
    /// Download rate from this peer in bytes per second.
    pub download_rate: u64,
    /// Upload rate to this peer in bytes per second.
    pub upload_rate: u64,
    /// Bytes received from this peer.
    pub downloaded: u64,
    /// Bytes sent to this peer.
    pub uploaded: u64,
    /// Peer's completion fraction in `[0, 1]`.
    pub progress: f64,
}

/// Metadata view of one file within a torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    /// Slash-separated path within the torrent.
    pub path: String,
    /// Index into the torrent's file list.
    pub file_index: u32,
    /// File size in bytes.
    pub size: u64,
    /// Bytes already on disk for this file.
    pub done: u64,
    /// Current swarm priority (0 disables download).
    pub priority: u8,
    /// Whether the file is in the persistent pin set.
    pub pinned: bool,
}

/// One persisted pin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinRecord {
    /// Pinned path.
    pub path: String,
    /// Index into the torrent's file list.
    pub file_index: u32,
    /// File size in bytes.
    pub size: u64,
    /// Bytes already on disk for this file.
    pub done: u64,
}

/// A half-open byte range covered by the prefetch policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchRange {
    /// First byte of the range.
    pub start: u64,
    /// Range length in bytes.
    pub len: u64,
}

impl PrefetchRange {
    /// Exclusive end of the range.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// Prefetch plan for a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchReport {
    /// File path the plan applies to.
    pub path: String,
    /// Head (and optionally tail) byte ranges, disjoint and ordered.
    pub ranges: Vec<PrefetchRange>,
    /// Total byte budget across all ranges.
    pub bytes: u64,
    /// Piece indexes the ranges cover.
    pub pieces: Vec<u32>,
    /// Percentage of the file covered, in `[0, 100]`.
    pub coverage_pct: f64,
}

/// Static torrent metadata view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentInfoSnapshot {
    /// Torrent display name.
    pub name: String,
    /// Optional comment from the metainfo.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Optional authoring tool from the metainfo.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Optional creation timestamp (Unix seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<i64>,
    /// Piece size in bytes.
    pub piece_length: u64,
    /// Total number of pieces.
    pub num_pieces: u32,
    /// Sum of all file sizes.
    pub total_size: u64,
    /// `"single"` or `"multi"` file mode.
    pub mode: String,
    /// Current tracker URLs, overrides included.
    pub trackers: Vec<String>,
    /// Content hash in hex (v1 preferred).
    pub infohash: String,
    /// Magnet link for the torrent.
    pub magnet: String,
}

/// Content-hash report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfohashReport {
    /// SHA-1 infohash in lowercase hex, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v1_hex: Option<String>,
    /// SHA-256 infohash in lowercase hex, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v2_hex: Option<String>,
}

impl InfohashReport {
    /// The hash used for duplicate detection: v1 when available, else v2.
    #[must_use]
    pub fn registry_key(&self) -> Option<&str> {
        self.v1_hex.as_deref().or(self.v2_hex.as_deref())
    }
}

/// One tracker with its announce state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerEntry {
    /// Announce URL.
    pub url: String,
    /// Tier the tracker sits in (0 is tried first).
    pub tier: u32,
    /// Whether the last announce succeeded, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working: Option<bool>,
    /// Last announce error or status message, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One registered torrent, as returned by `torrents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedTorrent {
    /// Path-derived 12-hex torrent id.
    pub id: String,
    /// Torrent display name.
    pub name: String,
    /// Basename of the source `.torrent` file.
    pub torrent_name: String,
    /// Absolute cache directory for this torrent.
    pub cache: String,
}

/// Cache-root disk usage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheUsage {
    /// Sum of logical file sizes.
    pub logical: u64,
    /// Sum of allocated disk blocks, in bytes.
    pub disk: u64,
}

/// Outcome of a cache-root pruning pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneReport {
    /// Torrent-id directories that were (or would be) deleted.
    pub removed: Vec<String>,
    /// Entries skipped because their name is not a torrent id.
    pub skipped: u32,
}
