//! Capability contract offered by a swarm-library session.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use torrentfs_core::TorrentMetainfo;

/// Capabilities the backing library actually exposes.
///
/// When a capability is absent the engine falls back to file-level
/// priorities and logs a one-shot warning; it never fails the request.
#[derive(Debug, Clone, Copy)]
pub struct SessionCaps {
    /// Per-piece priority control is available.
    pub piece_priority: bool,
    /// Initial hash verification can be skipped.
    pub skip_check: bool,
    /// Sequential-download bias can be toggled.
    pub sequential: bool,
}

impl Default for SessionCaps {
    fn default() -> Self {
        Self {
            piece_priority: true,
            skip_check: true,
            sequential: true,
        }
    }
}

/// Library-level status snapshot, prior to engine enrichment.
#[derive(Debug, Clone, Default)]
pub struct SessionStatus {
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
    /// Connected peer count.
    pub peers: u32,
    /// Connected seed count.
    pub seeds: u32,
    /// Pieces verified and on disk.
    pub pieces_done: u32,
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
    pub checking_progress: Option<f64>,
    /// Whether the session is paused.
    pub paused: bool,
}

/// One connected peer as reported by the library.
#[derive(Debug, Clone)]
pub struct SwarmPeer {
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

/// One tracker entry as held by the session.
#[derive(Debug, Clone)]
pub struct SwarmTracker {
    /// Announce URL.
    pub url: String,
    /// Tier the tracker sits in (0 is tried first).
    pub tier: u32,
    /// Whether the last announce succeeded, when known.
    pub working: Option<bool>,
    /// Last announce error or status message, when known.
    pub message: Option<String>,
}

impl SwarmTracker {
    /// A tracker that has not been announced to yet.
    #[must_use]
    pub const fn pending(url: String, tier: u32) -> Self {
        Self {
            url,
            tier,
            working: None,
            message: None,
        }
    }
}

/// Session handle for one torrent inside the swarm library.
///
/// All methods take `&self`: the underlying handles are thread-safe and the
/// engine calls into the session from concurrent readers.
#[async_trait]
pub trait SwarmSession: Send + Sync {
    /// The capabilities this session actually supports.
    fn caps(&self) -> SessionCaps;

    /// Set the download priority of one file (0 disables download).
    async fn file_priority(&self, file: u32, priority: u8) -> Result<()>;

    /// Current per-file priorities, in file-list order.
    async fn file_priorities(&self) -> Result<Vec<u8>>;

    /// Set the download priority of one piece.
    async fn piece_priority(&self, piece: u32, priority: u8) -> Result<()>;

    /// Current priority of one piece.
    async fn piece_priority_of(&self, piece: u32) -> Result<u8>;

    /// Whether one piece is verified and on disk.
    async fn have_piece(&self, piece: u32) -> Result<bool>;

    /// Library-level status snapshot.
    async fn status(&self) -> Result<SessionStatus>;

    /// Bytes on disk per file, in file-list order.
    async fn file_progress(&self) -> Result<Vec<u64>>;

    /// Current tracker list.
    async fn trackers(&self) -> Result<Vec<SwarmTracker>>;

    /// Append one tracker at the given tier.
    async fn add_tracker(&self, url: &str, tier: u32) -> Result<()>;

    /// Replace the whole tracker list.
    async fn replace_trackers(&self, trackers: Vec<SwarmTracker>) -> Result<()>;

    /// Announce to all trackers immediately.
    async fn force_reannounce(&self) -> Result<()>;

    /// Re-verify on-disk data against the piece hashes.
    async fn force_recheck(&self) -> Result<()>;

    /// Pause the torrent.
    async fn pause(&self) -> Result<()>;

    /// Resume a paused torrent.
    async fn resume(&self) -> Result<()>;

    /// Toggle sequential-download bias.
    async fn set_sequential_download(&self, sequential: bool) -> Result<()>;

    /// Whether sequential-download bias is active.
    async fn sequential_download(&self) -> Result<bool>;

    /// Produce an opaque resume blob for persistence.
    async fn save_resume_data(&self) -> Result<Vec<u8>>;

    /// Restore session state from a previously saved blob.
    async fn load_resume_data(&self, blob: &[u8]) -> Result<()>;

    /// Connected peers.
    async fn peer_info(&self) -> Result<Vec<SwarmPeer>>;

    /// Detach the torrent from the session. Terminal.
    async fn remove(&self) -> Result<()>;
}

/// Construction parameters handed to a [`SessionFactory`].
pub struct SessionParams<'a> {
    /// Parsed metainfo of the torrent being admitted.
    pub meta: &'a TorrentMetainfo,
    /// Directory the sparse payload tree is materialised under.
    pub save_path: &'a Path,
    /// Request to skip the initial hash verification.
    pub skip_check: bool,
    /// Previously persisted resume blob, when present.
    pub resume: Option<&'a [u8]>,
}

/// Creates one session per admitted torrent.
pub trait SessionFactory: Send + Sync {
    /// Build a session for the given torrent.
    ///
    /// # Errors
    ///
    /// Returns an error when the swarm library rejects the torrent.
    fn create(&self, params: SessionParams<'_>) -> Result<Arc<dyn SwarmSession>>;
}
