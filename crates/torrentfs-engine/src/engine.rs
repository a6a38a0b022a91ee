//! Per-torrent engine: session handle, sparse cache, path index, pins,
//! prefetch, tracker overrides, and resume persistence.

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use torrentfs_config::Config;
use torrentfs_core::{
    DirEntry, EngineState, Error, FileReport, InfohashReport, PathStat, PeerSnapshot, PinRecord,
    PrefetchReport, ReadMode, Result, TorrentInfoSnapshot, TorrentMetainfo,
    TorrentStatusSnapshot, TrackerEntry,
};
use torrentfs_swarm::{SessionFactory, SessionParams, SwarmSession, SwarmTracker};

use crate::index::{FlatIndex, PathIndex, PathLookup, normalize};
use crate::pins::{PinSet, PinStore};
use crate::prefetch::{PrefetchPolicy, has_extension};
use crate::resume::{read_resume, remove_resume, write_resume};
use crate::trackers::{expand_alias, override_list};

/// Top priority: pinned files and read-required pieces.
pub const PRIORITY_TOP: u8 = 7;
/// Medium priority used for prefetch ranges.
pub const PRIORITY_PREFETCH: u8 = 4;
/// Low but positive priority for files being read in normal mode.
pub const PRIORITY_LOW: u8 = 1;
/// Priority zero disables download.
pub const PRIORITY_SKIP: u8 = 0;

const PIECE_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Serving,
    Paused,
    Stopped,
}

struct EngineShared {
    pins: PinSet,
    lifecycle: Lifecycle,
}

/// One torrent's long-lived state machine.
pub struct TorrentEngine {
    torrent_path: PathBuf,
    cache_dir: PathBuf,
    meta: Arc<TorrentMetainfo>,
    index: Box<dyn PathLookup>,
    session: Arc<dyn SwarmSession>,
    media_extensions: Vec<String>,
    prefetch: PrefetchPolicy,
    tracker_aliases: std::collections::HashMap<String, String>,
    pin_store: PinStore,
    state: Mutex<EngineShared>,
    piece_priority_warned: AtomicBool,
    sequential_warned: AtomicBool,
}

impl TorrentEngine {
    /// Construct the engine: parse metadata, build the index, create the
    /// swarm session, apply tracker overrides, and reload persisted pins.
    ///
    /// # Errors
    ///
    /// Fails when the metadata cannot be parsed, the cache directory cannot
    /// be created, or the swarm library rejects the torrent.
    pub async fn new(
        torrent_path: PathBuf,
        cache_dir: PathBuf,
        sessions: &dyn SessionFactory,
        config: &Config,
    ) -> Result<Self> {
        fs::create_dir_all(&cache_dir)
            .map_err(|err| Error::io("create_cache_dir", &cache_dir, err))?;

        let meta = Arc::new(TorrentMetainfo::load(
            &torrent_path,
            config.max_metadata_bytes(),
        )?);

        let index: Box<dyn PathLookup> = match PathIndex::build(meta.files()) {
            Ok(tree) => Box::new(tree),
            Err(err) => {
                warn!(
                    torrent = %meta.name(),
                    error = %err,
                    "path index build failed; using the flat fallback"
                );
                Box::new(FlatIndex::new(meta.files().to_vec()))
            }
        };

        let resume_blob = read_resume(&cache_dir);
        let session = sessions
            .create(SessionParams {
                meta: &meta,
                save_path: &cache_dir,
                skip_check: config.skip_check,
                resume: resume_blob.as_deref(),
            })
            .map_err(|err| Error::session("create_session", err))?;
        if config.skip_check && !session.caps().skip_check {
            warn!(
                torrent = %meta.name(),
                "swarm library cannot skip the initial check; verifying normally"
            );
        }

        // Nothing downloads until a read, pin, or prefetch asks for it.
        for index in 0..u32::try_from(meta.files().len()).unwrap_or(u32::MAX) {
            session
                .file_priority(index, PRIORITY_SKIP)
                .await
                .map_err(|err| Error::session("init_file_priority", err))?;
        }

        let engine = Self {
            pin_store: PinStore::new(&cache_dir),
            torrent_path,
            cache_dir,
            index,
            session,
            media_extensions: config.media.extensions.clone(),
            prefetch: PrefetchPolicy::from_config(&config.prefetch),
            tracker_aliases: config.trackers.aliases.clone(),
            meta,
            state: Mutex::new(EngineShared {
                pins: PinSet::default(),
                lifecycle: Lifecycle::Serving,
            }),
            piece_priority_warned: AtomicBool::new(false),
            sequential_warned: AtomicBool::new(false),
        };

        if config.trackers.enable && !config.trackers.add.is_empty() {
            engine.apply_tracker_overrides(&config.trackers.add).await;
        }
        engine.reload_pins().await;
        Ok(engine)
    }

    /// Inject the configured override trackers at tier 0 and reannounce.
    /// Private torrents are exempt; announce failures are transient.
    async fn apply_tracker_overrides(&self, add: &[String]) {
        if self.meta.is_private() {
            debug!(torrent = %self.meta.name(), "private torrent; tracker overrides skipped");
            return;
        }
        let existing: Vec<String> = self
            .meta
            .tracker_tiers()
            .iter()
            .flatten()
            .cloned()
            .collect();
        let overrides = override_list(add, &self.tracker_aliases, &existing);
        if overrides.is_empty() {
            return;
        }
        let mut trackers: Vec<SwarmTracker> = overrides
            .into_iter()
            .map(|url| SwarmTracker::pending(url, 0))
            .collect();
        for (tier, urls) in self.meta.tracker_tiers().iter().enumerate() {
            let tier = u32::try_from(tier + 1).unwrap_or(u32::MAX);
            for url in urls {
                trackers.push(SwarmTracker::pending(url.clone(), tier));
            }
        }
        if let Err(err) = self.session.replace_trackers(trackers).await {
            warn!(torrent = %self.meta.name(), error = %err, "tracker override injection failed");
            return;
        }
        if let Err(err) = self.session.force_reannounce().await {
            warn!(torrent = %self.meta.name(), error = %err, "override reannounce failed");
        }
    }

    /// Reapply the persisted pin set after the index is populated.
    async fn reload_pins(&self) {
        let persisted = match self.pin_store.load() {
            Ok(paths) => paths,
            Err(err) => {
                warn!(torrent = %self.meta.name(), error = %err, "pin set reload failed");
                return;
            }
        };
        if persisted.is_empty() {
            return;
        }
        let mut guard = self.state.lock().await;
        let mut dropped = false;
        for path in persisted {
            match self.index.stat(&path).and_then(|stat| stat.as_file(&path)) {
                Ok((file_index, _)) => {
                    if let Err(err) = self.session.file_priority(file_index, PRIORITY_TOP).await {
                        warn!(path = %path, error = %err, "pin reapply failed");
                        continue;
                    }
                    guard.pins.insert(normalize(&path).to_string(), file_index);
                }
                Err(err) => {
                    warn!(path = %path, error = %err, "dropping stale pin");
                    dropped = true;
                }
            }
        }
        if dropped {
            self.persist_pins(&guard.pins);
        }
        info!(
            torrent = %self.meta.name(),
            pins = guard.pins.len(),
            "persisted pins reapplied"
        );
    }

    fn persist_pins(&self, pins: &PinSet) {
        if let Err(err) = self.pin_store.save(pins) {
            warn!(torrent = %self.meta.name(), error = %err, "pin persistence failed");
        }
    }

    fn warn_piece_priority_once(&self) {
        if !self.piece_priority_warned.swap(true, Ordering::Relaxed) {
            warn!(
                torrent = %self.meta.name(),
                "swarm library lacks per-piece priorities; using file-level priorities"
            );
        }
    }

    fn warn_sequential_once(&self) {
        if !self.sequential_warned.swap(true, Ordering::Relaxed) {
            warn!(
                torrent = %self.meta.name(),
                "swarm library cannot toggle sequential download; continuing without it"
            );
        }
    }

    /// Torrent display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.meta.name()
    }

    /// Absolute path of the source `.torrent` file.
    #[must_use]
    pub fn torrent_path(&self) -> &Path {
        &self.torrent_path
    }

    /// Absolute cache directory of this engine.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Parsed metainfo.
    #[must_use]
    pub fn metainfo(&self) -> &TorrentMetainfo {
        &self.meta
    }

    /// Whether the engine's read-mode gate classifies a path as media.
    #[must_use]
    pub fn is_media_path(&self, path: &str) -> bool {
        has_extension(path, &self.media_extensions)
    }

    /// List a directory of the torrent.
    ///
    /// # Errors
    ///
    /// `FileNotFound` or `NotADirectory` per the index contract.
    pub fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.index.list(path)
    }

    /// Stat a path of the torrent.
    ///
    /// # Errors
    ///
    /// `FileNotFound` when the path is absent.
    pub fn stat(&self, path: &str) -> Result<PathStat> {
        self.index.stat(path)
    }

    /// Read `[offset, offset+size)` of a file, prioritising and then waiting
    /// for the required pieces.
    ///
    /// The engine lock is held only while priorities are mutated; the piece
    /// wait and the file read run outside it, so readers are concurrent.
    /// `timeout: None` waits indefinitely; on expiry no partial data is
    /// returned.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on negative inputs, `IsADirectory` on directories,
    /// `Timeout` when the deadline passes first.
    pub async fn read(
        &self,
        path: &str,
        offset: i64,
        size: i64,
        mode: ReadMode,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>> {
        if offset < 0 || size < 0 {
            return Err(Error::InvalidArgument {
                reason: "offset and size must be non-negative",
            });
        }
        let stat = self.index.stat(path)?;
        let (file_index, file_size) = stat.as_file(path)?;
        #[allow(clippy::cast_sign_loss)]
        let (offset, size) = (offset as u64, size as u64);
        if offset >= file_size {
            return Ok(Vec::new());
        }
        let size = size.min(file_size - offset);
        if size == 0 {
            return Ok(Vec::new());
        }

        let needed = {
            let guard = self.state.lock().await;
            let stream = match mode {
                ReadMode::Stream => true,
                ReadMode::Normal => false,
                ReadMode::Auto => self.is_media_path(path),
            };
            self.prioritise_for_read(&guard.pins, file_index, offset, size, stream)
                .await?
        };

        self.wait_pieces(&needed, timeout).await?;

        let real_path = self.cache_dir.join(&self.meta.files()[file_index as usize].path);
        tokio::task::spawn_blocking(move || read_range(&real_path, offset, size))
            .await
            .map_err(|err| Error::session("read_worker", err.into()))?
    }

    async fn prioritise_for_read(
        &self,
        pins: &PinSet,
        file_index: u32,
        offset: u64,
        size: u64,
        stream: bool,
    ) -> Result<Vec<u32>> {
        let caps = self.session.caps();
        if stream {
            if caps.sequential {
                self.session
                    .set_sequential_download(true)
                    .await
                    .map_err(|err| Error::session("set_sequential", err))?;
            } else {
                self.warn_sequential_once();
            }
        }

        // A pinned file never drops below top priority.
        let file_priority = if stream || pins.contains_index(file_index) {
            PRIORITY_TOP
        } else {
            PRIORITY_LOW
        };
        self.session
            .file_priority(file_index, file_priority)
            .await
            .map_err(|err| Error::session("file_priority", err))?;

        let pieces = self.meta.layout().pieces_for_range(file_index, offset, size);
        if caps.piece_priority {
            for &piece in &pieces {
                self.session
                    .piece_priority(piece, PRIORITY_TOP)
                    .await
                    .map_err(|err| Error::session("piece_priority", err))?;
            }
        } else {
            self.warn_piece_priority_once();
            if file_priority < PRIORITY_TOP {
                self.session
                    .file_priority(file_index, PRIORITY_TOP)
                    .await
                    .map_err(|err| Error::session("file_priority", err))?;
            }
        }
        Ok(pieces)
    }

    async fn wait_pieces(&self, pieces: &[u32], timeout: Option<Duration>) -> Result<()> {
        let start = Instant::now();
        loop {
            let mut missing = 0_usize;
            for &piece in pieces {
                let have = self
                    .session
                    .have_piece(piece)
                    .await
                    .map_err(|err| Error::session("have_piece", err))?;
                if !have {
                    missing += 1;
                }
            }
            if missing == 0 {
                return Ok(());
            }
            if let Some(limit) = timeout {
                if start.elapsed() >= limit {
                    return Err(Error::Timeout {
                        waited_ms: start.elapsed().as_millis(),
                        missing,
                    });
                }
            }
            tokio::time::sleep(PIECE_POLL).await;
        }
    }

    /// Pin a file: top priority, recorded in the persistent pin set.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// `IsADirectory` on directories, `FileNotFound` on absent paths.
    pub async fn pin(&self, path: &str) -> Result<()> {
        let stat = self.index.stat(path)?;
        let (file_index, _) = stat.as_file(path)?;
        let mut guard = self.state.lock().await;
        self.session
            .file_priority(file_index, PRIORITY_TOP)
            .await
            .map_err(|err| Error::session("file_priority", err))?;
        if guard.pins.insert(normalize(path).to_string(), file_index) {
            self.persist_pins(&guard.pins);
        }
        Ok(())
    }

    /// Unpin a file: priority zero, removed from the persistent set.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// `IsADirectory` on directories, `FileNotFound` on absent paths.
    pub async fn unpin(&self, path: &str) -> Result<()> {
        let stat = self.index.stat(path)?;
        let (file_index, _) = stat.as_file(path)?;
        let mut guard = self.state.lock().await;
        self.session
            .file_priority(file_index, PRIORITY_SKIP)
            .await
            .map_err(|err| Error::session("file_priority", err))?;
        if guard.pins.remove(normalize(path)) {
            self.persist_pins(&guard.pins);
        }
        Ok(())
    }

    /// The current pin set with per-file completion.
    ///
    /// # Errors
    ///
    /// Fails when the session cannot report file progress.
    pub async fn pinned(&self) -> Result<Vec<PinRecord>> {
        let progress = self
            .session
            .file_progress()
            .await
            .map_err(|err| Error::session("file_progress", err))?;
        let guard = self.state.lock().await;
        Ok(guard
            .pins
            .iter()
            .map(|(path, file_index)| PinRecord {
                path: path.to_string(),
                file_index,
                size: self.meta.layout().file_size(file_index),
                done: progress.get(file_index as usize).copied().unwrap_or(0),
            })
            .collect())
    }

    /// Raise the prefetch ranges of a file to medium priority. Non-blocking.
    ///
    /// # Errors
    ///
    /// `IsADirectory` on directories, `FileNotFound` on absent paths.
    pub async fn prefetch(&self, path: &str) -> Result<()> {
        let stat = self.index.stat(path)?;
        let (file_index, file_size) = stat.as_file(path)?;
        let report = self
            .prefetch
            .report(path, file_index, file_size, self.meta.layout());

        let _guard = self.state.lock().await;
        let caps = self.session.caps();
        if caps.piece_priority {
            for &piece in &report.pieces {
                let current = self
                    .session
                    .piece_priority_of(piece)
                    .await
                    .map_err(|err| Error::session("piece_priority_of", err))?;
                if current < PRIORITY_PREFETCH {
                    self.session
                        .piece_priority(piece, PRIORITY_PREFETCH)
                        .await
                        .map_err(|err| Error::session("piece_priority", err))?;
                }
            }
        } else {
            self.warn_piece_priority_once();
            let priorities = self
                .session
                .file_priorities()
                .await
                .map_err(|err| Error::session("file_priorities", err))?;
            if priorities.get(file_index as usize).copied().unwrap_or(0) == PRIORITY_SKIP {
                self.session
                    .file_priority(file_index, PRIORITY_LOW)
                    .await
                    .map_err(|err| Error::session("file_priority", err))?;
            }
        }
        Ok(())
    }

    /// The prefetch plan for a file, without applying it.
    ///
    /// # Errors
    ///
    /// `IsADirectory` on directories, `FileNotFound` on absent paths.
    pub fn prefetch_info(&self, path: &str) -> Result<PrefetchReport> {
        let stat = self.index.stat(path)?;
        let (file_index, file_size) = stat.as_file(path)?;
        Ok(self
            .prefetch
            .report(path, file_index, file_size, self.meta.layout()))
    }

    /// Planned prefetch byte budget for a file, for the walker's byte cap.
    ///
    /// # Errors
    ///
    /// `IsADirectory` on directories, `FileNotFound` on absent paths.
    pub fn prefetch_bytes(&self, path: &str) -> Result<u64> {
        Ok(self.prefetch_info(path)?.bytes)
    }

    /// Whether the prefetch policy (not the read-mode gate) classifies a
    /// path as media; the start-up walker filters with this.
    #[must_use]
    pub fn is_prefetch_media(&self, path: &str) -> bool {
        self.prefetch.is_media(path)
    }

    /// Status snapshot.
    ///
    /// # Errors
    ///
    /// Fails when the session cannot report status.
    pub async fn status(&self) -> Result<TorrentStatusSnapshot> {
        let status = self
            .session
            .status()
            .await
            .map_err(|err| Error::session("status", err))?;
        let guard = self.state.lock().await;
        let state = match guard.lifecycle {
            Lifecycle::Stopped => EngineState::Stopped,
            Lifecycle::Paused => EngineState::Paused,
            Lifecycle::Serving => {
                if status.checking {
                    EngineState::Checking
                } else {
                    EngineState::Serving
                }
            }
        };
        let pieces_total = self.meta.layout().num_pieces();
        Ok(TorrentStatusSnapshot {
            name: self.meta.name().to_string(),
            state,
            progress: status.progress,
            peers: status.peers,
            seeds: status.seeds,
            pieces_total,
            pieces_done: status.pieces_done,
            pieces_missing: pieces_total.saturating_sub(status.pieces_done),
            downloaded: status.downloaded,
            uploaded: status.uploaded,
            download_rate: status.download_rate,
            upload_rate: status.upload_rate,
            checking: status.checking,
            checking_progress: status.checking_progress,
            paused: status.paused,
        })
    }

    /// Connected peers.
    ///
    /// # Errors
    ///
    /// Fails when the session cannot enumerate peers.
    pub async fn peers(&self) -> Result<Vec<PeerSnapshot>> {
        let peers = self
            .session
            .peer_info()
            .await
            .map_err(|err| Error::session("peer_info", err))?;
        Ok(peers
            .into_iter()
            .map(|peer| PeerSnapshot {
                ip: peer.ip,
                port: peer.port,
                client: peer.client,
                download_rate: peer.download_rate,
                upload_rate: peer.upload_rate,
                downloaded: peer.downloaded,
                uploaded: peer.uploaded,
                progress: peer.progress,
            })
            .collect())
    }

    /// Metadata view of one file.
    ///
    /// # Errors
    ///
    /// `IsADirectory` on directories, `FileNotFound` on absent paths.
    pub async fn file_info(&self, path: &str) -> Result<FileReport> {
        let stat = self.index.stat(path)?;
        let (file_index, file_size) = stat.as_file(path)?;
        let priorities = self
            .session
            .file_priorities()
            .await
            .map_err(|err| Error::session("file_priorities", err))?;
        let progress = self
            .session
            .file_progress()
            .await
            .map_err(|err| Error::session("file_progress", err))?;
        let guard = self.state.lock().await;
        Ok(FileReport {
            path: normalize(path).to_string(),
            file_index,
            size: file_size,
            done: progress.get(file_index as usize).copied().unwrap_or(0),
            priority: priorities.get(file_index as usize).copied().unwrap_or(0),
            pinned: guard.pins.contains_index(file_index),
        })
    }

    /// Positive-priority, incomplete files, optionally truncated.
    ///
    /// # Errors
    ///
    /// Fails when the session cannot report priorities or progress.
    pub async fn downloading_files(&self, max_files: Option<usize>) -> Result<Vec<FileReport>> {
        let priorities = self
            .session
            .file_priorities()
            .await
            .map_err(|err| Error::session("file_priorities", err))?;
        let progress = self
            .session
            .file_progress()
            .await
            .map_err(|err| Error::session("file_progress", err))?;
        let guard = self.state.lock().await;
        let mut out = Vec::new();
        for entry in self.meta.files() {
            let slot = entry.index as usize;
            let priority = priorities.get(slot).copied().unwrap_or(0);
            let done = progress.get(slot).copied().unwrap_or(0);
            if priority == PRIORITY_SKIP || done >= entry.size {
                continue;
            }
            out.push(FileReport {
                path: entry.path.clone(),
                file_index: entry.index,
                size: entry.size,
                done,
                priority,
                pinned: guard.pins.contains_index(entry.index),
            });
            if let Some(limit) = max_files {
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// `(complete, total)` file counts, for the check-slot log lines.
    ///
    /// # Errors
    ///
    /// Fails when the session cannot report file progress.
    pub async fn files_completion(&self) -> Result<(u32, u32)> {
        let progress = self
            .session
            .file_progress()
            .await
            .map_err(|err| Error::session("file_progress", err))?;
        let mut complete = 0_u32;
        for entry in self.meta.files() {
            let done = progress.get(entry.index as usize).copied().unwrap_or(0);
            if done >= entry.size {
                complete += 1;
            }
        }
        Ok((
            complete,
            u32::try_from(self.meta.files().len()).unwrap_or(u32::MAX),
        ))
    }

    /// Static torrent metadata plus the live tracker list.
    ///
    /// # Errors
    ///
    /// Fails when the session cannot report its trackers.
    pub async fn torrent_info(&self) -> Result<TorrentInfoSnapshot> {
        let trackers = self.trackers().await?;
        let infohash = self
            .infohash()
            .registry_key()
            .unwrap_or_default()
            .to_string();
        Ok(TorrentInfoSnapshot {
            name: self.meta.name().to_string(),
            comment: self.meta.comment().map(ToString::to_string),
            created_by: self.meta.created_by().map(ToString::to_string),
            creation_date: self.meta.creation_date(),
            piece_length: self.meta.layout().piece_length(),
            num_pieces: self.meta.layout().num_pieces(),
            total_size: self.meta.layout().total_size(),
            mode: self.meta.mode_str().to_string(),
            trackers: trackers.into_iter().map(|entry| entry.url).collect(),
            infohash,
            magnet: self.meta.magnet(),
        })
    }

    /// Content hashes of the torrent.
    #[must_use]
    pub fn infohash(&self) -> InfohashReport {
        InfohashReport {
            v1_hex: self.meta.v1_hex().map(ToString::to_string),
            v2_hex: self.meta.v2_hex().map(ToString::to_string),
        }
    }

    /// The live tracker list with announce state.
    ///
    /// # Errors
    ///
    /// Fails when the session cannot report its trackers.
    pub async fn trackers(&self) -> Result<Vec<TrackerEntry>> {
        let trackers = self
            .session
            .trackers()
            .await
            .map_err(|err| Error::session("trackers", err))?;
        Ok(trackers
            .into_iter()
            .map(|tracker| TrackerEntry {
                url: tracker.url,
                tier: tracker.tier,
                working: tracker.working,
                message: tracker.message,
            })
            .collect())
    }

    /// Append trackers (alias-expanded) at tier 0 and reannounce.
    ///
    /// # Errors
    ///
    /// Fails when the session rejects the tracker mutation.
    pub async fn add_trackers(&self, urls: &[String]) -> Result<usize> {
        let _guard = self.state.lock().await;
        let mut added = 0;
        for url in urls {
            let expanded = expand_alias(url, &self.tracker_aliases);
            self.session
                .add_tracker(&expanded, 0)
                .await
                .map_err(|err| Error::session("add_tracker", err))?;
            added += 1;
        }
        if added > 0 {
            if let Err(err) = self.session.force_reannounce().await {
                warn!(torrent = %self.meta.name(), error = %err, "reannounce after add failed");
            }
        }
        Ok(added)
    }

    /// Add trackers and rewrite the source `.torrent`'s announce list so the
    /// change survives a restart. Rewrite failures are logged and swallowed.
    ///
    /// # Errors
    ///
    /// Fails when the session rejects the tracker mutation; never for the
    /// on-disk rewrite.
    pub async fn publish_trackers(&self, urls: &[String]) -> Result<usize> {
        let added = self.add_trackers(urls).await?;
        let expanded: Vec<String> = urls
            .iter()
            .map(|url| expand_alias(url, &self.tracker_aliases))
            .collect();
        let mut tiers = vec![expanded];
        tiers.extend_from_slice(self.meta.tracker_tiers());
        match self.meta.encode_with_tracker_tiers(&tiers) {
            Ok(payload) => {
                let tmp = self.torrent_path.with_extension("torrent.tmp");
                let rewrite = fs::write(&tmp, payload)
                    .and_then(|()| fs::rename(&tmp, &self.torrent_path));
                if let Err(err) = rewrite {
                    warn!(
                        path = %self.torrent_path.display(),
                        error = %err,
                        "announce-list rewrite failed"
                    );
                }
            }
            Err(err) => {
                warn!(torrent = %self.meta.name(), error = %err, "announce-list encode failed");
            }
        }
        Ok(added)
    }

    /// Pause the session.
    ///
    /// # Errors
    ///
    /// Fails when the session rejects the pause.
    pub async fn pause(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        self.session
            .pause()
            .await
            .map_err(|err| Error::session("pause", err))?;
        if guard.lifecycle != Lifecycle::Stopped {
            guard.lifecycle = Lifecycle::Paused;
        }
        Ok(())
    }

    /// Resume a paused session.
    ///
    /// # Errors
    ///
    /// Fails when the session rejects the resume.
    pub async fn resume(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        self.session
            .resume()
            .await
            .map_err(|err| Error::session("resume", err))?;
        if guard.lifecycle == Lifecycle::Paused {
            guard.lifecycle = Lifecycle::Serving;
        }
        Ok(())
    }

    /// Re-verify on-disk data; the engine re-enters the checking state.
    ///
    /// # Errors
    ///
    /// Fails when the session rejects the recheck.
    pub async fn force_recheck(&self) -> Result<()> {
        self.session
            .force_recheck()
            .await
            .map_err(|err| Error::session("force_recheck", err))
    }

    /// Announce to all trackers immediately.
    ///
    /// # Errors
    ///
    /// Fails when the session rejects the announce.
    pub async fn reannounce(&self) -> Result<()> {
        self.session
            .force_reannounce()
            .await
            .map_err(|err| Error::session("force_reannounce", err))
    }

    /// Delete cached payload data (and the resume blob), then recheck.
    ///
    /// With `keep_pins` the pinned files' data and the pin set survive;
    /// without it the pin set is cleared as well.
    ///
    /// # Errors
    ///
    /// Fails when the recheck cannot be issued; individual file deletions
    /// are logged and swallowed.
    pub async fn prune_data(&self, keep_pins: bool) -> Result<()> {
        let mut guard = self.state.lock().await;
        let keep: HashSet<PathBuf> = if keep_pins {
            guard
                .pins
                .iter()
                .map(|(path, _)| self.cache_dir.join(path))
                .collect()
        } else {
            HashSet::new()
        };

        for entry in WalkDir::new(&self.cache_dir)
            .into_iter()
            .filter_map(std::result::Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name().to_str() == Some(crate::pins::PINNED_FILE) {
                continue;
            }
            if keep.contains(entry.path()) {
                continue;
            }
            if let Err(err) = fs::remove_file(entry.path()) {
                warn!(path = %entry.path().display(), error = %err, "prune unlink failed");
            }
        }
        remove_resume(&self.cache_dir);

        if !keep_pins && !guard.pins.is_empty() {
            let indexes: Vec<u32> = guard.pins.iter().map(|(_, index)| index).collect();
            for file_index in indexes {
                if let Err(err) = self.session.file_priority(file_index, PRIORITY_SKIP).await {
                    warn!(error = %err, "priority reset during prune failed");
                }
            }
            guard.pins.clear();
            self.persist_pins(&guard.pins);
        }
        drop(guard);

        self.session
            .force_recheck()
            .await
            .map_err(|err| Error::session("force_recheck", err))
    }

    /// Save the session's resume blob to `<cache_dir>/.resume_data`.
    ///
    /// # Errors
    ///
    /// Fails when the blob cannot be produced or written.
    pub async fn save_resume(&self) -> Result<()> {
        let blob = self
            .session
            .save_resume_data()
            .await
            .map_err(|err| Error::session("save_resume_data", err))?;
        write_resume(&self.cache_dir, &blob)
    }

    /// Whether the engine has been shut down.
    pub async fn is_stopped(&self) -> bool {
        self.state.lock().await.lifecycle == Lifecycle::Stopped
    }

    /// Stop the engine: persist resume data, pause, detach the session.
    /// Idempotent; persistence failures are logged and swallowed.
    pub async fn shutdown(&self) {
        {
            let mut guard = self.state.lock().await;
            if guard.lifecycle == Lifecycle::Stopped {
                return;
            }
            guard.lifecycle = Lifecycle::Stopped;
        }
        if let Err(err) = self.save_resume().await {
            warn!(torrent = %self.meta.name(), error = %err, "resume save at shutdown failed");
        }
        if let Err(err) = self.session.pause().await {
            debug!(torrent = %self.meta.name(), error = %err, "pause at shutdown failed");
        }
        if let Err(err) = self.session.remove().await {
            warn!(torrent = %self.meta.name(), error = %err, "session detach failed");
        }
        info!(torrent = %self.meta.name(), "engine stopped");
    }
}

fn read_range(path: &Path, offset: u64, size: u64) -> Result<Vec<u8>> {
    let mut handle =
        fs::File::open(path).map_err(|err| Error::io("open_cache_file", path, err))?;
    handle
        .seek(SeekFrom::Start(offset))
        .map_err(|err| Error::io("seek_cache_file", path, err))?;
    let mut buf = vec![0_u8; usize::try_from(size).unwrap_or(usize::MAX)];
    handle
        .read_exact(&mut buf)
        .map_err(|err| Error::io("read_cache_file", path, err))?;
    Ok(buf)
}
