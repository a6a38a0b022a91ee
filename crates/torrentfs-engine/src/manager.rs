//! Multi-torrent registry: admission, duplicate rejection, check-slot
//! gating, cache pruning, pending pins, and the aggregate views.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use sha1::{Digest, Sha1};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use torrentfs_config::Config;
use torrentfs_core::{
    CacheUsage, Error, FileReport, ListedTorrent, PeerSnapshot, PinRecord, PruneReport, Result,
    TorrentStatusSnapshot, TransferTotals,
};
use torrentfs_swarm::SessionFactory;

use crate::engine::TorrentEngine;
use crate::resume::spawn_resume_saver;

const CHECK_SLOT_POLL: Duration = Duration::from_millis(500);
const CHECK_SLOT_LOG_EVERY: Duration = Duration::from_secs(2);
const CHECKING_LOG_LIMIT: usize = 3;

/// Stable torrent id: first 12 hex characters of the SHA-1 of the absolute
/// metadata-file path. Moving a `.torrent` file deliberately mints a new id
/// (and a fresh cache directory); pruning relies on that.
#[must_use]
pub fn torrent_id_from_path(path: &Path) -> String {
    let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = Sha1::new();
    hasher.update(abs.as_os_str().as_encoded_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}

/// Whether a directory name has the exact shape of a torrent id.
#[must_use]
pub fn is_torrent_id(name: &str) -> bool {
    name.len() == 12
        && name
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[derive(Debug, Clone, Copy)]
struct PendingPin {
    max_files: u32,
    max_depth: i32,
}

/// One torrent's status keyed by id, for the aggregate views.
#[derive(Debug, Serialize)]
pub struct TorrentStatusEntry {
    /// Torrent id.
    pub id: String,
    /// Status snapshot.
    pub status: TorrentStatusSnapshot,
}

/// `status-all` aggregate.
#[derive(Debug, Serialize)]
pub struct StatusAll {
    /// Summed transfer counters.
    pub totals: TransferTotals,
    /// Per-torrent statuses.
    pub torrents: Vec<TorrentStatusEntry>,
}

/// One incomplete torrent with its active files.
#[derive(Debug, Serialize)]
pub struct DownloadEntry {
    /// Torrent id.
    pub id: String,
    /// Status snapshot.
    pub status: TorrentStatusSnapshot,
    /// Positive-priority, incomplete files.
    pub files: Vec<FileReport>,
}

/// One torrent's peer list.
#[derive(Debug, Serialize)]
pub struct PeersEntry {
    /// Torrent id.
    pub id: String,
    /// Status snapshot.
    pub status: TorrentStatusSnapshot,
    /// Connected peers.
    pub peers: Vec<PeerSnapshot>,
}

/// One pin with its owning torrent id.
#[derive(Debug, Serialize)]
pub struct PinnedEntry {
    /// Torrent id.
    pub id: String,
    /// The pin record.
    #[serde(flatten)]
    pub pin: PinRecord,
}

#[derive(Default)]
struct ManagerInner {
    engines: HashMap<String, Arc<TorrentEngine>>,
    by_name: HashMap<String, Vec<String>>,
    by_infohash: HashMap<String, String>,
    pending_pins: HashMap<String, PendingPin>,
}

enum Admission {
    Inserted(Option<PendingPin>),
    Raced,
    Duplicate(String),
}

/// Registry of engines keyed by torrent id.
pub struct TorrentManager {
    cache_root: PathBuf,
    config: Arc<Config>,
    sessions: Arc<dyn SessionFactory>,
    stop: watch::Receiver<bool>,
    inner: Mutex<ManagerInner>,
}

impl TorrentManager {
    /// Create the manager, ensuring the cache root exists.
    ///
    /// # Errors
    ///
    /// Fails when the cache root cannot be created.
    pub fn new(
        cache_root: PathBuf,
        config: Arc<Config>,
        sessions: Arc<dyn SessionFactory>,
        stop: watch::Receiver<bool>,
    ) -> Result<Self> {
        let cache_root =
            std::path::absolute(&cache_root).unwrap_or(cache_root);
        fs::create_dir_all(&cache_root)
            .map_err(|err| Error::io("create_cache_root", &cache_root, err))?;
        Ok(Self {
            cache_root,
            config,
            sessions,
            stop,
            inner: Mutex::new(ManagerInner::default()),
        })
    }

    /// Absolute cache root.
    #[must_use]
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of registered engines.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.engines.len()
    }

    /// Whether no engines are registered.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.engines.is_empty()
    }

    /// Admit one `.torrent` file. Idempotent: re-adding the same path (or a
    /// copy with the same content) returns the already-registered id.
    ///
    /// # Errors
    ///
    /// Fails when the metadata cannot be parsed or the engine cannot be
    /// constructed.
    pub async fn add_torrent(&self, torrent_file: &Path) -> Result<String> {
        let abs = std::path::absolute(torrent_file)
            .map_err(|err| Error::io("absolute_torrent_path", torrent_file, err))?;
        let id = torrent_id_from_path(&abs);
        {
            let inner = self.inner.lock().await;
            if inner.engines.contains_key(&id) {
                return Ok(id);
            }
        }

        let basename = file_basename(&abs);
        self.wait_for_check_slot(Some(&basename)).await;

        // Construction touches disk and the swarm library; keep it outside
        // the registry lock and re-check on the way in.
        let cache_dir = self.cache_root.join(&id);
        let engine = Arc::new(
            TorrentEngine::new(abs.clone(), cache_dir.clone(), &*self.sessions, &self.config)
                .await?,
        );
        let infohash = engine.infohash().registry_key().map(ToString::to_string);
        let name = engine.display_name().to_string();

        let admission = {
            let mut inner = self.inner.lock().await;
            if inner.engines.contains_key(&id) {
                Admission::Raced
            } else if let Some(existing) = infohash
                .as_ref()
                .and_then(|hash| inner.by_infohash.get(hash))
            {
                Admission::Duplicate(existing.clone())
            } else {
                inner.engines.insert(id.clone(), Arc::clone(&engine));
                inner
                    .by_name
                    .entry(name.clone())
                    .or_default()
                    .push(id.clone());
                if let Some(hash) = infohash {
                    inner.by_infohash.insert(hash, id.clone());
                }
                Admission::Inserted(inner.pending_pins.remove(&basename))
            }
        };

        match admission {
            Admission::Raced => {
                // The concurrent add owns the same cache directory; just
                // drop the redundant session.
                engine.shutdown().await;
                Ok(id)
            }
            Admission::Duplicate(existing) => {
                engine.shutdown().await;
                if let Err(err) = fs::remove_dir_all(&cache_dir) {
                    warn!(path = %cache_dir.display(), error = %err, "duplicate cache cleanup failed");
                }
                if let Err(err) = fs::remove_file(&abs) {
                    warn!(path = %abs.display(), error = %err, "duplicate source cleanup failed");
                }
                info!(
                    torrent = %basename,
                    id = %existing,
                    "duplicate torrent ignored"
                );
                Ok(existing)
            }
            Admission::Inserted(pending_pin) => {
                spawn_resume_saver(
                    Arc::downgrade(&engine),
                    Duration::from_secs(self.config.resume.save_interval_s),
                    self.stop.clone(),
                );
                if let Some(pin) = pending_pin {
                    self.spawn_bulk_pin(Arc::clone(&engine), pin);
                }
                if self.config.prefetch.on_start {
                    self.spawn_prefetch_walker(Arc::clone(&engine));
                }
                info!(torrent = %name, id = %id, "torrent added");
                Ok(id)
            }
        }
    }

    /// Block until a hash-check slot is available, logging the holders
    /// roughly every two seconds.
    pub async fn wait_for_check_slot(&self, pending_name: Option<&str>) {
        let max = self.config.checking.max_active;
        if max == 0 {
            return;
        }
        let mut stop = self.stop.clone();
        let mut last_log: Option<Instant> = None;
        loop {
            let holders = self.checking_info().await;
            if u32::try_from(holders.len()).unwrap_or(u32::MAX) < max {
                return;
            }
            if last_log.is_none_or(|at| at.elapsed() >= CHECK_SLOT_LOG_EVERY) {
                let suffix = pending_name.map(|name| format!(" for {name}")).unwrap_or_default();
                info!(
                    "waiting for checking slot ({}/{max}){suffix} | checking: {}",
                    holders.len(),
                    holders
                        .iter()
                        .take(CHECKING_LOG_LIMIT)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                last_log = Some(Instant::now());
            }
            tokio::select! {
                () = tokio::time::sleep(CHECK_SLOT_POLL) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Describe the engines currently holding check slots.
    async fn checking_info(&self) -> Vec<String> {
        let engines: Vec<(String, Arc<TorrentEngine>)> = {
            let inner = self.inner.lock().await;
            inner
                .engines
                .iter()
                .map(|(id, engine)| (id.clone(), Arc::clone(engine)))
                .collect()
        };
        let mut holders = Vec::new();
        for (id, engine) in engines {
            let Ok(status) = engine.status().await else {
                continue;
            };
            if !status.checking {
                continue;
            }
            let progress = status.checking_progress.unwrap_or(0.0);
            let torrent_file = file_basename(engine.torrent_path());
            let files = engine.files_completion().await.ok();
            match files {
                Some((done, total)) => holders.push(format!(
                    "{} [{id}] ({torrent_file}) ({progress:.2}) files {done}/{total}",
                    status.name
                )),
                None => holders.push(format!(
                    "{} [{id}] ({torrent_file}) ({progress:.2})",
                    status.name
                )),
            }
        }
        holders
    }

    /// Resolve an engine by id, or by display name when unique.
    ///
    /// # Errors
    ///
    /// `TorrentNameAmbiguous` when a name maps to several torrents,
    /// `TorrentNotFound` otherwise.
    pub async fn get_engine(&self, key: &str) -> Result<Arc<TorrentEngine>> {
        let inner = self.inner.lock().await;
        if let Some(engine) = inner.engines.get(key) {
            return Ok(Arc::clone(engine));
        }
        if let Some(ids) = inner.by_name.get(key) {
            if ids.len() == 1 {
                if let Some(engine) = inner.engines.get(&ids[0]) {
                    return Ok(Arc::clone(engine));
                }
            } else {
                return Err(Error::TorrentNameAmbiguous {
                    name: key.to_string(),
                });
            }
        }
        Err(Error::TorrentNotFound {
            key: key.to_string(),
        })
    }

    /// Every registered torrent with its cache directory.
    pub async fn list_torrents(&self) -> Vec<ListedTorrent> {
        let inner = self.inner.lock().await;
        let mut out: Vec<ListedTorrent> = inner
            .engines
            .iter()
            .map(|(id, engine)| ListedTorrent {
                id: id.clone(),
                name: engine.display_name().to_string(),
                torrent_name: file_basename(engine.torrent_path()),
                cache: engine.cache_dir().display().to_string(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    fn snapshot_engines(inner: &ManagerInner) -> Vec<(String, Arc<TorrentEngine>)> {
        let mut engines: Vec<(String, Arc<TorrentEngine>)> = inner
            .engines
            .iter()
            .map(|(id, engine)| (id.clone(), Arc::clone(engine)))
            .collect();
        engines.sort_by(|a, b| a.0.cmp(&b.0));
        engines
    }

    /// Aggregate per-torrent status plus summed totals.
    pub async fn status_all(&self) -> StatusAll {
        let engines = {
            let inner = self.inner.lock().await;
            Self::snapshot_engines(&inner)
        };
        let mut totals = TransferTotals::default();
        let mut torrents = Vec::with_capacity(engines.len());
        for (id, engine) in engines {
            match engine.status().await {
                Ok(status) => {
                    totals.add(&status);
                    torrents.push(TorrentStatusEntry { id, status });
                }
                Err(err) => warn!(id = %id, error = %err, "status snapshot failed"),
            }
        }
        StatusAll { totals, torrents }
    }

    /// Incomplete torrents with their active file lists.
    pub async fn downloads(&self, max_files: Option<usize>) -> Vec<DownloadEntry> {
        let engines = {
            let inner = self.inner.lock().await;
            Self::snapshot_engines(&inner)
        };
        let mut out = Vec::new();
        for (id, engine) in engines {
            let Ok(status) = engine.status().await else {
                continue;
            };
            if status.progress >= 1.0 {
                continue;
            }
            let files = engine.downloading_files(max_files).await.unwrap_or_default();
            out.push(DownloadEntry { id, status, files });
        }
        out
    }

    /// Peers grouped by torrent.
    pub async fn peers_all(&self) -> Vec<PeersEntry> {
        let engines = {
            let inner = self.inner.lock().await;
            Self::snapshot_engines(&inner)
        };
        let mut out = Vec::new();
        for (id, engine) in engines {
            let Ok(status) = engine.status().await else {
                continue;
            };
            let peers = engine.peers().await.unwrap_or_default();
            out.push(PeersEntry { id, status, peers });
        }
        out
    }

    /// Every pin across every torrent.
    pub async fn pinned_all(&self) -> Vec<PinnedEntry> {
        let engines = {
            let inner = self.inner.lock().await;
            Self::snapshot_engines(&inner)
        };
        let mut out = Vec::new();
        for (id, engine) in engines {
            let pins = engine.pinned().await.unwrap_or_default();
            out.extend(pins.into_iter().map(|pin| PinnedEntry {
                id: id.clone(),
                pin,
            }));
        }
        out
    }

    /// Reannounce every torrent; failures are logged and swallowed.
    pub async fn reannounce_all(&self) {
        let engines = {
            let inner = self.inner.lock().await;
            Self::snapshot_engines(&inner)
        };
        for (id, engine) in engines {
            if let Err(err) = engine.reannounce().await {
                warn!(id = %id, error = %err, "reannounce failed");
            }
        }
    }

    /// Logical and allocated cache-root disk usage.
    #[must_use]
    pub fn cache_size(&self) -> CacheUsage {
        let mut usage = CacheUsage::default();
        for entry in WalkDir::new(&self.cache_root)
            .into_iter()
            .filter_map(std::result::Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                usage.logical += meta.len();
                // st_blocks counts 512-byte units.
                usage.disk += meta.blocks() * 512;
            }
        }
        usage
    }

    /// Remove cache directories that belong to no registered torrent.
    ///
    /// Directories named after a live id are kept; anything that is not a
    /// 12-hex name is skipped (never deleted).
    pub async fn prune_cache(&self, dry_run: bool) -> PruneReport {
        let active: HashSet<String> = {
            let inner = self.inner.lock().await;
            inner.engines.keys().cloned().collect()
        };
        let mut report = PruneReport::default();
        let entries = match fs::read_dir(&self.cache_root) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %self.cache_root.display(), error = %err, "cache root scan failed");
                return report;
            }
        };
        for entry in entries.filter_map(std::result::Result::ok) {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                report.skipped += 1;
                continue;
            };
            if active.contains(name) {
                continue;
            }
            if !is_torrent_id(name) {
                report.skipped += 1;
                continue;
            }
            if !dry_run {
                if let Err(err) = fs::remove_dir_all(&path) {
                    warn!(path = %path.display(), error = %err, "prune delete failed");
                    report.skipped += 1;
                    continue;
                }
            }
            report.removed.push(name.to_string());
        }
        report.removed.sort();
        report
    }

    /// Queue a pin-on-load request keyed by `.torrent` basename, starting it
    /// immediately when the torrent is already registered.
    pub async fn enqueue_pin(&self, torrent_name: &str, max_files: u32, max_depth: i32) {
        if torrent_name.is_empty() {
            return;
        }
        let key = file_basename(Path::new(torrent_name));
        let pending = PendingPin {
            max_files,
            max_depth,
        };
        let already_present = {
            let mut inner = self.inner.lock().await;
            let engine = inner
                .engines
                .values()
                .find(|engine| file_basename(engine.torrent_path()) == key)
                .map(Arc::clone);
            if engine.is_none() {
                inner.pending_pins.insert(key.clone(), pending);
            }
            engine
        };
        if let Some(engine) = already_present {
            self.spawn_bulk_pin(engine, pending);
        }
    }

    /// Remove a torrent addressed by its metadata-file path.
    pub async fn remove_torrent(&self, torrent_file: &Path) -> bool {
        let abs = std::path::absolute(torrent_file)
            .unwrap_or_else(|_| torrent_file.to_path_buf());
        self.remove_torrent_by_id(&torrent_id_from_path(&abs)).await
    }

    /// Remove a torrent addressed by id: shut the engine down and delete its
    /// cache directory.
    pub async fn remove_torrent_by_id(&self, id: &str) -> bool {
        let engine = {
            let mut inner = self.inner.lock().await;
            let Some(engine) = inner.engines.remove(id) else {
                return false;
            };
            let name = engine.display_name().to_string();
            if let Some(ids) = inner.by_name.get_mut(&name) {
                ids.retain(|existing| existing != id);
                if ids.is_empty() {
                    inner.by_name.remove(&name);
                }
            }
            if let Some(hash) = engine.infohash().registry_key() {
                if inner.by_infohash.get(hash).map(String::as_str) == Some(id) {
                    inner.by_infohash.remove(hash);
                }
            }
            engine
        };
        engine.shutdown().await;
        if let Err(err) = fs::remove_dir_all(engine.cache_dir()) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    path = %engine.cache_dir().display(),
                    error = %err,
                    "cache removal failed"
                );
            }
        }
        info!(id = %id, "torrent removed");
        true
    }

    /// Stop every engine, persisting resume data.
    pub async fn shutdown_all(&self) {
        let engines = {
            let mut inner = self.inner.lock().await;
            let engines: Vec<Arc<TorrentEngine>> = inner.engines.values().map(Arc::clone).collect();
            inner.engines.clear();
            inner.by_name.clear();
            inner.by_infohash.clear();
            engines
        };
        for engine in engines {
            engine.shutdown().await;
        }
    }

    fn spawn_bulk_pin(&self, engine: Arc<TorrentEngine>, pin: PendingPin) {
        let mut stop = self.stop.clone();
        tokio::spawn(async move {
            let mut pinned = 0_u32;
            let mut errors = 0_u32;
            let mut stack: Vec<(String, i32)> = vec![(String::new(), 0)];
            'walk: while let Some((dir, depth)) = stack.pop() {
                if *stop.borrow_and_update() {
                    return;
                }
                let entries = match engine.list(&dir) {
                    Ok(entries) => entries,
                    Err(_) => {
                        errors += 1;
                        continue;
                    }
                };
                for entry in entries {
                    if pin.max_files > 0 && pinned >= pin.max_files {
                        break 'walk;
                    }
                    let child = join_path(&dir, &entry.name);
                    match entry.kind {
                        torrentfs_core::EntryKind::Dir => {
                            if pin.max_depth >= 0 && depth >= pin.max_depth {
                                continue;
                            }
                            stack.push((child, depth + 1));
                        }
                        torrentfs_core::EntryKind::File => {
                            if engine.pin(&child).await.is_ok() {
                                pinned += 1;
                            } else {
                                errors += 1;
                            }
                        }
                    }
                }
            }
            info!(
                torrent = %engine.display_name(),
                pinned,
                errors,
                "scheduled pin completed"
            );
        });
    }

    fn spawn_prefetch_walker(&self, engine: Arc<TorrentEngine>) {
        let config = Arc::clone(&self.config);
        let mut stop = self.stop.clone();
        tokio::spawn(async move {
            let prefetch = &config.prefetch;
            let media_only = prefetch.on_start_mode == "media";
            let mut count = 0_u32;
            let mut batch_count = 0_u32;
            let mut bytes_used = 0_u64;
            let mut dirs = 0_u32;
            let mut stack: Vec<String> = vec![String::new()];
            'walk: while let Some(dir) = stack.pop() {
                if *stop.borrow_and_update() {
                    return;
                }
                if prefetch.max_dirs > 0 && dirs >= prefetch.max_dirs {
                    break;
                }
                dirs += 1;
                if prefetch.scan_sleep_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(prefetch.scan_sleep_ms)).await;
                }
                let Ok(entries) = engine.list(&dir) else {
                    continue;
                };
                for entry in entries {
                    let child = join_path(&dir, &entry.name);
                    match entry.kind {
                        torrentfs_core::EntryKind::Dir => stack.push(child),
                        torrentfs_core::EntryKind::File => {
                            if prefetch.max_files > 0 && count >= prefetch.max_files {
                                break 'walk;
                            }
                            if media_only && !engine.is_prefetch_media(&child) {
                                continue;
                            }
                            let planned = if prefetch.max_bytes > 0 {
                                let planned = engine.prefetch_bytes(&child).unwrap_or(0);
                                if bytes_used + planned > prefetch.max_bytes {
                                    break 'walk;
                                }
                                planned
                            } else {
                                0
                            };
                            if engine.prefetch(&child).await.is_ok() {
                                count += 1;
                                bytes_used += planned;
                            }
                            batch_count += 1;
                            if prefetch.sleep_ms > 0 {
                                tokio::time::sleep(Duration::from_millis(prefetch.sleep_ms)).await;
                            }
                            if prefetch.batch_size > 0 && batch_count >= prefetch.batch_size {
                                batch_count = 0;
                                if prefetch.batch_sleep_ms > 0 {
                                    tokio::time::sleep(Duration::from_millis(
                                        prefetch.batch_sleep_ms,
                                    ))
                                    .await;
                                }
                            }
                        }
                    }
                }
            }
            debug!(
                torrent = %engine.display_name(),
                files = count,
                "start-up prefetch walk finished"
            );
        });
    }
}

fn file_basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torrent_id_is_short_stable_hex() {
        let id = torrent_id_from_path(Path::new("/tmp/example.torrent"));
        assert_eq!(id.len(), 12);
        assert!(is_torrent_id(&id));
        assert_eq!(id, torrent_id_from_path(Path::new("/tmp/example.torrent")));
        assert_ne!(id, torrent_id_from_path(Path::new("/tmp/other.torrent")));
    }

    #[test]
    fn id_shape_check_rejects_near_misses() {
        assert!(is_torrent_id("deadbeefcafe"));
        assert!(!is_torrent_id("deadbeefcaf"));
        assert!(!is_torrent_id("deadbeefcafe1"));
        assert!(!is_torrent_id("DEADBEEFCAFE"));
        assert!(!is_torrent_id("notahex12345"));
        assert!(!is_torrent_id("t1-backup"));
    }
}
