//! Directory watcher: feeds the manager from a watched `.torrent` directory.
//!
//! New files must pass a size-stability gate before admission; files that
//! keep failing are quarantined under `torrent_dir/bad/`; files that vanish
//! take their engine (and cache) with them.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use torrentfs_core::Error;

use crate::manager::TorrentManager;

/// Default poll interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
/// Gap between the two size samples of the stability gate.
const STABILITY_GAP: Duration = Duration::from_millis(500);
/// Failures tolerated before a file is quarantined.
const MAX_ATTEMPTS: u32 = 3;
/// Backoff ceiling.
const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Quarantine directory name inside the watched directory.
const QUARANTINE_DIR: &str = "bad";

/// Operator-facing message substituted for parser-originated failures.
const INVALID_TORRENT_MESSAGE: &str = "arquivo .torrent inválido ou corrompido";

struct PendingRetry {
    error: String,
    attempts: u32,
    next_try: Instant,
}

/// Watches one directory of `.torrent` files.
pub struct TorrentDirWatcher {
    torrent_dir: PathBuf,
    quarantine_dir: PathBuf,
    manager: Arc<TorrentManager>,
    interval: Duration,
    seen: HashSet<PathBuf>,
    pending: HashMap<PathBuf, PendingRetry>,
}

impl TorrentDirWatcher {
    /// Create the watcher, ensuring the watched and quarantine directories
    /// exist.
    ///
    /// # Errors
    ///
    /// Fails when either directory cannot be created.
    pub fn new(
        torrent_dir: PathBuf,
        manager: Arc<TorrentManager>,
        interval: Duration,
    ) -> torrentfs_core::Result<Self> {
        let torrent_dir = std::path::absolute(&torrent_dir).unwrap_or(torrent_dir);
        let quarantine_dir = torrent_dir.join(QUARANTINE_DIR);
        fs::create_dir_all(&torrent_dir)
            .map_err(|err| Error::io("create_torrent_dir", &torrent_dir, err))?;
        fs::create_dir_all(&quarantine_dir)
            .map_err(|err| Error::io("create_quarantine_dir", &quarantine_dir, err))?;
        Ok(Self {
            torrent_dir,
            quarantine_dir,
            manager,
            interval,
            seen: HashSet::new(),
            pending: HashMap::new(),
        })
    }

    /// Run the watcher until the stop signal fires.
    pub fn spawn(mut self, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(dir = %self.torrent_dir.display(), "watching for torrents");
            loop {
                self.scan().await;
                tokio::select! {
                    () = tokio::time::sleep(self.interval) => {}
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            return;
                        }
                    }
                }
            }
        })
    }

    /// One watcher pass over the directory.
    pub async fn scan(&mut self) {
        let mut names: Vec<PathBuf> = match fs::read_dir(&self.torrent_dir) {
            Ok(entries) => entries
                .filter_map(std::result::Result::ok)
                .map(|entry| entry.path())
                .filter(|path| {
                    path.extension().and_then(|ext| ext.to_str()) == Some("torrent")
                        && path.is_file()
                })
                .collect(),
            Err(err) => {
                warn!(dir = %self.torrent_dir.display(), error = %err, "watcher scan failed");
                return;
            }
        };
        names.sort();

        let current: HashSet<PathBuf> = names.iter().cloned().collect();
        let new_paths: Vec<PathBuf> = names
            .into_iter()
            .filter(|path| !self.seen.contains(path))
            .collect();
        let total_new = new_paths.len();

        for (position, path) in new_paths.into_iter().enumerate() {
            let name = basename(&path);
            if let Some(pending) = self.pending.get(&path) {
                if Instant::now() < pending.next_try {
                    continue;
                }
            }
            if !is_stable(&path).await {
                continue;
            }

            self.manager.wait_for_check_slot(Some(&name)).await;
            info!("loading ({}/{total_new}): {name}", position + 1);
            match self.manager.add_torrent(&path).await {
                Ok(_) => {
                    self.seen.insert(path.clone());
                    self.pending.remove(&path);
                    info!("torrent loaded: {name}");
                }
                Err(err) => self.record_failure(&path, &name, &err),
            }
        }

        let removed: Vec<PathBuf> = self
            .seen
            .iter()
            .filter(|path| !current.contains(*path))
            .cloned()
            .collect();
        for path in removed {
            if self.manager.remove_torrent(&path).await {
                info!("torrent removed: {}", basename(&path));
            }
            self.seen.remove(&path);
            self.pending.remove(&path);
        }
    }

    fn record_failure(&mut self, path: &Path, name: &str, err: &Error) {
        let message = if err.is_metainfo() {
            INVALID_TORRENT_MESSAGE.to_string()
        } else {
            err.to_string()
        };
        let attempts = self
            .pending
            .get(path)
            .map_or(1, |pending| pending.attempts + 1);
        let backoff = self
            .interval
            .saturating_mul(1 << (attempts - 1).min(5))
            .min(MAX_BACKOFF);
        let is_new_error = self
            .pending
            .get(path)
            .is_none_or(|pending| pending.error != message);
        if is_new_error {
            warn!("failed to load {name}: {message}");
        }
        self.pending.insert(
            path.to_path_buf(),
            PendingRetry {
                error: message,
                attempts,
                next_try: Instant::now() + backoff,
            },
        );
        if attempts >= MAX_ATTEMPTS {
            let bad_path = self.quarantine_dir.join(name);
            match fs::rename(path, &bad_path) {
                Ok(()) => {
                    warn!("quarantined: {name} -> {}", bad_path.display());
                    self.pending.remove(path);
                    self.seen.remove(path);
                }
                Err(err) => {
                    warn!(error = %err, "quarantine move failed for {name}");
                }
            }
        }
    }
}

/// Size-stability gate: two equal, non-zero samples half a second apart.
async fn is_stable(path: &Path) -> bool {
    let Ok(first) = fs::metadata(path).map(|meta| meta.len()) else {
        return false;
    };
    tokio::time::sleep(STABILITY_GAP).await;
    let Ok(second) = fs::metadata(path).map(|meta| meta.len()) else {
        return false;
    };
    first > 0 && first == second
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
