//! Resume-blob persistence: `<cache_dir>/.resume_data`, written atomically
//! on a timer and at shutdown. Failures are logged and swallowed; they never
//! fail an RPC.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use torrentfs_core::{Error, Result};

use crate::engine::TorrentEngine;

/// File name of the resume blob inside the cache directory.
pub const RESUME_FILE: &str = ".resume_data";

/// Path of the resume blob for a cache directory.
#[must_use]
pub fn resume_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(RESUME_FILE)
}

/// Read the persisted resume blob, if any.
#[must_use]
pub fn read_resume(cache_dir: &Path) -> Option<Vec<u8>> {
    match fs::read(resume_path(cache_dir)) {
        Ok(blob) => Some(blob),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            warn!(
                cache_dir = %cache_dir.display(),
                error = %err,
                "failed to read resume blob; starting without it"
            );
            None
        }
    }
}

/// Persist a resume blob atomically (temp file + rename).
///
/// # Errors
///
/// Returns an error when the temp file cannot be written or renamed.
pub fn write_resume(cache_dir: &Path, blob: &[u8]) -> Result<()> {
    let target = resume_path(cache_dir);
    let tmp = cache_dir.join(format!("{RESUME_FILE}.tmp"));
    fs::write(&tmp, blob).map_err(|err| Error::io("write_resume_tmp", &tmp, err))?;
    fs::rename(&tmp, &target).map_err(|err| Error::io("rename_resume_file", &target, err))?;
    Ok(())
}

/// Remove the persisted resume blob, tolerating its absence.
pub fn remove_resume(cache_dir: &Path) {
    let target = resume_path(cache_dir);
    if let Err(err) = fs::remove_file(&target) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %target.display(), error = %err, "failed to remove resume blob");
        }
    }
}

/// Spawn the periodic resume saver for one engine.
///
/// The task holds only a weak reference: dropping the engine (removal) ends
/// the loop, as does the process stop signal or a zero interval.
pub fn spawn_resume_saver(
    engine: Weak<TorrentEngine>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
            let Some(engine) = engine.upgrade() else {
                break;
            };
            if engine.is_stopped().await {
                break;
            }
            match engine.save_resume().await {
                Ok(()) => debug!(id = %engine.display_name(), "resume blob saved"),
                Err(err) => {
                    warn!(
                        torrent = %engine.display_name(),
                        error = %err,
                        "periodic resume save failed"
                    );
                }
            }
        }
    }))
}
