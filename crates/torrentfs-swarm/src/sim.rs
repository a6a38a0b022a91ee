//! In-process swarm simulator.
//!
//! `SimSession` honours the full [`SwarmSession`] contract against local disk:
//! a piece whose priority is raised (directly, or through its file) is
//! materialised into the sparse payload tree after a configurable latency,
//! with deterministic content derived from the global byte offset. Hash
//! checks and resume blobs are modelled far enough for the engine's state
//! machine and persistence paths to be exercised for real.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use torrentfs_core::{PieceLayout, TorrentMetainfo};

use crate::session::{
    SessionCaps, SessionFactory, SessionParams, SessionStatus, SwarmPeer, SwarmSession,
    SwarmTracker,
};

/// Deterministic payload byte at a global offset.
#[must_use]
pub fn content_byte(seed: u64, offset: u64) -> u8 {
    u8::try_from(offset.wrapping_mul(31).wrapping_add(seed) % 251).unwrap_or(0)
}

/// Expected bytes of one file range, for test assertions.
#[must_use]
pub fn expected_file_bytes(
    seed: u64,
    layout: &PieceLayout,
    file: u32,
    offset: u64,
    len: u64,
) -> Vec<u8> {
    let base = layout.global_offset(file, offset);
    (0..len).map(|i| content_byte(seed, base + i)).collect()
}

/// Tuning knobs for the simulator.
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Delay between a piece becoming wanted and its completion.
    pub latency: Duration,
    /// Duration of the (initial or forced) hash-check phase.
    pub check_duration: Duration,
    /// Capabilities the simulator advertises.
    pub caps: SessionCaps,
    /// Seed for the deterministic content generator.
    pub seed: u64,
    /// Peer count reported in status snapshots.
    pub peers: u32,
    /// Seed count reported in status snapshots.
    pub seeds: u32,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            check_duration: Duration::ZERO,
            caps: SessionCaps::default(),
            seed: 0x5eed,
            peers: 3,
            seeds: 1,
        }
    }
}

#[derive(Debug)]
struct SimFile {
    path: PathBuf,
    size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SimResume {
    have: Vec<u32>,
    file_priority: Vec<u8>,
    sequential: bool,
}

struct SimInner {
    file_priority: Vec<u8>,
    piece_priority: Vec<u8>,
    have: Vec<bool>,
    wanted_since: HashMap<u32, Instant>,
    sequential: bool,
    paused: bool,
    stopped: bool,
    check_started: Option<Instant>,
    check_until: Option<Instant>,
    downloaded: u64,
    uploaded: u64,
    trackers: Vec<SwarmTracker>,
}

/// In-memory swarm session materialising pieces into the sparse cache.
pub struct SimSession {
    layout: PieceLayout,
    files: Vec<SimFile>,
    options: SimOptions,
    inner: Mutex<SimInner>,
}

impl SimSession {
    fn new(
        layout: PieceLayout,
        files: Vec<SimFile>,
        trackers: Vec<SwarmTracker>,
        options: SimOptions,
        start_checking: bool,
    ) -> Self {
        let num_pieces = layout.num_pieces() as usize;
        let num_files = files.len();
        let now = Instant::now();
        let inner = SimInner {
            file_priority: vec![0; num_files],
            piece_priority: vec![0; num_pieces],
            have: vec![false; num_pieces],
            wanted_since: HashMap::new(),
            sequential: false,
            paused: false,
            stopped: false,
            check_started: start_checking.then_some(now),
            check_until: start_checking.then(|| now + options.check_duration),
            downloaded: 0,
            uploaded: 0,
            trackers,
        };
        Self {
            layout,
            files,
            options,
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimInner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn wanted(&self, inner: &SimInner, piece: u32) -> bool {
        if inner.piece_priority[piece as usize] > 0 {
            return true;
        }
        self.layout
            .piece_slices(piece)
            .iter()
            .any(|slice| inner.file_priority[slice.file as usize] > 0)
    }

    /// Advance simulated time: finish the hash check, complete due pieces.
    fn tick(&self, inner: &mut SimInner) -> Result<()> {
        if inner.stopped || inner.paused {
            return Ok(());
        }
        let now = Instant::now();
        if let Some(until) = inner.check_until {
            if now < until {
                return Ok(());
            }
            inner.check_until = None;
            inner.check_started = None;
        }
        for piece in 0..self.layout.num_pieces() {
            if inner.have[piece as usize] || !self.wanted(inner, piece) {
                continue;
            }
            let since = *inner.wanted_since.entry(piece).or_insert(now);
            if now.duration_since(since) < self.options.latency {
                continue;
            }
            self.materialise(piece)?;
            inner.have[piece as usize] = true;
            inner.downloaded += self
                .layout
                .piece_slices(piece)
                .iter()
                .map(|slice| slice.length)
                .sum::<u64>();
        }
        Ok(())
    }

    fn materialise(&self, piece: u32) -> Result<()> {
        for slice in self.layout.piece_slices(piece) {
            let file = &self.files[slice.file as usize];
            if let Some(parent) = file.path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create payload directory {}", parent.display())
                })?;
            }
            let mut handle = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&file.path)
                .with_context(|| format!("failed to open payload file {}", file.path.display()))?;
            handle.seek(SeekFrom::Start(slice.offset))?;
            let base = self.layout.global_offset(slice.file, slice.offset);
            let buf: Vec<u8> = (0..slice.length)
                .map(|i| content_byte(self.options.seed, base + i))
                .collect();
            handle.write_all(&buf)?;
        }
        Ok(())
    }

    /// Whether a piece's backing regions are present on disk.
    fn piece_on_disk(&self, piece: u32) -> bool {
        self.layout.piece_slices(piece).iter().all(|slice| {
            let file = &self.files[slice.file as usize];
            fs::metadata(&file.path)
                .map(|meta| meta.len() >= slice.offset + slice.length)
                .unwrap_or(false)
        })
    }

    fn restore(&self, blob: &[u8]) -> Result<()> {
        let resume: SimResume =
            serde_json::from_slice(blob).context("resume blob decode failed")?;
        let mut inner = self.lock();
        for piece in resume.have {
            if (piece as usize) < inner.have.len() && self.piece_on_disk(piece) {
                inner.have[piece as usize] = true;
            }
        }
        for (index, priority) in resume.file_priority.into_iter().enumerate() {
            if index < inner.file_priority.len() {
                inner.file_priority[index] = priority;
            }
        }
        inner.sequential = resume.sequential;
        Ok(())
    }

    fn check_file(&self, inner: &SimInner, file: u32) -> u64 {
        let mut done = 0;
        for piece in 0..self.layout.num_pieces() {
            if !inner.have[piece as usize] {
                continue;
            }
            for slice in self.layout.piece_slices(piece) {
                if slice.file == file {
                    done += slice.length;
                }
            }
        }
        done.min(self.layout.file_size(file))
    }
}

#[async_trait]
impl SwarmSession for SimSession {
    fn caps(&self) -> SessionCaps {
        self.options.caps
    }

    async fn file_priority(&self, file: u32, priority: u8) -> Result<()> {
        let mut inner = self.lock();
        let Some(slot) = inner.file_priority.get_mut(file as usize) else {
            bail!("file index {file} out of range");
        };
        *slot = priority;
        self.tick(&mut inner)
    }

    async fn file_priorities(&self) -> Result<Vec<u8>> {
        Ok(self.lock().file_priority.clone())
    }

    async fn piece_priority(&self, piece: u32, priority: u8) -> Result<()> {
        if !self.options.caps.piece_priority {
            bail!("piece priorities are not supported by this session");
        }
        let mut inner = self.lock();
        let Some(slot) = inner.piece_priority.get_mut(piece as usize) else {
            bail!("piece index {piece} out of range");
        };
        *slot = priority;
        self.tick(&mut inner)
    }

    async fn piece_priority_of(&self, piece: u32) -> Result<u8> {
        let inner = self.lock();
        inner
            .piece_priority
            .get(piece as usize)
            .copied()
            .with_context(|| format!("piece index {piece} out of range"))
    }

    async fn have_piece(&self, piece: u32) -> Result<bool> {
        let mut inner = self.lock();
        self.tick(&mut inner)?;
        inner
            .have
            .get(piece as usize)
            .copied()
            .with_context(|| format!("piece index {piece} out of range"))
    }

    async fn status(&self) -> Result<SessionStatus> {
        let mut inner = self.lock();
        self.tick(&mut inner)?;
        let total = self.layout.num_pieces();
        let done = u32::try_from(inner.have.iter().filter(|have| **have).count())
            .unwrap_or(u32::MAX);
        let progress = if total == 0 {
            1.0
        } else {
            f64::from(done) / f64::from(total)
        };
        let checking = inner.check_until.is_some();
        let checking_progress = match (inner.check_started, inner.check_until) {
            (Some(started), Some(until)) if until > started => Some(
                (Instant::now().duration_since(started).as_secs_f64()
                    / until.duration_since(started).as_secs_f64())
                .min(1.0),
            ),
            (Some(_), Some(_)) => Some(1.0),
            _ => None,
        };
        Ok(SessionStatus {
            progress,
            peers: if inner.paused { 0 } else { self.options.peers },
            seeds: if inner.paused { 0 } else { self.options.seeds },
            pieces_done: done,
            downloaded: inner.downloaded,
            uploaded: inner.uploaded,
            download_rate: 0,
            upload_rate: 0,
            checking,
            checking_progress,
            paused: inner.paused,
        })
    }

    async fn file_progress(&self) -> Result<Vec<u64>> {
        let mut inner = self.lock();
        self.tick(&mut inner)?;
        Ok((0..self.files.len())
            .map(|file| self.check_file(&inner, u32::try_from(file).unwrap_or(u32::MAX)))
            .collect())
    }

    async fn trackers(&self) -> Result<Vec<SwarmTracker>> {
        Ok(self.lock().trackers.clone())
    }

    async fn add_tracker(&self, url: &str, tier: u32) -> Result<()> {
        let mut inner = self.lock();
        if inner.trackers.iter().any(|tracker| tracker.url == url) {
            return Ok(());
        }
        inner
            .trackers
            .push(SwarmTracker::pending(url.to_string(), tier));
        Ok(())
    }

    async fn replace_trackers(&self, trackers: Vec<SwarmTracker>) -> Result<()> {
        self.lock().trackers = trackers;
        Ok(())
    }

    async fn force_reannounce(&self) -> Result<()> {
        let mut inner = self.lock();
        for tracker in &mut inner.trackers {
            tracker.working = Some(true);
            tracker.message = Some("announced".to_string());
        }
        Ok(())
    }

    async fn force_recheck(&self) -> Result<()> {
        let survivors: Vec<bool> = {
            let inner = self.lock();
            (0..self.layout.num_pieces())
                .map(|piece| inner.have[piece as usize] && self.piece_on_disk(piece))
                .collect()
        };
        let mut inner = self.lock();
        inner.have = survivors;
        let now = Instant::now();
        inner.check_started = Some(now);
        inner.check_until = Some(now + self.options.check_duration);
        inner.wanted_since.clear();
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.lock().paused = true;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.lock().paused = false;
        Ok(())
    }

    async fn set_sequential_download(&self, sequential: bool) -> Result<()> {
        if !self.options.caps.sequential {
            bail!("sequential download is not supported by this session");
        }
        self.lock().sequential = sequential;
        Ok(())
    }

    async fn sequential_download(&self) -> Result<bool> {
        Ok(self.lock().sequential)
    }

    async fn save_resume_data(&self) -> Result<Vec<u8>> {
        let inner = self.lock();
        let resume = SimResume {
            have: inner
                .have
                .iter()
                .enumerate()
                .filter_map(|(piece, have)| {
                    have.then_some(u32::try_from(piece).unwrap_or(u32::MAX))
                })
                .collect(),
            file_priority: inner.file_priority.clone(),
            sequential: inner.sequential,
        };
        serde_json::to_vec(&resume).context("resume blob encode failed")
    }

    async fn load_resume_data(&self, blob: &[u8]) -> Result<()> {
        self.restore(blob)
    }

    async fn peer_info(&self) -> Result<Vec<SwarmPeer>> {
        let inner = self.lock();
        if inner.paused || inner.stopped {
            return Ok(Vec::new());
        }
        Ok((0..self.options.peers)
            .map(|index| SwarmPeer {
                ip: format!("10.0.0.{}", index + 1),
                port: 6881,
                client: "SimPeer/1.0".to_string(),
                download_rate: 0,
                upload_rate: 0,
                downloaded: 0,
                uploaded: 0,
                progress: if index < self.options.seeds { 1.0 } else { 0.5 },
            })
            .collect())
    }

    async fn remove(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.stopped = true;
        inner.paused = true;
        Ok(())
    }
}

/// Factory producing [`SimSession`] instances, one per admitted torrent.
#[derive(Debug, Clone, Default)]
pub struct SimSessionFactory {
    /// Options applied to every created session.
    pub options: SimOptions,
}

impl SimSessionFactory {
    /// Factory with explicit options.
    #[must_use]
    pub const fn new(options: SimOptions) -> Self {
        Self { options }
    }
}

impl SessionFactory for SimSessionFactory {
    fn create(&self, params: SessionParams<'_>) -> Result<Arc<dyn SwarmSession>> {
        let files = params
            .meta
            .files()
            .iter()
            .map(|entry| SimFile {
                path: params.save_path.join(&entry.path),
                size: entry.size,
            })
            .collect();
        let trackers = params
            .meta
            .tracker_tiers()
            .iter()
            .enumerate()
            .flat_map(|(tier, urls)| {
                let tier = u32::try_from(tier).unwrap_or(u32::MAX);
                urls.iter()
                    .map(move |url| SwarmTracker::pending(url.clone(), tier))
            })
            .collect();
        let start_checking = !(params.skip_check && self.options.caps.skip_check);
        let session = SimSession::new(
            params.meta.layout().clone(),
            files,
            trackers,
            self.options.clone(),
            start_checking,
        );
        if let Some(blob) = params.resume {
            session.restore(blob)?;
        }
        Ok(Arc::new(session))
    }
}
