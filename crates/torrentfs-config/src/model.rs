//! Configuration schema: every key optional, defaults from [`crate::defaults`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};

/// Effective daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Upper bound on `.torrent` parse size, in MiB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_metadata_mb: Option<u64>,
    /// Upper bound on `.torrent` parse size, in bytes. Wins over the MiB key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_metadata_bytes: Option<u64>,
    /// Skip the initial hash verification when the swarm library supports it.
    pub skip_check: bool,
    /// Resume-data persistence knobs.
    pub resume: ResumeConfig,
    /// Hash-check admission knobs.
    pub checking: CheckingConfig,
    /// Engine-side media classification for `auto` reads.
    pub media: MediaConfig,
    /// Prefetch shapes and start-up walker pacing.
    pub prefetch: PrefetchConfig,
    /// Tracker override list and host rewrites.
    pub trackers: TrackersConfig,
}

impl Config {
    /// Resolved `.torrent` parse ceiling in bytes.
    #[must_use]
    pub fn max_metadata_bytes(&self) -> u64 {
        self.max_metadata_bytes
            .or_else(|| self.max_metadata_mb.map(|mb| mb * 1024 * 1024))
            .unwrap_or(defaults::MAX_METADATA_BYTES)
    }

    /// Validate cross-field constraints after deserialisation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] for out-of-range values.
    pub fn validate(&self) -> ConfigResult<()> {
        self.prefetch.media.validate("prefetch.media")?;
        self.prefetch.other.validate("prefetch.other")?;
        if !matches!(self.prefetch.on_start_mode.as_str(), "media" | "all") {
            return Err(ConfigError::InvalidField {
                section: "prefetch".to_string(),
                field: "on_start_mode".to_string(),
                reason: "must be \"media\" or \"all\"",
            });
        }
        Ok(())
    }

    /// Normalise extension lists: lowercase with a leading dot.
    pub fn normalize(&mut self) {
        normalize_extensions(&mut self.media.extensions);
        if let Some(extensions) = &mut self.prefetch.media.extensions {
            normalize_extensions(extensions);
        }
        if let Some(extensions) = &mut self.prefetch.other.extensions {
            normalize_extensions(extensions);
        }
    }
}

/// Resume-data persistence knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResumeConfig {
    /// Period of the background resume-save loop in seconds; 0 disables it.
    pub save_interval_s: u64,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            save_interval_s: defaults::RESUME_SAVE_INTERVAL_S,
        }
    }
}

/// Hash-check admission knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckingConfig {
    /// Concurrent hash-check ceiling; 0 disables the gate.
    pub max_active: u32,
}

/// Engine-side media classification for `auto` reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    /// Lowercase extension list; a leading dot is added when absent.
    pub extensions: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            extensions: defaults::MEDIA_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Prefetch range shape for one class of files.
///
/// Every field is optional; unset values fall back to the class defaults
/// when the prefetch policy is resolved, so a partial override never
/// disturbs its siblings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrefetchClassConfig {
    /// Head range: fraction of the file size.
    pub start_pct: Option<f64>,
    /// Head range floor in MiB.
    pub start_min_mb: Option<u64>,
    /// Head range ceiling in MiB.
    pub start_max_mb: Option<u64>,
    /// Tail range: fraction of the file size.
    pub end_pct: Option<f64>,
    /// Tail range floor in MiB.
    pub end_min_mb: Option<u64>,
    /// Tail range ceiling in MiB.
    pub end_max_mb: Option<u64>,
    /// Class extension list; only meaningful for the media class.
    pub extensions: Option<Vec<String>>,
}

impl PrefetchClassConfig {
    fn validate(&self, section: &str) -> ConfigResult<()> {
        for (field, pct) in [("start_pct", self.start_pct), ("end_pct", self.end_pct)] {
            if let Some(pct) = pct {
                if !(0.0..=1.0).contains(&pct) {
                    return Err(ConfigError::InvalidField {
                        section: section.to_string(),
                        field: field.to_string(),
                        reason: "must be within [0, 1]",
                    });
                }
            }
        }
        for (field, min, max) in [
            ("start_min_mb", self.start_min_mb, self.start_max_mb),
            ("end_min_mb", self.end_min_mb, self.end_max_mb),
        ] {
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(ConfigError::InvalidField {
                        section: section.to_string(),
                        field: field.to_string(),
                        reason: "floor exceeds ceiling",
                    });
                }
            }
        }
        Ok(())
    }
}

/// Prefetch shapes plus start-up walker pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrefetchConfig {
    /// Media-class range shape and extension list.
    pub media: PrefetchClassConfig,
    /// Other-class range shape.
    pub other: PrefetchClassConfig,
    /// Start a background prefetch walk when a torrent is admitted.
    pub on_start: bool,
    /// `"media"` restricts the walker to media files; `"all"` does not.
    pub on_start_mode: String,
    /// Walker file budget; 0 disables the cap.
    pub max_files: u32,
    /// Pause between two prefetched files, in milliseconds.
    pub sleep_ms: u64,
    /// Number of prefetches between batch pauses.
    pub batch_size: u32,
    /// Pause after each prefetch batch, in milliseconds.
    pub batch_sleep_ms: u64,
    /// Pause after scanning each directory, in milliseconds.
    pub scan_sleep_ms: u64,
    /// Walker directory budget; 0 disables the cap.
    pub max_dirs: u32,
    /// Walker byte budget across planned ranges; 0 disables the cap.
    pub max_bytes: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            media: PrefetchClassConfig::default(),
            other: PrefetchClassConfig::default(),
            on_start: false,
            on_start_mode: "media".to_string(),
            max_files: 0,
            sleep_ms: defaults::PREFETCH_SLEEP_MS,
            batch_size: defaults::PREFETCH_BATCH_SIZE,
            batch_sleep_ms: defaults::PREFETCH_BATCH_SLEEP_MS,
            scan_sleep_ms: defaults::PREFETCH_SCAN_SLEEP_MS,
            max_dirs: 0,
            max_bytes: 0,
        }
    }
}

/// Tracker override list and host rewrites.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackersConfig {
    /// Whether override injection is active.
    pub enable: bool,
    /// Tracker URLs (or alias names) injected at tier 0.
    pub add: Vec<String>,
    /// Alias table: entry names or hostnames rewritten to concrete values.
    pub aliases: HashMap<String, String>,
}

fn normalize_extensions(extensions: &mut Vec<String>) {
    for ext in extensions.iter_mut() {
        let mut lowered = ext.to_ascii_lowercase();
        if !lowered.starts_with('.') {
            lowered.insert(0, '.');
        }
        *ext = lowered;
    }
}
