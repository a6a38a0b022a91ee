//! Built-in defaults applied when no configuration file overrides a key.

/// Default ceiling for `.torrent` parse size, in bytes.
pub const MAX_METADATA_BYTES: u64 = 64 * 1024 * 1024;

/// Default period of the background resume-save loop, in seconds.
pub const RESUME_SAVE_INTERVAL_S: u64 = 60;

/// Extensions the engine's `auto` read mode treats as media.
pub const MEDIA_EXTENSIONS: &[&str] = &[
    ".mp4", ".mkv", ".avi", ".mov", ".m4v", ".webm", ".mp3", ".flac", ".aac", ".ogg", ".wav",
];

/// Extensions the prefetch policy treats as media. Deliberately a superset of
/// the read-mode gate; the two lists stay independently configurable.
pub const PREFETCH_MEDIA_EXTENSIONS: &[&str] = &[
    ".mp4", ".mkv", ".avi", ".mov", ".m4v", ".webm", ".ts", ".m2ts", ".wmv", ".mp3", ".flac",
    ".aac", ".ogg", ".wav",
];

/// Media-class head range: fraction of the file, floor and ceiling in MiB.
pub const PREFETCH_MEDIA_START: (f64, u64, u64) = (0.02, 4, 16);
/// Media-class tail range shape.
pub const PREFETCH_MEDIA_END: (f64, u64, u64) = (0.01, 1, 8);
/// Other-class head range shape.
pub const PREFETCH_OTHER_START: (f64, u64, u64) = (0.01, 1, 4);
/// Other-class tail range shape.
pub const PREFETCH_OTHER_END: (f64, u64, u64) = (0.005, 1, 2);

/// Default pause between two prefetched files, in milliseconds.
pub const PREFETCH_SLEEP_MS: u64 = 25;
/// Default number of prefetches between batch pauses.
pub const PREFETCH_BATCH_SIZE: u32 = 10;
/// Default pause after each prefetch batch, in milliseconds.
pub const PREFETCH_BATCH_SLEEP_MS: u64 = 200;
/// Default pause after scanning each directory, in milliseconds.
pub const PREFETCH_SCAN_SLEEP_MS: u64 = 5;
