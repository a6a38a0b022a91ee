//! Head/tail prefetch planning.
//!
//! For each file two byte ranges are derived, sized as a clamped fraction of
//! the file. Media and other files use distinct shapes; the media extension
//! list here is the prefetch list, configured independently from the
//! engine's read-mode gate.

use torrentfs_config::{PrefetchClassConfig, PrefetchConfig, defaults};
use torrentfs_core::{PieceLayout, PrefetchRange, PrefetchReport};

const MIB: u64 = 1024 * 1024;

/// One range shape: fraction of the file, clamped between floor and ceiling.
#[derive(Debug, Clone, Copy)]
pub struct RangeShape {
    pct: f64,
    min_bytes: u64,
    max_bytes: u64,
}

impl RangeShape {
    /// Range length for a file of `size` bytes.
    ///
    /// Zero-sized files get nothing; files at or below the floor are covered
    /// whole; otherwise `round(size * pct)` clamped to `[min, max]` and
    /// clipped to the file. The ceiling wins when configuration puts it
    /// below the floor.
    #[must_use]
    pub fn len(&self, size: u64) -> u64 {
        if size == 0 {
            return 0;
        }
        if size <= self.min_bytes {
            return size;
        }
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scaled = (size as f64 * self.pct).round() as u64;
        scaled.max(self.min_bytes).min(self.max_bytes).min(size)
    }
}

#[derive(Debug, Clone, Copy)]
struct ClassShape {
    head: RangeShape,
    tail: RangeShape,
}

impl ClassShape {
    /// Resolve a class configuration, filling unset fields from the class
    /// defaults.
    fn resolve(
        config: &PrefetchClassConfig,
        start: (f64, u64, u64),
        end: (f64, u64, u64),
    ) -> Self {
        Self {
            head: RangeShape {
                pct: config.start_pct.unwrap_or(start.0),
                min_bytes: config.start_min_mb.unwrap_or(start.1) * MIB,
                max_bytes: config.start_max_mb.unwrap_or(start.2) * MIB,
            },
            tail: RangeShape {
                pct: config.end_pct.unwrap_or(end.0),
                min_bytes: config.end_min_mb.unwrap_or(end.1) * MIB,
                max_bytes: config.end_max_mb.unwrap_or(end.2) * MIB,
            },
        }
    }
}

/// Resolved prefetch policy for one engine.
#[derive(Debug, Clone)]
pub struct PrefetchPolicy {
    media: ClassShape,
    other: ClassShape,
    media_extensions: Vec<String>,
}

impl PrefetchPolicy {
    /// Build the policy from the configuration section.
    #[must_use]
    pub fn from_config(config: &PrefetchConfig) -> Self {
        Self {
            media: ClassShape::resolve(
                &config.media,
                defaults::PREFETCH_MEDIA_START,
                defaults::PREFETCH_MEDIA_END,
            ),
            other: ClassShape::resolve(
                &config.other,
                defaults::PREFETCH_OTHER_START,
                defaults::PREFETCH_OTHER_END,
            ),
            media_extensions: config.media.extensions.clone().unwrap_or_else(|| {
                defaults::PREFETCH_MEDIA_EXTENSIONS
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            }),
        }
    }

    /// Whether the prefetch policy classifies a path as media.
    #[must_use]
    pub fn is_media(&self, path: &str) -> bool {
        has_extension(path, &self.media_extensions)
    }

    /// The head (and possibly tail) ranges for a file.
    ///
    /// Ranges are disjoint and ordered; the tail is omitted when it would be
    /// empty or would overlap or touch the head.
    #[must_use]
    pub fn ranges(&self, size: u64, media: bool) -> Vec<PrefetchRange> {
        let shape = if media { &self.media } else { &self.other };
        let head_len = shape.head.len(size);
        let mut ranges = Vec::with_capacity(2);
        if head_len > 0 {
            ranges.push(PrefetchRange {
                start: 0,
                len: head_len,
            });
        }
        let tail_len = shape.tail.len(size);
        if tail_len > 0 && size - tail_len > head_len {
            ranges.push(PrefetchRange {
                start: size - tail_len,
                len: tail_len,
            });
        }
        ranges
    }

    /// Planned byte budget for a file.
    #[must_use]
    pub fn bytes(&self, size: u64, media: bool) -> u64 {
        self.ranges(size, media).iter().map(|range| range.len).sum()
    }

    /// Full prefetch report for one file, with the covered pieces.
    #[must_use]
    pub fn report(
        &self,
        path: &str,
        file_index: u32,
        size: u64,
        layout: &PieceLayout,
    ) -> PrefetchReport {
        let media = self.is_media(path);
        let ranges = self.ranges(size, media);
        let mut pieces: Vec<u32> = Vec::new();
        for range in &ranges {
            for piece in layout.pieces_for_range(file_index, range.start, range.len) {
                if pieces.last() != Some(&piece) {
                    pieces.push(piece);
                }
            }
        }
        pieces.dedup();
        let bytes: u64 = ranges.iter().map(|range| range.len).sum();
        #[allow(clippy::cast_precision_loss)]
        let coverage_pct = if size == 0 {
            0.0
        } else {
            (bytes as f64 / size as f64) * 100.0
        };
        PrefetchReport {
            path: path.to_string(),
            ranges,
            bytes,
            pieces,
            coverage_pct,
        }
    }
}

/// Case-insensitive extension match against a normalised dot-prefixed list.
#[must_use]
pub fn has_extension(path: &str, extensions: &[String]) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    let Some(dot) = name.rfind('.') else {
        return false;
    };
    let ext = name[dot..].to_ascii_lowercase();
    extensions.iter().any(|candidate| candidate == &ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use torrentfs_config::Config;

    fn policy() -> PrefetchPolicy {
        PrefetchPolicy::from_config(&Config::default().prefetch)
    }

    #[test]
    fn small_files_are_covered_whole() {
        let policy = policy();
        // Below the 4 MiB media head floor: the head swallows the file, the
        // tail would touch it and is omitted.
        let ranges = policy.ranges(1024, true);
        assert_eq!(
            ranges,
            vec![PrefetchRange {
                start: 0,
                len: 1024
            }]
        );
    }

    #[test]
    fn zero_sized_files_get_nothing() {
        assert!(policy().ranges(0, true).is_empty());
        assert_eq!(policy().bytes(0, false), 0);
    }

    #[test]
    fn large_media_files_get_disjoint_head_and_tail() {
        let policy = policy();
        let size = 2 * 1024 * MIB; // 2 GiB
        let ranges = policy.ranges(size, true);
        assert_eq!(ranges.len(), 2);
        // Head: 2% of 2 GiB clamps to the 16 MiB ceiling.
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[0].len, 16 * MIB);
        // Tail: 1% clamps to the 8 MiB ceiling, anchored at the end.
        assert_eq!(ranges[1].len, 8 * MIB);
        assert_eq!(ranges[1].end(), size);
        assert!(ranges[1].start > ranges[0].end());
    }

    #[test]
    fn other_class_uses_its_own_shape() {
        let policy = policy();
        let size = 1024 * MIB;
        let media = policy.bytes(size, true);
        let other = policy.bytes(size, false);
        assert!(other < media);
    }

    #[test]
    fn extension_gate_is_case_insensitive_and_respects_dirs() {
        let policy = policy();
        assert!(policy.is_media("movies/Some.Film.MKV"));
        assert!(policy.is_media("a/b/c.mp3"));
        assert!(!policy.is_media("notes/readme.txt"));
        assert!(!policy.is_media("no-extension"));
        assert!(!policy.is_media("dir.mkv/file.txt"));
    }

    #[test]
    fn partial_overrides_keep_class_defaults() {
        let mut config = Config::default().prefetch;
        config.media.start_max_mb = Some(2);
        let policy = PrefetchPolicy::from_config(&config);
        // The head ceiling dropped to 2 MiB; everything else, including the
        // default prefetch media extensions, stays intact.
        let ranges = policy.ranges(2 * 1024 * MIB, true);
        assert_eq!(ranges[0].len, 2 * MIB);
        assert!(policy.is_media("clip.m2ts"));
    }

    #[test]
    fn report_lists_covered_pieces() {
        use torrentfs_core::PieceLayout;

        let policy = policy();
        let size = 64 * MIB;
        let layout = PieceLayout::new(4 * MIB, vec![size]).unwrap();
        let report = policy.report("demo/video.mkv", 0, size, &layout);
        assert_eq!(report.ranges.len(), 2);
        assert!(report.bytes <= size);
        // Head covers pieces 0..4 (16 MiB over 4 MiB pieces); tail covers the
        // last two pieces (8 MiB).
        assert!(report.pieces.contains(&0));
        assert!(report.pieces.contains(&15));
        assert!(report.coverage_pct > 0.0 && report.coverage_pct <= 100.0);

        // Ranges are disjoint and ordered.
        assert!(report.ranges[0].end() < report.ranges[1].start);
    }
}
