//! Error taxonomy shared by the engine, manager, and RPC layers.

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for torrentfs operations.
///
/// Every variant that can reach an RPC client renders to a stable token via
/// [`Error::token`]; anything else is reported as `"<Kind>: <message>"` so
/// the server loop survives unexpected failures.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested path does not exist in the torrent.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that failed to resolve.
        path: String,
    },
    /// A directory operation was applied to a file.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// Offending path.
        path: String,
    },
    /// A file operation was applied to a directory.
    #[error("is a directory: {path}")]
    IsADirectory {
        /// Offending path.
        path: String,
    },
    /// A caller-supplied argument was out of range.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Short description of the violated constraint.
        reason: &'static str,
    },
    /// A `read` request exceeded the per-call size ceiling.
    #[error("read size {size} outside 0..={max}")]
    ReadSizeInvalid {
        /// Requested size.
        size: i64,
        /// Maximum permitted size in bytes.
        max: u64,
    },
    /// The piece wait exceeded the caller-supplied deadline.
    #[error("timed out after {waited_ms} ms with {missing} pieces outstanding")]
    Timeout {
        /// Milliseconds spent waiting before giving up.
        waited_ms: u128,
        /// Number of pieces still missing at the deadline.
        missing: usize,
    },
    /// A per-torrent command arrived without a torrent selector.
    #[error("command requires a torrent selector")]
    TorrentRequired,
    /// A display name matched more than one registered torrent.
    #[error("torrent name is ambiguous: {name}")]
    TorrentNameAmbiguous {
        /// The ambiguous display name.
        name: String,
    },
    /// No registered torrent matched the supplied id or name.
    #[error("torrent not found: {key}")]
    TorrentNotFound {
        /// The id or name that failed to resolve.
        key: String,
    },
    /// The RPC dispatcher received a command it does not implement.
    #[error("unknown command: {cmd}")]
    UnknownCommand {
        /// The unrecognised command string.
        cmd: String,
    },
    /// The `.torrent` payload could not be decoded.
    #[error("invalid torrent metadata: {reason}")]
    MetainfoInvalid {
        /// Decoder-level description of the failure.
        reason: String,
    },
    /// The `.torrent` payload exceeded the configured parse ceiling.
    #[error("torrent metadata is {size} bytes, limit {limit}")]
    MetainfoTooLarge {
        /// Observed payload size.
        size: u64,
        /// Configured ceiling in bytes.
        limit: u64,
    },
    /// A filesystem operation failed.
    #[error("{operation} failed for {path}")]
    Io {
        /// Operation identifier, e.g. `read_cache_file`.
        operation: &'static str,
        /// Path the operation touched.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The swarm library reported a failure.
    #[error("swarm session failure during {operation}")]
    Session {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    /// Shorthand for wrapping an I/O failure with its operation and path.
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Shorthand for wrapping a swarm-library failure.
    pub fn session(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Session {
            operation,
            source: source.into(),
        }
    }

    /// Render the stable token surfaced to RPC clients.
    #[must_use]
    pub fn token(&self) -> String {
        match self {
            Self::FileNotFound { .. } => "FileNotFound".to_string(),
            Self::NotADirectory { .. } => "NotADirectory".to_string(),
            Self::IsADirectory { .. } => "IsADirectory".to_string(),
            Self::InvalidArgument { reason } => format!("InvalidArgument:{reason}"),
            Self::ReadSizeInvalid { .. } => "ReadSizeInvalid".to_string(),
            Self::Timeout { waited_ms, .. } => format!("Timeout:{waited_ms}ms"),
            Self::TorrentRequired => "TorrentRequired".to_string(),
            Self::TorrentNameAmbiguous { name } => format!("TorrentNameAmbiguous:{name}"),
            Self::TorrentNotFound { key } => format!("TorrentNotFound:{key}"),
            Self::UnknownCommand { cmd } => format!("UnknownCommand:{cmd}"),
            Self::MetainfoInvalid { reason } => format!("Metainfo: {reason}"),
            Self::MetainfoTooLarge { size, limit } => {
                format!("Metainfo: payload is {size} bytes, limit {limit}")
            }
            Self::Io { operation, path, .. } => {
                format!("Io: {operation} failed for {}", path.display())
            }
            Self::Session { operation, source } => format!("Session: {operation}: {source}"),
        }
    }

    /// Whether the failure originated in `.torrent` parsing. The directory
    /// watcher uses this to substitute its operator-facing message.
    #[must_use]
    pub const fn is_metainfo(&self) -> bool {
        matches!(
            self,
            Self::MetainfoInvalid { .. } | Self::MetainfoTooLarge { .. }
        )
    }
}

/// Convenience alias for torrentfs operation results.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_stable() {
        let not_found = Error::FileNotFound {
            path: "a/b".into(),
        };
        assert_eq!(not_found.token(), "FileNotFound");

        let ambiguous = Error::TorrentNameAmbiguous {
            name: "ubuntu".into(),
        };
        assert_eq!(ambiguous.token(), "TorrentNameAmbiguous:ubuntu");

        let missing = Error::TorrentNotFound {
            key: "deadbeefcafe".into(),
        };
        assert_eq!(missing.token(), "TorrentNotFound:deadbeefcafe");

        let unknown = Error::UnknownCommand { cmd: "nope".into() };
        assert_eq!(unknown.token(), "UnknownCommand:nope");

        let timeout = Error::Timeout {
            waited_ms: 1500,
            missing: 3,
        };
        assert!(timeout.token().starts_with("Timeout:"));

        let size = Error::ReadSizeInvalid {
            size: -1,
            max: 4 * 1024 * 1024,
        };
        assert_eq!(size.token(), "ReadSizeInvalid");
    }

    #[test]
    fn metainfo_errors_are_flagged_for_the_watcher() {
        assert!(
            Error::MetainfoInvalid {
                reason: "truncated".into()
            }
            .is_metainfo()
        );
        assert!(
            Error::MetainfoTooLarge {
                size: 10,
                limit: 5
            }
            .is_metainfo()
        );
        assert!(!Error::TorrentRequired.is_metainfo());
    }
}
