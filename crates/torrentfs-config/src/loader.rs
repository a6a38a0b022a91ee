//! Resolution of the effective configuration from the layered search path.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::model::Config;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "TORRENTFSD_CONFIG";

const USER_CONFIG_SUFFIX: &str = "torrentfs/torrentfsd.json";
const SYSTEM_CONFIG_PATH: &str = "/etc/torrentfs/torrentfsd.json";

/// First existing file in the search path, if any.
///
/// Order: `$TORRENTFSD_CONFIG`, `~/.config/torrentfs/torrentfsd.json`,
/// `/etc/torrentfs/torrentfsd.json`. An explicit env path is returned even
/// when the file is missing so the failure surfaces loudly instead of
/// silently falling back.
#[must_use]
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        if !explicit.is_empty() {
            return Some(PathBuf::from(explicit));
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let user = config_dir.join(USER_CONFIG_SUFFIX);
        if user.is_file() {
            return Some(user);
        }
    }
    let system = Path::new(SYSTEM_CONFIG_PATH);
    if system.is_file() {
        return Some(system.to_path_buf());
    }
    None
}

/// Load the effective configuration from the search path, falling back to
/// the built-in defaults when no file is present.
///
/// # Errors
///
/// Returns an error when a discovered file cannot be read, parsed, or
/// validated.
pub fn load() -> ConfigResult<Config> {
    match resolve_config_path() {
        Some(path) => {
            let config = load_from(&path)?;
            info!(path = %path.display(), "configuration loaded");
            Ok(config)
        }
        None => {
            info!("no configuration file found; using built-in defaults");
            Ok(Config::default())
        }
    }
}

/// Load the configuration from an explicit file.
///
/// # Errors
///
/// Returns an error when the file cannot be read, parsed, or validated.
pub fn load_from(path: &Path) -> ConfigResult<Config> {
    let payload = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: Config =
        serde_json::from_str(&payload).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.normalize();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_from_parses_nested_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("torrentfsd.json");
        fs::write(
            &path,
            r#"{
                "max_metadata_mb": 8,
                "skip_check": true,
                "checking": {"max_active": 2},
                "resume": {"save_interval_s": 0},
                "media": {"extensions": ["MKV", "mp4"]},
                "prefetch": {
                    "media": {"start_pct": 0.05, "start_min_mb": 2, "start_max_mb": 8},
                    "on_start": true,
                    "max_files": 100
                },
                "trackers": {
                    "enable": true,
                    "add": ["udp://tr.example:1337/announce"],
                    "aliases": {"tr.example": "tracker.example.org"}
                }
            }"#,
        )
        .unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.max_metadata_bytes(), 8 * 1024 * 1024);
        assert!(config.skip_check);
        assert_eq!(config.checking.max_active, 2);
        assert_eq!(config.resume.save_interval_s, 0);
        assert_eq!(config.media.extensions, vec![".mkv", ".mp4"]);
        assert_eq!(config.prefetch.media.start_pct, Some(0.05));
        assert_eq!(config.prefetch.media.start_min_mb, Some(2));
        // Unset siblings stay unset and resolve from the class defaults.
        assert!(config.prefetch.media.end_pct.is_none());
        assert!(config.prefetch.media.extensions.is_none());
        assert!(config.prefetch.on_start);
        assert_eq!(config.prefetch.max_files, 100);
        assert!(config.trackers.enable);
        assert_eq!(
            config.trackers.aliases.get("tr.example").map(String::as_str),
            Some("tracker.example.org")
        );
    }

    #[test]
    fn load_from_rejects_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("torrentfsd.json");
        fs::write(&path, r#"{"definitely_not_a_key": 1}"#).unwrap();
        assert!(matches!(
            load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn load_from_rejects_invalid_shapes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("torrentfsd.json");
        fs::write(&path, r#"{"prefetch": {"media": {"start_pct": 2.0}}}"#).unwrap();
        assert!(matches!(
            load_from(&path),
            Err(ConfigError::InvalidField { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.json");
        assert!(matches!(load_from(&path), Err(ConfigError::Read { .. })));
    }
}
