#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Layered JSON configuration for the torrentfs daemon.
//!
//! The effective configuration is resolved once at startup from the first hit
//! in `$TORRENTFSD_CONFIG`, `~/.config/torrentfs/torrentfsd.json`,
//! `/etc/torrentfs/torrentfsd.json`, falling back to the built-in defaults.
//! Every key is optional; the resolved [`Config`] is exposed read-only.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, load_from, resolve_config_path};
pub use model::{
    CheckingConfig, Config, MediaConfig, PrefetchClassConfig, PrefetchConfig, ResumeConfig,
    TrackersConfig,
};
