#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links
)]
#![allow(clippy::module_name_repetitions)]

//! Daemon entrypoint: parse flags, initialise telemetry, wire the manager,
//! watcher, and RPC server together, and block until shutdown.

mod bootstrap;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

/// Expose a set of BitTorrent swarms as a read-only filesystem daemon.
#[derive(Debug, Parser)]
#[command(name = "torrentfsd", version, about)]
struct Args {
    /// Single `.torrent` file to serve (single-torrent mode).
    #[arg(long, conflicts_with = "torrent_dir")]
    torrent: Option<PathBuf>,

    /// Directory of `.torrent` files to watch (multi-torrent mode).
    #[arg(long)]
    torrent_dir: Option<PathBuf>,

    /// Cache root where sparse payloads are materialised.
    #[arg(long, default_value = "./cache")]
    cache: PathBuf,

    /// Unix socket path; overrides the environment search.
    #[arg(long, env = "TORRENTFSD_SOCKET")]
    socket: Option<PathBuf>,

    /// Configuration file; overrides the layered search path.
    #[arg(long, env = "TORRENTFSD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    telemetry::init();
    match bootstrap::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("fatal: {err:#}");
            ExitCode::FAILURE
        }
    }
}
