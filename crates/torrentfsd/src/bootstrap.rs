//! Boot sequence: configuration, manager, watcher, RPC server, shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::watch;
use tracing::{info, warn};

use torrentfs_config::Config;
use torrentfs_engine::{TorrentDirWatcher, TorrentManager, watcher::DEFAULT_INTERVAL};
use torrentfs_rpc::{RpcServer, default_socket_path};
use torrentfs_swarm::{SessionFactory, SimSessionFactory};

use crate::Args;

/// Serving mode derived from the mutually exclusive flags.
#[derive(Debug)]
enum Mode {
    Single(PathBuf),
    Watched(PathBuf),
}

fn resolve_mode(torrent: Option<PathBuf>, torrent_dir: Option<PathBuf>) -> Result<Mode> {
    match (torrent, torrent_dir) {
        (Some(file), None) => Ok(Mode::Single(file)),
        (None, Some(dir)) => Ok(Mode::Watched(dir)),
        (None, None) => bail!("either --torrent or --torrent-dir is required"),
        (Some(_), Some(_)) => bail!("--torrent and --torrent-dir are mutually exclusive"),
    }
}

fn load_config(explicit: Option<&PathBuf>) -> Result<Config> {
    let config = match explicit {
        Some(path) => torrentfs_config::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => torrentfs_config::load().context("resolving configuration")?,
    };
    Ok(config)
}

/// The swarm backend wired into every engine.
fn session_factory() -> Arc<dyn SessionFactory> {
    Arc::new(SimSessionFactory::default())
}

/// Run the daemon until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error (exit code 1) on configuration or torrent-load failures
/// before the server starts accepting.
pub(crate) async fn run(args: Args) -> Result<()> {
    let mode = resolve_mode(args.torrent, args.torrent_dir)?;
    let config = Arc::new(load_config(args.config.as_ref())?);

    let (stop_tx, stop_rx) = watch::channel(false);
    spawn_signal_listener(stop_tx);

    let manager = Arc::new(
        TorrentManager::new(args.cache, config, session_factory(), stop_rx.clone())
            .context("initialising torrent manager")?,
    );

    let watcher_task = match mode {
        Mode::Single(torrent_file) => {
            let id = manager
                .add_torrent(&torrent_file)
                .await
                .with_context(|| format!("loading {}", torrent_file.display()))?;
            info!(id = %id, "serving single torrent");
            None
        }
        Mode::Watched(torrent_dir) => {
            let watcher = TorrentDirWatcher::new(
                torrent_dir,
                Arc::clone(&manager),
                DEFAULT_INTERVAL,
            )
            .context("initialising directory watcher")?;
            Some(watcher.spawn(stop_rx.clone()))
        }
    };

    let socket_path = args.socket.unwrap_or_else(default_socket_path);
    let server = RpcServer::new(Arc::clone(&manager), socket_path);
    let served = server.run(stop_rx).await;

    if let Some(task) = watcher_task {
        if let Err(err) = task.await {
            warn!(error = %err, "watcher task join failed");
        }
    }
    manager.shutdown_all().await;
    served.context("rpc server failed")?;
    info!("shutdown complete");
    Ok(())
}

/// Propagate SIGINT/SIGTERM into the process-wide stop signal.
fn spawn_signal_listener(stop: watch::Sender<bool>) {
    tokio::spawn(async move {
        let interrupted = tokio::signal::ctrl_c();
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = interrupted => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
                interrupted.await.ok();
            }
        }
        info!("shutdown signal received");
        stop.send(true).ok();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_mode_flag_is_required() {
        assert!(resolve_mode(None, None).is_err());
        assert!(resolve_mode(Some("a.torrent".into()), Some("dir".into())).is_err());
        assert!(matches!(
            resolve_mode(Some("a.torrent".into()), None),
            Ok(Mode::Single(_))
        ));
        assert!(matches!(
            resolve_mode(None, Some("dir".into())),
            Ok(Mode::Watched(_))
        ));
    }

    #[test]
    fn explicit_config_paths_must_exist() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(load_config(Some(&missing)).is_err());
        std::fs::write(dir.path().join("ok.json"), b"{}").unwrap();
        assert!(load_config(Some(&dir.path().join("ok.json"))).is_ok());
    }
}
