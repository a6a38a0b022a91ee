//! Watcher behaviour: stability gate, quarantine, removal of vanished files.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::watch;

use common::{test_config, torrent_payload, write_torrent};
use torrentfs_engine::{TorrentDirWatcher, TorrentManager};
use torrentfs_swarm::{SimOptions, SimSessionFactory};

fn fixture(dir: &TempDir) -> (Arc<TorrentManager>, TorrentDirWatcher) {
    let (_tx, rx) = watch::channel(false);
    let manager = Arc::new(
        TorrentManager::new(
            dir.path().join("cache"),
            Arc::new(test_config()),
            Arc::new(SimSessionFactory::new(SimOptions::default())),
            rx,
        )
        .unwrap(),
    );
    let watcher = TorrentDirWatcher::new(
        dir.path().join("watched"),
        Arc::clone(&manager),
        Duration::from_millis(50),
    )
    .unwrap();
    (manager, watcher)
}

#[tokio::test]
async fn zero_byte_files_never_reach_the_manager() {
    let dir = TempDir::new().unwrap();
    let (manager, mut watcher) = fixture(&dir);
    fs::write(dir.path().join("watched/empty.torrent"), b"").unwrap();

    watcher.scan().await;
    assert!(manager.is_empty().await);
}

#[tokio::test]
async fn stable_torrents_are_admitted_and_vanishing_files_remove_them() {
    let dir = TempDir::new().unwrap();
    let (manager, mut watcher) = fixture(&dir);
    let payload = torrent_payload("alpha", 16 * 1024, &[("a.bin", 4096)], &[]);
    let path = write_torrent(&dir.path().join("watched"), "alpha.torrent", &payload);

    watcher.scan().await;
    assert_eq!(manager.len().await, 1);

    fs::remove_file(&path).unwrap();
    watcher.scan().await;
    assert!(manager.is_empty().await);
}

#[tokio::test]
async fn corrupt_torrents_are_quarantined_after_three_failures() {
    let dir = TempDir::new().unwrap();
    let (manager, mut watcher) = fixture(&dir);
    let bad_source = dir.path().join("watched/corrupt.torrent");
    fs::write(&bad_source, b"definitely not bencode").unwrap();

    let quarantined = dir.path().join("watched/bad/corrupt.torrent");
    for _ in 0..40 {
        watcher.scan().await;
        if quarantined.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    assert!(quarantined.exists(), "corrupt file was not quarantined");
    assert!(!bad_source.exists());
    assert!(manager.is_empty().await);
}
