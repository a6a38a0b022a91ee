//! Manager behaviour: admission, duplicates, pruning, aggregate views.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::watch;

use common::{test_config, torrent_payload, write_torrent};
use torrentfs_core::Error;
use torrentfs_engine::{TorrentManager, torrent_id_from_path};
use torrentfs_swarm::{SimOptions, SimSessionFactory};

fn manager(dir: &TempDir) -> Arc<TorrentManager> {
    let (_tx, rx) = watch::channel(false);
    Arc::new(
        TorrentManager::new(
            dir.path().join("cache"),
            Arc::new(test_config()),
            Arc::new(SimSessionFactory::new(SimOptions::default())),
            rx,
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn add_torrent_is_idempotent_per_path() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let payload = torrent_payload("alpha", 16 * 1024, &[("a.bin", 4096)], &[]);
    let path = write_torrent(dir.path(), "alpha.torrent", &payload);

    let first = manager.add_torrent(&path).await.unwrap();
    let second = manager.add_torrent(&path).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, torrent_id_from_path(&path));
    assert_eq!(manager.len().await, 1);

    let listed = manager.list_torrents().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "alpha");
    assert_eq!(listed[0].torrent_name, "alpha.torrent");
}

#[tokio::test]
async fn duplicate_content_is_rejected_and_cleaned_up() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let payload = torrent_payload("alpha", 16 * 1024, &[("a.bin", 4096)], &[]);
    let x_path = write_torrent(dir.path(), "X.torrent", &payload);
    let y_path = write_torrent(dir.path(), "Y.torrent", &payload);

    let x_id = manager.add_torrent(&x_path).await.unwrap();
    let y_id = manager.add_torrent(&y_path).await.unwrap();
    assert_eq!(x_id, y_id);
    assert_eq!(manager.len().await, 1);

    // The duplicate's cache directory and source file are gone.
    let y_cache = manager.cache_root().join(torrent_id_from_path(&y_path));
    assert!(!y_cache.exists());
    assert!(!y_path.exists());
    assert!(x_path.exists());
}

#[tokio::test]
async fn engines_resolve_by_id_and_unique_name() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let payload = torrent_payload("alpha", 16 * 1024, &[("a.bin", 4096)], &[]);
    let path = write_torrent(dir.path(), "alpha.torrent", &payload);
    let id = manager.add_torrent(&path).await.unwrap();

    assert!(manager.get_engine(&id).await.is_ok());
    assert!(manager.get_engine("alpha").await.is_ok());
    assert!(matches!(
        manager.get_engine("missing").await,
        Err(Error::TorrentNotFound { .. })
    ));
}

#[tokio::test]
async fn shared_display_names_are_ambiguous() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    // Same display name, different content (file sizes differ).
    let first = torrent_payload("alpha", 16 * 1024, &[("a.bin", 4096)], &[]);
    let second = torrent_payload("alpha", 16 * 1024, &[("a.bin", 8192)], &[]);
    manager
        .add_torrent(&write_torrent(dir.path(), "one.torrent", &first))
        .await
        .unwrap();
    manager
        .add_torrent(&write_torrent(dir.path(), "two.torrent", &second))
        .await
        .unwrap();

    assert!(matches!(
        manager.get_engine("alpha").await,
        Err(Error::TorrentNameAmbiguous { .. })
    ));
}

#[tokio::test]
async fn prune_cache_only_touches_orphaned_hex_directories() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let alpha = torrent_payload("alpha", 16 * 1024, &[("a.bin", 4096)], &[]);
    let beta = torrent_payload("beta", 16 * 1024, &[("b.bin", 4096)], &[]);
    let t1 = manager
        .add_torrent(&write_torrent(dir.path(), "alpha.torrent", &alpha))
        .await
        .unwrap();
    let t2 = manager
        .add_torrent(&write_torrent(dir.path(), "beta.torrent", &beta))
        .await
        .unwrap();

    let root = manager.cache_root().to_path_buf();
    fs::create_dir_all(root.join("deadbeefcafe")).unwrap();
    fs::create_dir_all(root.join("notahex1234")).unwrap();
    fs::create_dir_all(root.join("t1-backup")).unwrap();

    let dry = manager.prune_cache(true).await;
    assert_eq!(dry.removed, vec!["deadbeefcafe"]);
    assert!(root.join("deadbeefcafe").exists());

    let report = manager.prune_cache(false).await;
    assert_eq!(report.removed, vec!["deadbeefcafe"]);
    assert_eq!(report.skipped, 2);
    assert!(!root.join("deadbeefcafe").exists());
    assert!(root.join("notahex1234").exists());
    assert!(root.join("t1-backup").exists());
    assert!(root.join(&t1).exists());
    assert!(root.join(&t2).exists());
}

#[tokio::test]
async fn prune_with_empty_registry_removes_all_hex_directories() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let root = manager.cache_root().to_path_buf();
    fs::create_dir_all(root.join("deadbeefcafe")).unwrap();
    fs::create_dir_all(root.join("0123456789ab")).unwrap();
    fs::create_dir_all(root.join("keep-me")).unwrap();

    let report = manager.prune_cache(false).await;
    assert_eq!(report.removed, vec!["0123456789ab", "deadbeefcafe"]);
    assert_eq!(report.skipped, 1);
    assert!(root.join("keep-me").exists());
}

#[tokio::test]
async fn status_all_sums_transfer_totals() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let alpha = torrent_payload("alpha", 16 * 1024, &[("a.bin", 4096)], &[]);
    let beta = torrent_payload("beta", 16 * 1024, &[("b.bin", 4096)], &[]);
    manager
        .add_torrent(&write_torrent(dir.path(), "alpha.torrent", &alpha))
        .await
        .unwrap();
    manager
        .add_torrent(&write_torrent(dir.path(), "beta.torrent", &beta))
        .await
        .unwrap();

    let all = manager.status_all().await;
    assert_eq!(all.torrents.len(), 2);
    // The simulator reports 3 peers and 1 seed per torrent.
    assert_eq!(all.totals.peers, 6);
    assert_eq!(all.totals.seeds, 2);
}

#[tokio::test]
async fn downloads_lists_only_incomplete_torrents_with_active_files() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let payload = torrent_payload("alpha", 16 * 1024, &[("a.bin", 32 * 1024)], &[]);
    let path = write_torrent(dir.path(), "alpha.torrent", &payload);
    let id = manager.add_torrent(&path).await.unwrap();

    // Nothing is prioritised yet: the torrent is incomplete with no files.
    let downloads = manager.downloads(None).await;
    assert_eq!(downloads.len(), 1);
    assert!(downloads[0].files.is_empty());

    // A pin completes the whole (tiny) torrent, dropping it from the view.
    let engine = manager.get_engine(&id).await.unwrap();
    engine.pin("alpha/a.bin").await.unwrap();
    let downloads = manager.downloads(None).await;
    assert!(downloads.is_empty());
}

#[tokio::test]
async fn pending_pins_apply_when_the_torrent_arrives() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    manager.enqueue_pin("alpha.torrent", 0, -1).await;

    let payload = torrent_payload("alpha", 16 * 1024, &[("a.bin", 4096), ("b.bin", 4096)], &[]);
    let path = write_torrent(dir.path(), "alpha.torrent", &payload);
    manager.add_torrent(&path).await.unwrap();

    // The bulk pin runs in the background; wait for it to land.
    let mut pins = Vec::new();
    for _ in 0..100 {
        pins = manager.pinned_all().await;
        if pins.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(pins.len(), 2);
}

#[tokio::test]
async fn remove_torrent_by_id_drops_engine_and_cache() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let payload = torrent_payload("alpha", 16 * 1024, &[("a.bin", 4096)], &[]);
    let path = write_torrent(dir.path(), "alpha.torrent", &payload);
    let id = manager.add_torrent(&path).await.unwrap();
    let cache = manager.cache_root().join(&id);
    assert!(cache.exists());

    assert!(manager.remove_torrent_by_id(&id).await);
    assert!(!manager.remove_torrent_by_id(&id).await);
    assert!(!cache.exists());
    assert!(manager.is_empty().await);

    // Re-adding after removal mints the same id again (same path).
    let re_added = manager.add_torrent(&path).await.unwrap();
    assert_eq!(re_added, id);
}

#[tokio::test]
async fn cache_size_accounts_for_materialised_bytes() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let payload = torrent_payload("alpha", 16 * 1024, &[("a.bin", 16 * 1024)], &[]);
    let path = write_torrent(dir.path(), "alpha.torrent", &payload);
    let id = manager.add_torrent(&path).await.unwrap();

    let engine = manager.get_engine(&id).await.unwrap();
    engine.pin("alpha/a.bin").await.unwrap();

    let usage = manager.cache_size();
    assert!(usage.logical >= 16 * 1024);
}
