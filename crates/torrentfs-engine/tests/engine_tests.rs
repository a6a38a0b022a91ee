//! End-to-end engine behaviour against the simulated swarm.

mod common;

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use common::{CapturingFactory, test_config, torrent_payload, write_torrent};
use torrentfs_core::{EngineState, Error, ReadMode, TorrentMetainfo};
use torrentfs_engine::TorrentEngine;
use torrentfs_swarm::{SimOptions, SwarmSession as _, expected_file_bytes};

const MIB: i64 = 1024 * 1024;

struct Fixture {
    _dir: TempDir,
    torrent_path: PathBuf,
    cache_dir: PathBuf,
    factory: CapturingFactory,
}

impl Fixture {
    fn new(files: &[(&str, i64)], piece_length: i64, options: SimOptions) -> Self {
        let dir = TempDir::new().unwrap();
        let payload = torrent_payload("demo", piece_length, files, &["http://tr.example/a"]);
        let torrent_path = write_torrent(dir.path(), "demo.torrent", &payload);
        let cache_dir = dir.path().join("cache");
        Self {
            torrent_path,
            cache_dir,
            factory: CapturingFactory::new(options),
            _dir: dir,
        }
    }

    async fn engine(&self) -> TorrentEngine {
        TorrentEngine::new(
            self.torrent_path.clone(),
            self.cache_dir.clone(),
            &self.factory,
            &test_config(),
        )
        .await
        .unwrap()
    }
}

fn media_fixture() -> Fixture {
    Fixture::new(
        &[("video.mkv", 5 * MIB), ("notes.txt", 4096)],
        16 * 1024,
        SimOptions::default(),
    )
}

#[tokio::test]
async fn cold_read_returns_exact_bytes() {
    let fixture = media_fixture();
    let engine = fixture.engine().await;

    let before = engine.status().await.unwrap();
    assert_eq!(before.pieces_done, 0);

    let data = engine
        .read("demo/video.mkv", 0, 65536, ReadMode::Auto, None)
        .await
        .unwrap();
    assert_eq!(data.len(), 65536);

    let meta = TorrentMetainfo::load(&fixture.torrent_path, u64::MAX).unwrap();
    let expected = expected_file_bytes(fixture.factory.seed(), meta.layout(), 0, 0, 65536);
    assert_eq!(data, expected);

    let after = engine.status().await.unwrap();
    assert!(u64::from(after.pieces_done) >= 65536 / (16 * 1024));
    assert_eq!(after.state, EngineState::Serving);
}

#[tokio::test]
async fn streaming_tail_sets_sequential_and_returns_tail_bytes() {
    let fixture = media_fixture();
    let engine = fixture.engine().await;
    let size = 5 * MIB;
    let tail = 32 * 1024_i64;

    let data = engine
        .read("demo/video.mkv", size - tail, tail, ReadMode::Stream, None)
        .await
        .unwrap();
    assert_eq!(data.len(), usize::try_from(tail).unwrap());

    let meta = TorrentMetainfo::load(&fixture.torrent_path, u64::MAX).unwrap();
    let expected = expected_file_bytes(
        fixture.factory.seed(),
        meta.layout(),
        0,
        u64::try_from(size - tail).unwrap(),
        u64::try_from(tail).unwrap(),
    );
    assert_eq!(data, expected);

    let session = fixture.factory.last_session();
    assert!(session.sequential_download().await.unwrap());
}

#[tokio::test]
async fn auto_mode_streams_media_but_not_text() {
    let fixture = media_fixture();
    let engine = fixture.engine().await;
    let session = fixture.factory.last_session();

    engine
        .read("demo/notes.txt", 0, 100, ReadMode::Auto, None)
        .await
        .unwrap();
    assert!(!session.sequential_download().await.unwrap());

    engine
        .read("demo/video.mkv", 0, 100, ReadMode::Auto, None)
        .await
        .unwrap();
    assert!(session.sequential_download().await.unwrap());
}

#[tokio::test]
async fn read_boundaries() {
    let fixture = media_fixture();
    let engine = fixture.engine().await;

    // Reads at or past the end of the file return empty bytes.
    assert!(
        engine
            .read("demo/notes.txt", 4096, 100, ReadMode::Normal, None)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        engine
            .read("demo/notes.txt", 9999, 1, ReadMode::Normal, None)
            .await
            .unwrap()
            .is_empty()
    );
    // Zero-size reads are empty and require no piece wait.
    assert!(
        engine
            .read("demo/notes.txt", 0, 0, ReadMode::Normal, Some(Duration::ZERO))
            .await
            .unwrap()
            .is_empty()
    );
    // Size clamps to the remaining length.
    let data = engine
        .read("demo/notes.txt", 4000, 4096, ReadMode::Normal, None)
        .await
        .unwrap();
    assert_eq!(data.len(), 96);

    assert!(matches!(
        engine.read("demo/notes.txt", -1, 10, ReadMode::Auto, None).await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        engine.read("demo/notes.txt", 0, -1, ReadMode::Auto, None).await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        engine.read("demo", 0, 10, ReadMode::Auto, None).await,
        Err(Error::IsADirectory { .. })
    ));
    assert!(matches!(
        engine.read("demo/missing", 0, 10, ReadMode::Auto, None).await,
        Err(Error::FileNotFound { .. })
    ));
}

#[tokio::test]
async fn timed_out_reads_return_no_data() {
    let fixture = Fixture::new(
        &[("slow.bin", 64 * 1024)],
        16 * 1024,
        SimOptions {
            latency: Duration::from_secs(30),
            ..SimOptions::default()
        },
    );
    let engine = fixture.engine().await;

    let result = engine
        .read(
            "demo/slow.bin",
            0,
            1024,
            ReadMode::Normal,
            Some(Duration::from_millis(80)),
        )
        .await;
    match result {
        Err(Error::Timeout { missing, .. }) => assert!(missing > 0),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn pins_persist_across_engine_restart() {
    let fixture = media_fixture();
    {
        let engine = fixture.engine().await;
        engine.pin("demo/video.mkv").await.unwrap();
        // Idempotent: a second pin changes nothing.
        engine.pin("demo/video.mkv").await.unwrap();
        let pins = engine.pinned().await.unwrap();
        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0].path, "demo/video.mkv");
        engine.shutdown().await;
    }

    let engine = fixture.engine().await;
    let pins = engine.pinned().await.unwrap();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].path, "demo/video.mkv");

    // The pinned file is back at top priority, and only that file.
    let session = fixture.factory.last_session();
    let priorities = session.file_priorities().await.unwrap();
    assert_eq!(priorities[0], 7);
    assert_eq!(priorities[1], 0);
}

#[tokio::test]
async fn unpin_round_trip_restores_the_persisted_set() {
    let fixture = media_fixture();
    let engine = fixture.engine().await;

    engine.pin("demo/notes.txt").await.unwrap();
    engine.unpin("demo/notes.txt").await.unwrap();
    // Unpinning twice is as good as once.
    engine.unpin("demo/notes.txt").await.unwrap();
    assert!(engine.pinned().await.unwrap().is_empty());

    let session = fixture.factory.last_session();
    assert_eq!(session.file_priorities().await.unwrap()[1], 0);
}

#[tokio::test]
async fn normal_reads_do_not_demote_pinned_files() {
    let fixture = media_fixture();
    let engine = fixture.engine().await;
    let session = fixture.factory.last_session();

    engine.pin("demo/video.mkv").await.unwrap();
    engine
        .read("demo/video.mkv", 0, 1024, ReadMode::Normal, None)
        .await
        .unwrap();
    assert_eq!(session.file_priorities().await.unwrap()[0], 7);
}

#[tokio::test]
async fn prefetch_raises_covered_pieces_to_medium() {
    let fixture = media_fixture();
    let engine = fixture.engine().await;
    let session = fixture.factory.last_session();

    let report = engine.prefetch_info("demo/video.mkv").unwrap();
    assert!(!report.pieces.is_empty());
    assert!(report.bytes <= 5 * 1024 * 1024);
    // Ranges are disjoint and ordered.
    if report.ranges.len() == 2 {
        assert!(report.ranges[0].end() < report.ranges[1].start);
    }

    engine.prefetch("demo/video.mkv").await.unwrap();
    for piece in &report.pieces {
        assert_eq!(session.piece_priority_of(*piece).await.unwrap(), 4);
    }
}

#[tokio::test]
async fn prefetch_does_not_demote_top_priority_pieces() {
    let fixture = media_fixture();
    let engine = fixture.engine().await;
    let session = fixture.factory.last_session();

    // A read marks its pieces top priority; prefetch must not lower them.
    engine
        .read("demo/video.mkv", 0, 1024, ReadMode::Normal, None)
        .await
        .unwrap();
    engine.prefetch("demo/video.mkv").await.unwrap();
    assert_eq!(session.piece_priority_of(0).await.unwrap(), 7);
}

#[tokio::test]
async fn prune_data_keeps_pinned_payloads_when_asked() {
    let fixture = media_fixture();
    let engine = fixture.engine().await;

    engine.pin("demo/notes.txt").await.unwrap();
    engine
        .read("demo/video.mkv", 0, 1024, ReadMode::Normal, None)
        .await
        .unwrap();
    // Wait for the pinned file to fully materialise.
    engine
        .read("demo/notes.txt", 0, 4096, ReadMode::Normal, None)
        .await
        .unwrap();

    let video = fixture.cache_dir.join("demo/video.mkv");
    let notes = fixture.cache_dir.join("demo/notes.txt");
    assert!(video.exists());
    assert!(notes.exists());

    engine.prune_data(true).await.unwrap();
    assert!(!video.exists());
    assert!(notes.exists());
    assert_eq!(engine.pinned().await.unwrap().len(), 1);

    engine.prune_data(false).await.unwrap();
    assert!(!notes.exists());
    assert!(engine.pinned().await.unwrap().is_empty());
}

#[tokio::test]
async fn pause_and_resume_drive_the_lifecycle() {
    let fixture = media_fixture();
    let engine = fixture.engine().await;

    engine.pause().await.unwrap();
    let status = engine.status().await.unwrap();
    assert_eq!(status.state, EngineState::Paused);
    assert!(status.paused);

    engine.resume().await.unwrap();
    let status = engine.status().await.unwrap();
    assert_eq!(status.state, EngineState::Serving);
    assert!(!status.paused);
}

#[tokio::test]
async fn add_trackers_expands_aliases_and_publish_rewrites_the_source() {
    let dir = TempDir::new().unwrap();
    let payload = torrent_payload(
        "demo",
        16 * 1024,
        &[("a.bin", 1024)],
        &["http://tr.example/announce"],
    );
    let torrent_path = write_torrent(dir.path(), "demo.torrent", &payload);
    let factory = CapturingFactory::new(SimOptions::default());

    let mut config = test_config();
    config.trackers.aliases.insert(
        "fast".to_string(),
        "udp://fast.example:1337/announce".to_string(),
    );
    let engine = TorrentEngine::new(
        torrent_path.clone(),
        dir.path().join("cache"),
        &factory,
        &config,
    )
    .await
    .unwrap();

    engine
        .publish_trackers(&["fast".to_string()])
        .await
        .unwrap();
    let urls: Vec<String> = engine
        .trackers()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.url)
        .collect();
    assert!(urls.contains(&"udp://fast.example:1337/announce".to_string()));

    // The source .torrent now carries the published tracker at tier 0 and
    // keeps its content identity.
    let reparsed = TorrentMetainfo::load(&torrent_path, u64::MAX).unwrap();
    assert_eq!(
        reparsed.tracker_tiers()[0],
        vec!["udp://fast.example:1337/announce".to_string()]
    );
    let original = TorrentMetainfo::parse(&payload).unwrap();
    assert_eq!(reparsed.v1_hex(), original.v1_hex());
}

#[tokio::test]
async fn tracker_overrides_are_injected_at_tier_zero() {
    let dir = TempDir::new().unwrap();
    let payload = torrent_payload(
        "demo",
        16 * 1024,
        &[("a.bin", 1024)],
        &["http://own.example/announce"],
    );
    let torrent_path = write_torrent(dir.path(), "demo.torrent", &payload);
    let factory = CapturingFactory::new(SimOptions::default());

    let mut config = test_config();
    config.trackers.enable = true;
    config.trackers.add = vec![
        "udp://injected.example:1337/announce".to_string(),
        // A udp duplicate of the torrent's own http tracker is dropped.
        "udp://own.example:80/announce".to_string(),
    ];
    let engine = TorrentEngine::new(
        torrent_path,
        dir.path().join("cache"),
        &factory,
        &config,
    )
    .await
    .unwrap();

    let trackers = engine.trackers().await.unwrap();
    assert_eq!(trackers[0].url, "udp://injected.example:1337/announce");
    assert_eq!(trackers[0].tier, 0);
    assert!(
        trackers
            .iter()
            .all(|t| t.url != "udp://own.example:80/announce")
    );
    assert!(
        trackers
            .iter()
            .any(|t| t.url == "http://own.example/announce" && t.tier == 1)
    );
    // The override announce marked the injected tracker as contacted.
    assert_eq!(trackers[0].working, Some(true));
}

#[tokio::test]
async fn file_info_and_downloads_views_agree() {
    let fixture = media_fixture();
    let engine = fixture.engine().await;

    engine
        .read("demo/video.mkv", 0, 1024, ReadMode::Normal, None)
        .await
        .unwrap();

    let info = engine.file_info("demo/video.mkv").await.unwrap();
    assert_eq!(info.file_index, 0);
    assert!(info.done > 0);
    assert!(info.priority > 0);
    assert!(!info.pinned);

    let downloading = engine.downloading_files(None).await.unwrap();
    assert_eq!(downloading.len(), 1);
    assert_eq!(downloading[0].path, "demo/video.mkv");

    let (complete, total) = engine.files_completion().await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(complete, 0);
}

#[tokio::test]
async fn torrent_info_reports_static_metadata() {
    let fixture = media_fixture();
    let engine = fixture.engine().await;

    let info = engine.torrent_info().await.unwrap();
    assert_eq!(info.name, "demo");
    assert_eq!(info.mode, "multi");
    assert_eq!(info.piece_length, 16 * 1024);
    assert!(info.total_size > 0);
    assert!(info.magnet.starts_with("magnet:?xt=urn:btih:"));
    assert_eq!(info.infohash.len(), 40);
    assert!(!info.trackers.is_empty());

    let hashes = engine.infohash();
    assert_eq!(hashes.v1_hex.as_deref().map(str::len), Some(40));
}
