//! Request model and command dispatch.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use torrentfs_core::{Error, ReadMode, Result};
use torrentfs_engine::TorrentManager;

/// Per-call ceiling on `read` sizes.
pub const READ_SIZE_MAX: i64 = 4 * 1024 * 1024;

/// One decoded request frame. Unknown fields are ignored so older clients
/// and newer daemons can coexist.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Request {
    /// Command name.
    pub cmd: String,
    /// Client-chosen correlation id, echoed back verbatim.
    pub id: Option<String>,
    /// Torrent selector (id, or display name when unique).
    pub torrent: Option<String>,
    /// Path within the torrent.
    pub path: Option<String>,
    /// Read offset in bytes.
    pub offset: Option<i64>,
    /// Read size in bytes.
    pub size: Option<i64>,
    /// Read mode: `auto`, `stream`, or `normal`.
    pub mode: Option<String>,
    /// Read deadline in seconds; absent waits indefinitely.
    pub timeout_s: Option<f64>,
    /// Report instead of act, for `prune-cache`.
    pub dry_run: Option<bool>,
    /// Preserve pinned payloads, for `prune-torrent`.
    pub keep_pins: Option<bool>,
    /// File budget for `pin-on-load` and `downloads`.
    pub max_files: Option<u32>,
    /// Depth budget for `pin-on-load`; negative is unlimited.
    pub max_depth: Option<i32>,
    /// Tracker URLs for `add-tracker` / `publish-tracker`.
    pub trackers: Vec<String>,
    /// `.torrent` basename for `pin-on-load`.
    pub torrent_file: Option<String>,
}

impl Request {
    fn path(&self) -> Result<&str> {
        self.path.as_deref().ok_or(Error::InvalidArgument {
            reason: "path is required",
        })
    }

    fn path_or_root(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }

    fn read_mode(&self) -> Result<ReadMode> {
        self.mode
            .as_deref()
            .map_or(Ok(ReadMode::Auto), ReadMode::parse)
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout_s
            .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
            .map(Duration::from_secs_f64)
    }
}

/// One dispatched response: body fields plus an optional raw bytes frame.
#[derive(Debug)]
pub struct Reply {
    /// JSON object merged into the `{id, ok}` envelope.
    pub body: Value,
    /// Payload of the trailing bytes frame, for successful non-empty reads.
    pub data: Option<Vec<u8>>,
}

impl Reply {
    fn of(body: Value) -> Self {
        Self { body, data: None }
    }

    fn empty() -> Self {
        Self::of(json!({}))
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|err| {
        tracing::warn!(error = %err, "response serialisation failed");
        Error::InvalidArgument {
            reason: "response serialisation failed",
        }
    })
}

/// Dispatch one request against the manager.
///
/// # Errors
///
/// Typed failures map to the stable error tokens; anything else is caught
/// at the connection boundary.
pub(crate) async fn dispatch(manager: &TorrentManager, request: &Request) -> Result<Reply> {
    match request.cmd.as_str() {
        // Control plane.
        "hello" => Ok(Reply::of(json!({
            "name": "torrentfsd",
            "version": env!("CARGO_PKG_VERSION"),
            "torrents": manager.len().await,
        }))),
        "torrents" => Ok(Reply::of(json!({
            "torrents": to_body(&manager.list_torrents().await)?,
        }))),
        "config" => Ok(Reply::of(json!({
            "config": to_body(manager.config())?,
        }))),
        "status-all" => Ok(Reply::of(to_body(&manager.status_all().await)?)),
        "downloads" => {
            let max_files = request
                .max_files
                .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(Reply::of(json!({
                "torrents": to_body(&manager.downloads(max_files).await)?,
            })))
        }
        "peers-all" => Ok(Reply::of(json!({
            "torrents": to_body(&manager.peers_all().await)?,
        }))),
        "cache-size" => Ok(Reply::of(to_body(&manager.cache_size())?)),
        "prune-cache" => {
            let report = manager.prune_cache(request.dry_run.unwrap_or(false)).await;
            Ok(Reply::of(to_body(&report)?))
        }
        "remove-torrent" | "remove_torrent_by_id" => {
            let key = request.torrent.as_deref().ok_or(Error::TorrentRequired)?;
            // Both command names funnel into the same removal routine; a key
            // that is not a live id is treated as a metadata-file path.
            let removed = if manager.get_engine(key).await.is_ok() {
                manager.remove_torrent_by_id(key).await
            } else {
                manager.remove_torrent(std::path::Path::new(key)).await
            };
            Ok(Reply::of(json!({ "removed": removed })))
        }
        "reannounce-all" => {
            manager.reannounce_all().await;
            Ok(Reply::empty())
        }
        "pin-on-load" => {
            let name = request
                .torrent_file
                .as_deref()
                .or(request.torrent.as_deref())
                .ok_or(Error::InvalidArgument {
                    reason: "torrent_file is required",
                })?;
            manager
                .enqueue_pin(
                    name,
                    request.max_files.unwrap_or(0),
                    request.max_depth.unwrap_or(-1),
                )
                .await;
            Ok(Reply::empty())
        }
        "pinned-all" => Ok(Reply::of(json!({
            "pins": to_body(&manager.pinned_all().await)?,
        }))),

        // Per-torrent commands.
        _ => dispatch_torrent(manager, request).await,
    }
}

async fn dispatch_torrent(manager: &TorrentManager, request: &Request) -> Result<Reply> {
    let engine = match request.torrent.as_deref() {
        Some(key) => manager.get_engine(key).await?,
        None => {
            // Only commands from the known set earn a TorrentRequired; the
            // rest are unknown commands.
            if is_torrent_command(&request.cmd) {
                return Err(Error::TorrentRequired);
            }
            return Err(Error::UnknownCommand {
                cmd: request.cmd.clone(),
            });
        }
    };

    match request.cmd.as_str() {
        "status" => Ok(Reply::of(json!({
            "status": to_body(&engine.status().await?)?,
        }))),
        "stat" => Ok(Reply::of(json!({
            "stat": to_body(&engine.stat(request.path()?)?)?,
        }))),
        "list" => Ok(Reply::of(json!({
            "entries": to_body(&engine.list(request.path_or_root())?)?,
        }))),
        "read" => {
            let size = request.size.unwrap_or(0);
            if !(0..=READ_SIZE_MAX).contains(&size) {
                return Err(Error::ReadSizeInvalid {
                    size,
                    max: u64::try_from(READ_SIZE_MAX).unwrap_or(0),
                });
            }
            let data = engine
                .read(
                    request.path()?,
                    request.offset.unwrap_or(0),
                    size,
                    request.read_mode()?,
                    request.timeout(),
                )
                .await?;
            let data_len = data.len();
            Ok(Reply {
                body: json!({ "data_len": data_len }),
                data: (data_len > 0).then_some(data),
            })
        }
        "pin" => {
            engine.pin(request.path()?).await?;
            Ok(Reply::empty())
        }
        "unpin" => {
            engine.unpin(request.path()?).await?;
            Ok(Reply::empty())
        }
        "pinned" => Ok(Reply::of(json!({
            "pins": to_body(&engine.pinned().await?)?,
        }))),
        "peers" => Ok(Reply::of(json!({
            "peers": to_body(&engine.peers().await?)?,
        }))),
        "prefetch" => {
            engine.prefetch(request.path()?).await?;
            Ok(Reply::empty())
        }
        "file-info" => Ok(Reply::of(json!({
            "file": to_body(&engine.file_info(request.path()?).await?)?,
        }))),
        "prefetch-info" => Ok(Reply::of(json!({
            "prefetch": to_body(&engine.prefetch_info(request.path()?)?)?,
        }))),
        "torrent-info" => Ok(Reply::of(json!({
            "info": to_body(&engine.torrent_info().await?)?,
        }))),
        "infohash" => Ok(Reply::of(json!({
            "infohash": to_body(&engine.infohash())?,
        }))),
        "reannounce" => {
            engine.reannounce().await?;
            Ok(Reply::empty())
        }
        "stop" => {
            engine.pause().await?;
            Ok(Reply::empty())
        }
        "resume" => {
            engine.resume().await?;
            Ok(Reply::empty())
        }
        "prune-torrent" => {
            engine.prune_data(request.keep_pins.unwrap_or(false)).await?;
            Ok(Reply::empty())
        }
        "recheck" => {
            engine.force_recheck().await?;
            Ok(Reply::empty())
        }
        "add-tracker" => Ok(Reply::of(json!({
            "added": engine.add_trackers(&request.trackers).await?,
        }))),
        "publish-tracker" => Ok(Reply::of(json!({
            "added": engine.publish_trackers(&request.trackers).await?,
        }))),
        "trackers" => {
            let trackers: Vec<Value> = engine
                .trackers()
                .await?
                .into_iter()
                .map(|entry| json!({ "url": entry.url, "tier": entry.tier }))
                .collect();
            Ok(Reply::of(json!({ "trackers": trackers })))
        }
        "tracker-status" => Ok(Reply::of(json!({
            "trackers": to_body(&engine.trackers().await?)?,
        }))),
        _ => Err(Error::UnknownCommand {
            cmd: request.cmd.clone(),
        }),
    }
}

fn is_torrent_command(cmd: &str) -> bool {
    matches!(
        cmd,
        "status"
            | "stat"
            | "list"
            | "read"
            | "pin"
            | "unpin"
            | "pinned"
            | "peers"
            | "prefetch"
            | "file-info"
            | "prefetch-info"
            | "torrent-info"
            | "infohash"
            | "reannounce"
            | "stop"
            | "resume"
            | "prune-torrent"
            | "recheck"
            | "add-tracker"
            | "publish-tracker"
            | "trackers"
            | "tracker-status"
    )
}
