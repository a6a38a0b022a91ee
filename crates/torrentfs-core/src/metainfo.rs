//! `.torrent` metainfo decoding and the derived immutable views the engine
//! serves from: file entries, piece layout, tracker tiers, content hashes.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_bencode::value::Value;
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::layout::PieceLayout;

/// One file of the torrent payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Index into the torrent's file list.
    pub index: u32,
    /// Slash-separated path within the torrent, root directory included.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
}

/// Parsed, immutable view of a `.torrent` file.
pub struct TorrentMetainfo {
    name: String,
    comment: Option<String>,
    created_by: Option<String>,
    creation_date: Option<i64>,
    files: Vec<FileEntry>,
    layout: PieceLayout,
    private: bool,
    single_file: bool,
    v1_hex: Option<String>,
    v2_hex: Option<String>,
    tracker_tiers: Vec<Vec<String>>,
    root: HashMap<Vec<u8>, Value>,
}

impl std::fmt::Debug for TorrentMetainfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorrentMetainfo")
            .field("name", &self.name)
            .field("files", &self.files.len())
            .field("pieces", &self.layout.num_pieces())
            .field("private", &self.private)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    name: String,
    #[serde(rename = "piece length")]
    piece_length: i64,
    #[serde(default, with = "serde_bytes")]
    pieces: Option<Vec<u8>>,
    #[serde(default)]
    length: Option<i64>,
    #[serde(default)]
    files: Option<Vec<RawFile>>,
    #[serde(default)]
    private: Option<i64>,
    #[serde(default, rename = "meta version")]
    meta_version: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    length: i64,
    path: Vec<String>,
}

impl TorrentMetainfo {
    /// Read and parse a `.torrent` file, enforcing the configured size limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetainfoTooLarge`] when the file exceeds `max_bytes`,
    /// [`Error::Io`] on read failures, or [`Error::MetainfoInvalid`] when the
    /// payload does not decode.
    pub fn load(path: &Path, max_bytes: u64) -> Result<Self> {
        let size = fs::metadata(path)
            .map_err(|err| Error::io("stat_torrent_file", path, err))?
            .len();
        if size > max_bytes {
            return Err(Error::MetainfoTooLarge {
                size,
                limit: max_bytes,
            });
        }
        let payload =
            fs::read(path).map_err(|err| Error::io("read_torrent_file", path, err))?;
        Self::parse(&payload)
    }

    /// Parse a bencoded `.torrent` payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetainfoInvalid`] when the payload is not a valid
    /// metainfo dictionary.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let root = match serde_bencode::from_bytes::<Value>(payload) {
            Ok(Value::Dict(dict)) => dict,
            Ok(_) => {
                return Err(invalid("top-level value is not a dictionary"));
            }
            Err(err) => return Err(invalid(&format!("bencode decode failed: {err}"))),
        };

        let info_value = root
            .get(b"info".as_slice())
            .ok_or_else(|| invalid("missing info dictionary"))?;
        let info_bytes = serde_bencode::to_bytes(info_value)
            .map_err(|err| invalid(&format!("info re-encode failed: {err}")))?;
        let info: RawInfo = serde_bencode::from_bytes(&info_bytes)
            .map_err(|err| invalid(&format!("info decode failed: {err}")))?;

        // The name becomes the root path component of every file entry (and
        // the whole path in single-file mode), so it obeys the same rules as
        // any other component.
        if !is_safe_component(&info.name) {
            return Err(invalid("unsafe torrent name"));
        }
        let piece_length = u64::try_from(info.piece_length)
            .ok()
            .filter(|len| *len > 0)
            .ok_or_else(|| invalid("piece length must be positive"))?;

        let (files, single_file) = collect_files(&info)?;
        let layout = PieceLayout::new(
            piece_length,
            files.iter().map(|entry| entry.size).collect(),
        )?;

        let v1_hex = match &info.pieces {
            Some(pieces) => {
                if pieces.len() % 20 != 0 {
                    return Err(invalid("piece hash blob is not a multiple of 20 bytes"));
                }
                let count = u32::try_from(pieces.len() / 20).unwrap_or(u32::MAX);
                if count != layout.num_pieces() {
                    return Err(invalid("piece hash count does not match the payload size"));
                }
                let mut hasher = Sha1::new();
                hasher.update(&info_bytes);
                Some(hex::encode(hasher.finalize()))
            }
            None => None,
        };
        let v2_hex = if info.meta_version == Some(2) {
            let mut hasher = Sha256::new();
            hasher.update(&info_bytes);
            Some(hex::encode(hasher.finalize()))
        } else {
            None
        };
        if v1_hex.is_none() && v2_hex.is_none() {
            return Err(invalid("metainfo carries neither v1 piece hashes nor a v2 marker"));
        }

        let tracker_tiers = collect_tracker_tiers(&root);

        Ok(Self {
            name: info.name,
            comment: dict_string(&root, b"comment"),
            created_by: dict_string(&root, b"created by"),
            creation_date: dict_int(&root, b"creation date"),
            files,
            layout,
            private: info.private == Some(1),
            single_file,
            v1_hex,
            v2_hex,
            tracker_tiers,
            root,
        })
    }

    /// Torrent display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional comment from the metainfo.
    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Optional authoring tool from the metainfo.
    #[must_use]
    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    /// Optional creation timestamp in Unix seconds.
    #[must_use]
    pub const fn creation_date(&self) -> Option<i64> {
        self.creation_date
    }

    /// The ordered file entries of the payload.
    #[must_use]
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Piece/byte layout of the payload.
    #[must_use]
    pub const fn layout(&self) -> &PieceLayout {
        &self.layout
    }

    /// Whether the torrent is marked private (`priv=1`).
    #[must_use]
    pub const fn is_private(&self) -> bool {
        self.private
    }

    /// `"single"` or `"multi"` file mode.
    #[must_use]
    pub const fn mode_str(&self) -> &'static str {
        if self.single_file { "single" } else { "multi" }
    }

    /// SHA-1 infohash in lowercase hex, when v1 piece hashes are present.
    #[must_use]
    pub fn v1_hex(&self) -> Option<&str> {
        self.v1_hex.as_deref()
    }

    /// SHA-256 infohash in lowercase hex, when the torrent is v2-marked.
    #[must_use]
    pub fn v2_hex(&self) -> Option<&str> {
        self.v2_hex.as_deref()
    }

    /// The announce tiers declared by the torrent itself.
    #[must_use]
    pub fn tracker_tiers(&self) -> &[Vec<String>] {
        &self.tracker_tiers
    }

    /// Magnet link equivalent of the metainfo.
    #[must_use]
    pub fn magnet(&self) -> String {
        let mut out = String::from("magnet:?");
        if let Some(v1) = &self.v1_hex {
            out.push_str("xt=urn:btih:");
            out.push_str(v1);
        } else if let Some(v2) = &self.v2_hex {
            out.push_str("xt=urn:btmh:1220");
            out.push_str(v2);
        }
        out.push_str("&dn=");
        out.push_str(&urlencoding::encode(&self.name));
        for tier in &self.tracker_tiers {
            for url in tier {
                out.push_str("&tr=");
                out.push_str(&urlencoding::encode(url));
            }
        }
        out
    }

    /// Re-encode the metainfo with a replacement set of announce tiers.
    ///
    /// Used by `publish_trackers` to rewrite the source `.torrent` so the
    /// injected trackers survive a daemon restart.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetainfoInvalid`] when re-encoding fails.
    pub fn encode_with_tracker_tiers(&self, tiers: &[Vec<String>]) -> Result<Vec<u8>> {
        let mut root = self.root.clone();
        let list = Value::List(
            tiers
                .iter()
                .map(|tier| {
                    Value::List(
                        tier.iter()
                            .map(|url| Value::Bytes(url.as_bytes().to_vec()))
                            .collect(),
                    )
                })
                .collect(),
        );
        root.insert(b"announce-list".to_vec(), list);
        if let Some(first) = tiers.iter().flatten().next() {
            root.insert(
                b"announce".to_vec(),
                Value::Bytes(first.as_bytes().to_vec()),
            );
        }
        serde_bencode::to_bytes(&Value::Dict(root))
            .map_err(|err| invalid(&format!("announce rewrite failed: {err}")))
    }
}

fn invalid(reason: &str) -> Error {
    Error::MetainfoInvalid {
        reason: reason.to_string(),
    }
}

/// A single path component safe to join under the cache directory: no
/// empty segments, no current/parent references, no separators.
fn is_safe_component(component: &str) -> bool {
    !component.is_empty() && component != "." && component != ".." && !component.contains('/')
}

fn collect_files(info: &RawInfo) -> Result<(Vec<FileEntry>, bool)> {
    match (&info.files, info.length) {
        (Some(raw_files), _) => {
            if raw_files.is_empty() {
                return Err(invalid("empty file list"));
            }
            let mut files = Vec::with_capacity(raw_files.len());
            for (index, raw) in raw_files.iter().enumerate() {
                let size = u64::try_from(raw.length)
                    .map_err(|_| invalid("negative file length"))?;
                let mut path = info.name.clone();
                if raw.path.is_empty() {
                    return Err(invalid("file entry with empty path"));
                }
                for component in &raw.path {
                    if !is_safe_component(component) {
                        return Err(invalid("file entry with unsafe path component"));
                    }
                    path.push('/');
                    path.push_str(component);
                }
                files.push(FileEntry {
                    index: u32::try_from(index).map_err(|_| invalid("too many files"))?,
                    path,
                    size,
                });
            }
            Ok((files, false))
        }
        (None, Some(length)) => {
            let size =
                u64::try_from(length).map_err(|_| invalid("negative file length"))?;
            Ok((
                vec![FileEntry {
                    index: 0,
                    path: info.name.clone(),
                    size,
                }],
                true,
            ))
        }
        (None, None) => Err(invalid("metainfo declares neither files nor length")),
    }
}

fn collect_tracker_tiers(root: &HashMap<Vec<u8>, Value>) -> Vec<Vec<String>> {
    let mut tiers: Vec<Vec<String>> = Vec::new();
    if let Some(Value::List(raw_tiers)) = root.get(b"announce-list".as_slice()) {
        for raw_tier in raw_tiers {
            let Value::List(urls) = raw_tier else {
                continue;
            };
            let tier: Vec<String> = urls
                .iter()
                .filter_map(|value| match value {
                    Value::Bytes(bytes) => String::from_utf8(bytes.clone()).ok(),
                    _ => None,
                })
                .collect();
            if !tier.is_empty() {
                tiers.push(tier);
            }
        }
    }
    if tiers.is_empty() {
        if let Some(announce) = dict_string(root, b"announce") {
            tiers.push(vec![announce]);
        }
    }
    tiers
}

fn dict_string(dict: &HashMap<Vec<u8>, Value>, key: &[u8]) -> Option<String> {
    match dict.get(key) {
        Some(Value::Bytes(bytes)) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    }
}

fn dict_int(dict: &HashMap<Vec<u8>, Value>, key: &[u8]) -> Option<i64> {
    match dict.get(key) {
        Some(Value::Int(value)) => Some(*value),
        _ => None,
    }
}
