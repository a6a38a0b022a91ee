//! Shared fixtures for the engine integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_bencode::value::Value;

use torrentfs_config::Config;
use torrentfs_swarm::{
    SessionFactory, SessionParams, SimOptions, SimSessionFactory, SwarmSession,
};

fn bstr(value: &str) -> Value {
    Value::Bytes(value.as_bytes().to_vec())
}

/// Build a bencoded multi-file torrent payload.
///
/// `files` are `(relative path, size)` pairs; paths may contain slashes.
pub fn torrent_payload(
    name: &str,
    piece_length: i64,
    files: &[(&str, i64)],
    trackers: &[&str],
) -> Vec<u8> {
    let total: i64 = files.iter().map(|(_, size)| size).sum();
    let num_pieces = if total == 0 {
        0
    } else {
        (total + piece_length - 1) / piece_length
    };

    let file_values: Vec<Value> = files
        .iter()
        .map(|(path, size)| {
            let mut dict = HashMap::new();
            dict.insert(b"length".to_vec(), Value::Int(*size));
            dict.insert(
                b"path".to_vec(),
                Value::List(path.split('/').map(bstr).collect()),
            );
            Value::Dict(dict)
        })
        .collect();

    let mut info = HashMap::new();
    info.insert(b"name".to_vec(), bstr(name));
    info.insert(b"piece length".to_vec(), Value::Int(piece_length));
    info.insert(
        b"pieces".to_vec(),
        Value::Bytes(vec![0_u8; 20 * usize::try_from(num_pieces).unwrap()]),
    );
    info.insert(b"files".to_vec(), Value::List(file_values));

    let mut root = HashMap::new();
    if let Some(first) = trackers.first() {
        root.insert(b"announce".to_vec(), bstr(first));
    }
    if !trackers.is_empty() {
        root.insert(
            b"announce-list".to_vec(),
            Value::List(
                trackers
                    .iter()
                    .map(|url| Value::List(vec![bstr(url)]))
                    .collect(),
            ),
        );
    }
    root.insert(b"info".to_vec(), Value::Dict(info));
    serde_bencode::to_bytes(&Value::Dict(root)).unwrap()
}

/// Write a torrent payload to disk and return its path.
pub fn write_torrent(dir: &Path, filename: &str, payload: &[u8]) -> PathBuf {
    let path = dir.join(filename);
    fs::write(&path, payload).unwrap();
    path
}

/// Default configuration for tests.
pub fn test_config() -> Config {
    Config::default()
}

/// Session factory that records the last session it created, so tests can
/// observe priorities and the sequential flag from outside the engine.
#[derive(Default)]
pub struct CapturingFactory {
    inner: SimSessionFactory,
    last: Mutex<Option<Arc<dyn SwarmSession>>>,
}

impl CapturingFactory {
    pub fn new(options: SimOptions) -> Self {
        Self {
            inner: SimSessionFactory::new(options),
            last: Mutex::new(None),
        }
    }

    /// The most recently created session.
    pub fn last_session(&self) -> Arc<dyn SwarmSession> {
        self.last
            .lock()
            .unwrap()
            .clone()
            .expect("no session created yet")
    }

    pub fn seed(&self) -> u64 {
        self.inner.options.seed
    }
}

impl SessionFactory for CapturingFactory {
    fn create(&self, params: SessionParams<'_>) -> anyhow::Result<Arc<dyn SwarmSession>> {
        let session = self.inner.create(params)?;
        *self.last.lock().unwrap() = Some(Arc::clone(&session));
        Ok(session)
    }
}
