//! Unix-socket RPC server.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use torrentfs_core::{Error, Result};
use torrentfs_engine::TorrentManager;

use crate::framing::{read_frame, write_frame};
use crate::protocol::{Request, dispatch};

/// Environment variable naming an explicit socket path.
pub const SOCKET_ENV: &str = "TORRENTFSD_SOCKET";

const SOCKET_NAME: &str = "torrentfsd.sock";
const SOCKET_MODE: u32 = 0o660;

/// Resolve the socket path: `$TORRENTFSD_SOCKET`, then
/// `$XDG_RUNTIME_DIR/torrentfsd.sock`, then `/tmp/torrentfsd.sock`.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    if let Ok(explicit) = std::env::var(SOCKET_ENV) {
        if !explicit.is_empty() {
            return PathBuf::from(explicit);
        }
    }
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        if !runtime_dir.is_empty() {
            return Path::new(&runtime_dir).join(SOCKET_NAME);
        }
    }
    Path::new("/tmp").join(SOCKET_NAME)
}

/// The RPC accept loop plus per-connection request handling.
pub struct RpcServer {
    manager: Arc<TorrentManager>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Server bound to an explicit socket path.
    #[must_use]
    pub fn new(manager: Arc<TorrentManager>, socket_path: PathBuf) -> Self {
        Self {
            manager,
            socket_path,
        }
    }

    /// The socket path this server binds.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections until the stop signal fires, then unlink the
    /// socket file.
    ///
    /// # Errors
    ///
    /// Fails when the socket cannot be bound; per-connection failures are
    /// contained.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> Result<()> {
        if self.socket_path.exists() {
            fs::remove_file(&self.socket_path)
                .map_err(|err| Error::io("unlink_stale_socket", &self.socket_path, err))?;
        }
        let listener = UnixListener::bind(&self.socket_path)
            .map_err(|err| Error::io("bind_socket", &self.socket_path, err))?;
        if let Err(err) =
            fs::set_permissions(&self.socket_path, fs::Permissions::from_mode(SOCKET_MODE))
        {
            warn!(path = %self.socket_path.display(), error = %err, "socket chmod failed");
        }
        info!(path = %self.socket_path.display(), "rpc server listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let manager = Arc::clone(&self.manager);
                            tokio::spawn(handle_connection(manager, stream));
                        }
                        Err(err) => warn!(error = %err, "accept failed"),
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        if let Err(err) = fs::remove_file(&self.socket_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.socket_path.display(), error = %err, "socket unlink failed");
            }
        }
        info!("rpc server stopped");
        Ok(())
    }
}

/// Serve one connection: read a request frame, dispatch, answer. Responses
/// stay in request order; a write failure only ends this connection.
async fn handle_connection(manager: Arc<TorrentManager>, mut stream: UnixStream) {
    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(err) => {
                debug!(error = %err, "connection read failed");
                return;
            }
        };

        let (id, outcome) = match serde_json::from_slice::<Request>(&frame) {
            Ok(request) => {
                let id = request.id.clone();
                (id, dispatch(&manager, &request).await)
            }
            Err(err) => {
                debug!(error = %err, "request decode failed");
                (
                    None,
                    Err(Error::InvalidArgument {
                        reason: "request frame is not a valid JSON object",
                    }),
                )
            }
        };

        let (response, data) = match outcome {
            Ok(reply) => {
                let mut envelope = Map::new();
                envelope.insert("id".to_string(), id.map_or(Value::Null, Value::String));
                envelope.insert("ok".to_string(), Value::Bool(true));
                if let Value::Object(body) = reply.body {
                    envelope.extend(body);
                }
                (Value::Object(envelope), reply.data)
            }
            Err(err) => (
                json!({
                    "id": id,
                    "ok": false,
                    "error": err.token(),
                }),
                None,
            ),
        };

        let encoded = match serde_json::to_vec(&response) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(error = %err, "response encode failed");
                return;
            }
        };
        if let Err(err) = write_frame(&mut stream, &encoded).await {
            debug!(error = %err, "client went away before the response");
            return;
        }
        if let Some(data) = data {
            if let Err(err) = write_frame(&mut stream, &data).await {
                debug!(error = %err, "client went away before the data frame");
                return;
            }
        }
    }
}
