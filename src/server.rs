//! Unix socket request server.
//!
//! # Protocol
//!
//! Clients write `check <key>` or `activate <key>` and read back one JSON object per
//! request, terminated by `\n`. Requests are newline-separated and may span several
//! reads; a request with no `\n` is served once the client stops sending. Requests
//! longer than `max_request_bytes`, and malformed ones, get
//! `{"status":"failed","message":"bad request"}`.
//!
//! # Concurrency
//!
//! Connections are served concurrently up to `max_connections`. A permit is taken
//! *before* `accept`, so with `max_connections = 1` a second client is not accepted
//! until the first disconnects. Every read is bounded by `idle_timeout`, so a silent
//! client cannot hold its slot forever.
//!
//! # Security Considerations
//!
//! - Stale socket files are removed before binding; any other file type is refused
//! - Socket permissions are set after binding. The default mode is `0o777`: any
//!   local user may query and activate licenses. Tighten `socket_mode` to narrow it.

use crate::config::DaemonConfig;
use crate::protocol::framing::{Frame, RequestFramer};
use crate::protocol::models::{Response, BAD_REQUEST};
use crate::protocol::request::Command;
use crate::validator::LicenseValidator;
use crate::AnvarError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Back-off after a failed `accept`, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Quiet period after which a request without `\n` is served as complete.
const UNTERMINATED_GRACE: Duration = Duration::from_millis(50);

/// Per-connection limits.
#[derive(Debug, Clone, Copy)]
struct ConnectionLimits {
    idle_timeout: Duration,
    max_request_bytes: usize,
}

/// Local socket server dispatching requests to a `LicenseValidator`.
pub struct RequestServer {
    listener: UnixListener,
    socket_path: PathBuf,
    validator: Arc<LicenseValidator>,
    connection_sem: Arc<Semaphore>,
    limits: ConnectionLimits,
}

impl RequestServer {
    /// Bind the server socket described by `config`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SocketError` if:
    /// - The parent directory cannot be created
    /// - A non-socket file occupies the socket path
    /// - The stale socket cannot be removed, or binding fails
    /// - Permissions cannot be set
    pub fn bind(
        config: &DaemonConfig,
        validator: Arc<LicenseValidator>,
    ) -> Result<Self, AnvarError> {
        let socket_path = config.socket_path.clone();

        if let Some(parent) = socket_path.parent() {
            ensure_directory(parent)?;
        }
        cleanup_socket(&socket_path)?;

        let listener = UnixListener::bind(&socket_path).map_err(|e| {
            AnvarError::SocketError(format!(
                "failed to bind {}: {}",
                socket_path.display(),
                e
            ))
        })?;

        set_socket_permissions(&socket_path, config.socket_mode)?;

        info!(
            socket = %socket_path.display(),
            mode = %format!("{:o}", config.socket_mode),
            max_connections = config.max_connections,
            "License socket bound"
        );

        Ok(Self {
            listener,
            socket_path,
            validator,
            connection_sem: Arc::new(Semaphore::new(config.max_connections)),
            limits: ConnectionLimits {
                idle_timeout: config.idle_timeout,
                max_request_bytes: config.max_request_bytes,
            },
        })
    }

    /// Path of the bound socket.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept and serve connections until `shutdown` is cancelled.
    ///
    /// On shutdown the server stops accepting, waits for in-flight requests to
    /// finish, and removes the socket file.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), AnvarError> {
        let tracker = TaskTracker::new();

        loop {
            let permit = tokio::select! {
                () = shutdown.cancelled() => break,
                permit = Arc::clone(&self.connection_sem).acquire_owned() => permit,
            };
            let permit = permit.map_err(|_| {
                AnvarError::SocketError("connection semaphore closed".to_string())
            })?;

            let stream = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => stream,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            let validator = Arc::clone(&self.validator);
            let shutdown = shutdown.clone();
            let limits = self.limits;
            tracker.spawn(async move {
                let _permit = permit;
                handle_connection(stream, validator, limits, shutdown).await;
            });
        }

        info!("Shutting down, waiting for in-flight requests");
        tracker.close();
        tracker.wait().await;

        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            warn!(socket = %self.socket_path.display(), error = %e, "Failed to remove socket");
        }
        Ok(())
    }
}

/// Serve one connection until EOF, read error, idle timeout, or shutdown.
async fn handle_connection(
    mut stream: UnixStream,
    validator: Arc<LicenseValidator>,
    limits: ConnectionLimits,
    shutdown: CancellationToken,
) {
    debug!("Connection opened");
    let mut buf = vec![0u8; limits.max_request_bytes];
    let mut framer = RequestFramer::new(limits.max_request_bytes);

    loop {
        let wait = if framer.has_pending() {
            UNTERMINATED_GRACE
        } else {
            limits.idle_timeout
        };
        let read = tokio::select! {
            () = shutdown.cancelled() => break,
            read = tokio::time::timeout(wait, stream.read(&mut buf)) => read,
        };

        let frames = match read {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => framer.push(&buf[..n]),
            Ok(Err(e)) => {
                debug!(error = %e, "Connection read failed");
                break;
            }
            Err(_) if framer.has_pending() => framer.take_unterminated().into_iter().collect(),
            Err(_) => {
                debug!(timeout = ?limits.idle_timeout, "Connection idle, closing");
                break;
            }
        };

        for frame in frames {
            let Some(response) = answer(&validator, frame).await else {
                continue;
            };
            let mut payload = response.to_json();
            payload.push('\n');
            if let Err(e) = stream.write_all(payload.as_bytes()).await {
                debug!(error = %e, "Connection write failed");
                return;
            }
        }
    }

    debug!("Connection closed");
}

/// Turn one frame into a reply. Blank lines get none.
async fn answer(validator: &LicenseValidator, frame: Frame) -> Option<Response> {
    let line = match frame {
        Frame::Line(line) => line,
        Frame::Oversized => {
            debug!("Rejected oversized request");
            return Some(Response::failed(BAD_REQUEST));
        }
    };

    let Ok(text) = String::from_utf8(line) else {
        debug!("Rejected request that is not UTF-8");
        return Some(Response::failed(BAD_REQUEST));
    };
    if text.trim().is_empty() {
        return None;
    }

    match Command::parse(&text) {
        Ok(command) => Some(validator.handle(&command).await),
        Err(e) => {
            debug!(error = %e, "Rejected malformed request");
            Some(Response::failed(BAD_REQUEST))
        }
    }
}

/// Create the socket directory if missing. Existing directories are left as they are.
fn ensure_directory(path: &Path) -> Result<(), AnvarError> {
    if path.as_os_str().is_empty() || path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|e| {
        AnvarError::SocketError(format!(
            "failed to create directory {}: {}",
            path.display(),
            e
        ))
    })
}

/// Remove a stale socket left by a previous run.
fn cleanup_socket(path: &Path) -> Result<(), AnvarError> {
    use std::os::unix::fs::FileTypeExt;

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(AnvarError::SocketError(format!(
                "failed to stat {}: {}",
                path.display(),
                e
            )))
        }
    };

    if !metadata.file_type().is_socket() {
        return Err(AnvarError::SocketError(format!(
            "path {} exists but is not a socket",
            path.display()
        )));
    }

    std::fs::remove_file(path).map_err(|e| {
        AnvarError::SocketError(format!(
            "failed to remove stale socket {}: {}",
            path.display(),
            e
        ))
    })?;

    debug!(path = %path.display(), "Removed stale socket file");
    Ok(())
}

fn set_socket_permissions(path: &Path, mode: u32) -> Result<(), AnvarError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        AnvarError::SocketError(format!(
            "failed to set socket permissions on {}: {}",
            path.display(),
            e
        ))
    })
}
