//! Status socket: read-only view of the sync state over a Unix socket.
//!
//! Each request is one JSON line (`{"cmd":"status"}`), each response one JSON
//! line. `status` returns the raw snapshot, `health` the evaluated report,
//! `stop` asks the daemon to shut down.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, watch};

use gitmirror_sync::{evaluate, HealthPolicy, SyncSnapshot};

use crate::error::{io_err, DaemonError};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Shared, read-only inputs of every client handler.
#[derive(Clone)]
pub struct StatusSource {
    pub state: watch::Receiver<SyncSnapshot>,
    pub policy: HealthPolicy,
}

impl StatusSource {
    fn respond(&self, request: &DaemonRequest, shutdown_tx: &broadcast::Sender<()>) -> DaemonResponse {
        match request.cmd.as_str() {
            "status" => {
                let snapshot = self.state.borrow().clone();
                match serde_json::to_value(snapshot) {
                    Ok(value) => DaemonResponse::ok(value),
                    Err(e) => DaemonResponse::error(e.to_string()),
                }
            }
            "health" => {
                let snapshot = self.state.borrow().clone();
                let report = evaluate(&snapshot, &self.policy, Utc::now());
                match serde_json::to_value(report) {
                    Ok(value) => DaemonResponse::ok(value),
                    Err(e) => DaemonResponse::error(e.to_string()),
                }
            }
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        }
    }
}

/// Bind `socket` and serve clients until shutdown. The socket file is
/// removed on exit.
pub async fn serve(
    socket: PathBuf,
    source: StatusSource,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    if let Some(parent) = socket.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
    }
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "status socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "status socket accept failed");
                        continue;
                    }
                };
                let source = source.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, source, shutdown_tx).await {
                        tracing::error!(error = %err, "status client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_client(
    stream: UnixStream,
    source: StatusSource,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("status socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = source.respond(&request, &shutdown_tx);
        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }
    Ok(())
}

/// Refuse to steal a live socket; remove a stale one.
fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if fs::symlink_metadata(socket).is_err() {
        return Ok(());
    }
    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "status socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale status socket before bind",
            );
        }
    }
    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .await
        .map_err(|e| io_err("status socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("status socket flush", e))
}

fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
