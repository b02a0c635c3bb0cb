use gitmirror_core::SyncConfig;
use gitmirror_sync::CycleOutcome;
use tokio::sync::broadcast;

use crate::error::{io_err, DaemonError};
use crate::server::{self, StatusSource};
use crate::supervisor::SyncSupervisor;

/// How the process ended.
#[derive(Debug)]
pub enum Exit {
    /// One-shot mode finished its single cycle successfully.
    Synced(CycleOutcome),
    /// Periodic mode stopped on request.
    Stopped,
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Build a runtime and block the current thread until the daemon exits.
pub fn start_blocking(config: SyncConfig) -> Result<Exit, DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// One-shot mode runs a single cycle. Periodic mode runs the sync loop, the
/// status socket and the signal handler until one of them asks to stop.
pub async fn run(config: SyncConfig) -> Result<Exit, DaemonError> {
    let mut supervisor = SyncSupervisor::new(config);
    if supervisor.config().one_time {
        return supervisor.run_once().await.map(Exit::Synced);
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let source = StatusSource {
        state: supervisor.subscribe(),
        policy: supervisor.policy(),
    };
    let socket = supervisor.config().status_socket.clone();

    let sync_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = supervisor.run_periodic(shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = server::serve(socket, source, shutdown.clone(), shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, shutting down");
                        let _ = shutdown.send(());
                        Ok(())
                    }
                    Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                }
            }
        })
    };

    let (sync_result, socket_result, signal_result) =
        tokio::join!(sync_handle, socket_handle, signal_handle);
    handle_join("sync_loop", sync_result)?;
    handle_join("status_socket", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(Exit::Stopped)
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}
