//! TCP accept loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::handle_connection;
use crate::state::ServerState;

/// How long open connections get to finish after shutdown is requested.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind the configured address and serve until Ctrl-C.
pub async fn start_server(state: Arc<ServerState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.bind(), state.config.port());
    let listener = TcpListener::bind(&addr).await?;
    info!("Whiteboard server listening on {addr}");

    serve(listener, state, shutdown_signal()).await
}

/// Accept connections on `listener` until `shutdown` resolves, then close
/// every open connection.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let stop = CancellationToken::new();
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(handle_connection(
                        state.clone(),
                        stream,
                        peer,
                        stop.clone(),
                    ));
                }
                Err(e) => {
                    // Usually transient (EMFILE, aborted handshake); keep accepting.
                    warn!(%e, "Accept failed");
                }
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    warn!(%e, "Connection task failed");
                }
            }
        }
    }

    info!(open = state.connection_count(), "Shutting down");
    stop.cancel();
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        debug!("Aborting connections that did not close in time");
        connections.abort_all();
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(%e, "Failed to listen for Ctrl-C, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
