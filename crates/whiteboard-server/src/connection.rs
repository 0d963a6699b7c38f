//! TCP connection lifecycle: read loop, writer task, teardown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use whiteboard_core::protocol::Reply;

use crate::events::unicast;
use crate::methods::{dispatch, end_session, Dispatch};
use crate::session::{Session, SessionWriter};
use crate::state::ServerState;

/// Longest accepted command line, in bytes.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// How long queued lines may take to drain once a session has ended.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Serve one client until it logs out, disconnects, fails a delivery, or the
/// server stops.
pub async fn handle_connection(
    state: Arc<ServerState>,
    stream: TcpStream,
    peer: SocketAddr,
    server_shutdown: CancellationToken,
) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, %peer, "New connection");

    if let Err(e) = stream.set_nodelay(true) {
        debug!(conn_id = %conn_id, %e, "Could not disable Nagle");
    }
    let (read_half, write_half) = stream.into_split();
    let mut lines = FramedRead::new(
        read_half,
        LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
    );
    let mut sink = FramedWrite::new(write_half, LinesCodec::new());

    let (writer, mut event_rx) = SessionWriter::channel(conn_id.clone());
    let session_shutdown = writer.shutdown_token();

    // Writer task: everything for this client goes through here, replies and
    // notifications alike, in the order they were queued.
    let writer_token = session_shutdown.clone();
    let writer_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(line) = event_rx.recv().await {
            if let Err(e) = sink.send(line).await {
                warn!(conn_id = %writer_conn_id, %e, "Write failed");
                writer_token.cancel();
                return;
            }
        }
        if let Err(e) = SinkExt::<String>::close(&mut sink).await {
            debug!(conn_id = %writer_conn_id, %e, "Close failed");
        }
    });

    state.attach(writer.clone());
    let mut session = Session::new(writer);

    loop {
        tokio::select! {
            _ = session_shutdown.cancelled() => {
                debug!(conn_id = %conn_id, "Session shut down");
                break;
            }
            _ = server_shutdown.cancelled() => {
                debug!(conn_id = %conn_id, "Server stopping");
                break;
            }
            next = lines.next() => match next {
                Some(Ok(line)) => match dispatch(&state, &mut session, &line) {
                    Dispatch::Reply(reply) => {
                        if !unicast(&session.writer, reply.to_string()) {
                            break;
                        }
                    }
                    Dispatch::Ignore => {}
                    Dispatch::Logout => {
                        info!(conn_id = %conn_id, username = ?session.username(), "Logout");
                        break;
                    }
                },
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    // The codec does not resume after an error.
                    warn!(conn_id = %conn_id, "Line too long, closing");
                    unicast(&session.writer, Reply::InvalidInput.to_string());
                    break;
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    debug!(conn_id = %conn_id, %e, "Read failed");
                    break;
                }
                None => {
                    debug!(conn_id = %conn_id, "Client disconnected");
                    break;
                }
            }
        }
    }

    end_session(&state, &mut session);
    drop(session);

    if tokio::time::timeout(FLUSH_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        debug!(conn_id = %conn_id, "Writer did not drain in time");
        send_task.abort();
    }
    info!(conn_id = %conn_id, "Connection closed");
}
