//! Notification delivery.
//!
//! Registry, directory and canvases queue [`Outbound`] notifications on one
//! ordered channel while holding the lock that serialized the change. The
//! fan-out task drains that channel and resolves each audience at delivery
//! time: the canvas's subscriber list for canvas notifications, the
//! connection table for replies queued on behalf of one connection, the
//! directory for everything else. It takes one lock at a time and delivers
//! after releasing it.

use std::sync::Weak;

use tracing::{debug, warn};

use whiteboard_core::protocol::{Audience, Outbound, OutboundReceiver};

use crate::session::{SessionHandle, SessionWriter};
use crate::state::ServerState;

/// Send one line to the session that issued a request.
pub fn unicast(writer: &SessionWriter, message: String) -> bool {
    match writer.send(message) {
        Ok(()) => true,
        Err(_) => {
            warn!(conn_id = %writer.conn_id, "Reply undeliverable, closing session");
            writer.shut_down();
            false
        }
    }
}

/// Deliver to each handle; a failed recipient is scheduled for teardown and
/// the rest still receive the message. Returns the number delivered.
fn deliver(handles: &[SessionHandle], message: &str) -> usize {
    let mut sent = 0;
    for handle in handles {
        if handle.writer.send(message.to_string()).is_ok() {
            sent += 1;
        } else {
            warn!(
                username = %handle.username,
                conn_id = %handle.writer.conn_id,
                "Broadcast undeliverable, closing session"
            );
            handle.writer.shut_down();
        }
    }
    sent
}

/// Send to every registered session.
pub fn to_all(state: &ServerState, message: &str) -> usize {
    let handles = state.directory.handles();
    deliver(&handles, message)
}

/// Send to the sessions subscribed to `whiteboard` right now, optionally
/// skipping one username.
pub fn to_canvas_subscribers(
    state: &ServerState,
    whiteboard: &str,
    except: Option<&str>,
    message: &str,
) -> usize {
    let Some(canvas) = state.registry.find(whiteboard) else {
        debug!(canvas = %whiteboard, "Notification for unknown whiteboard dropped");
        return 0;
    };
    let mut usernames = canvas.subscribers();
    if let Some(skip) = except {
        usernames.retain(|u| u != skip);
    }
    let handles = state.directory.resolve(&usernames);
    deliver(&handles, message)
}

/// Send to one connection by id. A connection that has already gone away is
/// skipped.
pub fn to_connection(state: &ServerState, conn_id: &str, message: &str) -> usize {
    match state.connection(conn_id) {
        Some(writer) => usize::from(unicast(&writer, message.to_string())),
        None => {
            debug!(conn_id, "Reply for closed connection dropped");
            0
        }
    }
}

/// Deliver one queued notification.
pub fn dispatch_outbound(state: &ServerState, outbound: Outbound) -> usize {
    let message = outbound.notification.to_string();
    let sent = match &outbound.audience {
        Audience::Everyone => to_all(state, &message),
        Audience::Subscribers { whiteboard, except } => {
            to_canvas_subscribers(state, whiteboard, except.as_deref(), &message)
        }
        Audience::Connection(conn_id) => to_connection(state, conn_id, &message),
    };
    debug!(audience = ?outbound.audience, sent, "Notification delivered");
    sent
}

/// Drain the outbound queue until the server state is gone.
pub(crate) async fn run_fanout(state: Weak<ServerState>, mut rx: OutboundReceiver) {
    while let Some(outbound) = rx.recv().await {
        let Some(state) = state.upgrade() else {
            break;
        };
        dispatch_outbound(&state, outbound);
    }
    debug!("Fan-out task finished");
}
