//! Per-connection session state.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lines a connection may have queued but not yet written. A peer that falls
/// this far behind is disconnected.
pub const SESSION_QUEUE_CAPACITY: usize = 1024;

/// Write side of a connection.
///
/// Lines sent here are written by the connection's writer task, so sending
/// never waits on a slow peer. Cancelling `shutdown` makes the connection
/// tear itself down as if the client had logged out.
#[derive(Debug, Clone)]
pub struct SessionWriter {
    pub conn_id: String,
    tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
}

impl SessionWriter {
    /// Create a writer and the receiving end its writer task drains.
    pub fn channel(conn_id: impl Into<String>) -> (Self, mpsc::Receiver<String>) {
        Self::with_capacity(conn_id, SESSION_QUEUE_CAPACITY)
    }

    pub fn with_capacity(
        conn_id: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let writer = Self {
            conn_id: conn_id.into(),
            tx,
            shutdown: CancellationToken::new(),
        };
        (writer, rx)
    }

    /// Queue one line without waiting. Fails when the queue is full or the
    /// writer task has gone away; either way the line is handed back.
    pub fn send(&self, line: String) -> Result<(), String> {
        self.tx.try_send(line).map_err(|e| e.into_inner())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Schedule the session for teardown.
    pub fn shut_down(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// A registered session as seen by other sessions.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub username: String,
    pub writer: SessionWriter,
}

/// Protocol state of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated { username: String },
    Viewing { username: String, whiteboard: String },
    Closed,
}

/// Everything a connection task knows about its client.
#[derive(Debug)]
pub struct Session {
    pub writer: SessionWriter,
    pub state: SessionState,
}

impl Session {
    pub fn new(writer: SessionWriter) -> Self {
        Self {
            writer,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn conn_id(&self) -> &str {
        &self.writer.conn_id
    }

    /// Username assigned to this connection, if any.
    pub fn username(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated { username }
            | SessionState::Viewing { username, .. } => Some(username),
            SessionState::Unauthenticated | SessionState::Closed => None,
        }
    }

    /// Whiteboard this connection currently has open, if any.
    pub fn viewing(&self) -> Option<&str> {
        match &self.state {
            SessionState::Viewing { whiteboard, .. } => Some(whiteboard),
            _ => None,
        }
    }

    /// Record an opened whiteboard. Only one is tracked; opening another
    /// replaces it.
    pub fn start_viewing(&mut self, whiteboard: &str) {
        if let Some(username) = self.username() {
            self.state = SessionState::Viewing {
                username: username.to_string(),
                whiteboard: whiteboard.to_string(),
            };
        }
    }

    /// Forget the open whiteboard if it is `whiteboard`.
    pub fn stop_viewing(&mut self, whiteboard: &str) {
        if let SessionState::Viewing {
            username,
            whiteboard: current,
        } = &self.state
        {
            if current == whiteboard {
                self.state = SessionState::Authenticated {
                    username: username.clone(),
                };
            }
        }
    }
}
