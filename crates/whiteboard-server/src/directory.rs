//! Directory of logged-in sessions.

use std::sync::{PoisonError, RwLock};

use tracing::{debug, info};

use whiteboard_core::error::{Result, WhiteboardError};
use whiteboard_core::protocol::{is_valid_name, Notification, Outbound, OutboundSender};

use crate::session::{SessionHandle, SessionWriter};

/// Username → session, in registration order.
///
/// Every change queues the new `allUsersOnline` list while the directory lock
/// is held, so sessions see membership changes in the order they happened.
pub struct SessionDirectory {
    sessions: RwLock<Vec<SessionHandle>>,
    outbound: OutboundSender,
}

impl SessionDirectory {
    pub fn new(outbound: OutboundSender) -> Self {
        Self {
            sessions: RwLock::new(Vec::new()),
            outbound,
        }
    }

    fn announce(&self, sessions: &[SessionHandle]) {
        let names = sessions.iter().map(|s| s.username.clone()).collect();
        if self
            .outbound
            .send(Outbound::everyone(Notification::AllUsersOnline(names)))
            .is_err()
        {
            debug!("Outbound queue closed, dropping user list");
        }
    }

    /// Claim `username` for the connection behind `writer`.
    pub fn register(&self, username: &str, writer: SessionWriter) -> Result<SessionHandle> {
        if !is_valid_name(username) {
            return Err(WhiteboardError::InvalidUsername(username.to_string()));
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.iter().any(|s| s.username == username) {
            return Err(WhiteboardError::UsernameTaken(username.to_string()));
        }

        let handle = SessionHandle {
            username: username.to_string(),
            writer,
        };
        sessions.push(handle.clone());
        self.announce(&sessions);
        drop(sessions);

        info!(username = %username, conn_id = %handle.writer.conn_id, "User registered");
        Ok(handle)
    }

    /// Release `username`. Returns whether it was registered.
    pub fn unregister(&self, username: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|s| s.username != username);
        let removed = sessions.len() != before;
        if removed {
            self.announce(&sessions);
        }
        drop(sessions);

        if removed {
            info!(username = %username, "User unregistered");
        }
        removed
    }

    #[cfg(test)]
    fn get(&self, username: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.username == username)
            .cloned()
    }

    /// Usernames in registration order.
    pub fn list_usernames(&self) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.username.clone())
            .collect()
    }

    /// Snapshot of every registered session.
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sessions for the given usernames, in the given order. Names with no
    /// registered session are skipped.
    pub fn resolve(&self, usernames: &[String]) -> Vec<SessionHandle> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        usernames
            .iter()
            .filter_map(|name| sessions.iter().find(|s| &s.username == name).cloned())
            .collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;
    use whiteboard_core::protocol::OutboundReceiver;

    use super::*;

    fn directory() -> (Arc<SessionDirectory>, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(SessionDirectory::new(tx)), rx)
    }

    fn writer(conn_id: &str) -> SessionWriter {
        SessionWriter::channel(conn_id).0
    }

    #[test]
    fn test_register_and_list() {
        let (directory, mut rx) = directory();
        directory.register("bob", writer("c1")).unwrap();
        directory.register("alice", writer("c2")).unwrap();

        assert_eq!(directory.list_usernames(), vec!["bob", "alice"]);
        assert_eq!(directory.get("alice").unwrap().writer.conn_id, "c2");
        assert!(directory.get("carol").is_none());

        rx.try_recv().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::everyone(Notification::AllUsersOnline(vec![
                "bob".into(),
                "alice".into()
            ]))
        );
    }

    #[test]
    fn test_register_rejects_taken_and_invalid() {
        let (directory, _rx) = directory();
        directory.register("bob", writer("c1")).unwrap();

        assert!(matches!(
            directory.register("bob", writer("c2")),
            Err(WhiteboardError::UsernameTaken(_))
        ));
        for name in ["", "bob smith", "new\nline"] {
            assert!(matches!(
                directory.register(name, writer("c3")),
                Err(WhiteboardError::InvalidUsername(_))
            ));
        }
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let (directory, mut rx) = directory();
        directory.register("bob", writer("c1")).unwrap();
        rx.try_recv().unwrap();

        assert!(directory.unregister("bob"));
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::everyone(Notification::AllUsersOnline(vec![]))
        );
        assert!(!directory.unregister("bob"));
        assert!(rx.try_recv().is_err());
        assert_eq!(directory.len(), 0);
    }

    #[test]
    fn test_resolve_skips_unknown() {
        let (directory, _rx) = directory();
        directory.register("a", writer("c1")).unwrap();
        directory.register("b", writer("c2")).unwrap();

        let handles = directory.resolve(&["b".into(), "ghost".into(), "a".into()]);
        let names: Vec<_> = handles.iter().map(|h| h.username.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_concurrent_register_has_one_winner() {
        let (directory, _rx) = directory();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let directory = directory.clone();
                std::thread::spawn(move || {
                    directory
                        .register("same", writer(&format!("c{i}")))
                        .map_err(|e| matches!(e, WhiteboardError::UsernameTaken(_)))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().all(|r| match r {
            Ok(_) => true,
            Err(taken) => *taken,
        }));
        assert_eq!(directory.list_usernames(), vec!["same"]);
    }
}
