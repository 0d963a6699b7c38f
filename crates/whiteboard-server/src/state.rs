//! Shared server state.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;

use whiteboard_canvas::CanvasRegistry;
use whiteboard_core::config::Config;

use crate::directory::SessionDirectory;
use crate::events;
use crate::session::SessionWriter;

/// State shared by every connection task.
pub struct ServerState {
    pub config: Arc<Config>,
    pub registry: CanvasRegistry,
    pub directory: SessionDirectory,
    /// Every open connection by id, logged in or not.
    connections: RwLock<HashMap<String, SessionWriter>>,
}

impl ServerState {
    /// Build the state and start its fan-out task.
    ///
    /// Must be called from within a tokio runtime. The fan-out task exits once
    /// the last reference to the state is dropped.
    pub fn new(config: Config) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Self {
            config: Arc::new(config),
            registry: CanvasRegistry::new(outbound_tx.clone()),
            directory: SessionDirectory::new(outbound_tx),
            connections: RwLock::new(HashMap::new()),
        });
        tokio::spawn(events::run_fanout(Arc::downgrade(&state), outbound_rx));
        state
    }

    /// Dimensions given to newly created whiteboards.
    pub fn canvas_size(&self) -> (usize, usize) {
        self.config.canvas_size()
    }

    /// Make a connection reachable by id.
    pub fn attach(&self, writer: SessionWriter) {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(writer.conn_id.clone(), writer);
    }

    /// Forget a connection. Lines still queued for it are dropped at delivery.
    pub fn detach(&self, conn_id: &str) {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(conn_id);
    }

    pub fn connection(&self, conn_id: &str) -> Option<SessionWriter> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conn_id)
            .cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
