//! Registry of every whiteboard created since the server started.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use whiteboard_core::error::{Result, WhiteboardError};
use whiteboard_core::protocol::{is_valid_name, Notification, Outbound, OutboundSender};

use crate::canvas::Canvas;

/// Canvases in creation order, unique by exact name.
pub struct CanvasRegistry {
    canvases: RwLock<Vec<Arc<Canvas>>>,
    outbound: OutboundSender,
}

impl CanvasRegistry {
    /// Create an empty registry whose canvases queue their notifications on
    /// `outbound`.
    pub fn new(outbound: OutboundSender) -> Self {
        Self {
            canvases: RwLock::new(Vec::new()),
            outbound,
        }
    }

    /// Create and register a blank canvas, then queue the new name list for
    /// every session.
    pub fn create(&self, name: &str, width: usize, height: usize) -> Result<Arc<Canvas>> {
        if !is_valid_name(name) {
            return Err(WhiteboardError::InvalidName(name.to_string()));
        }

        let mut canvases = self
            .canvases
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if canvases.iter().any(|c| c.name() == name) {
            return Err(WhiteboardError::NameConflict(name.to_string()));
        }

        let canvas = Arc::new(Canvas::new(name, width, height, self.outbound.clone()));
        canvases.push(canvas.clone());

        let names = canvases.iter().map(|c| c.name().to_string()).collect();
        if self
            .outbound
            .send(Outbound::everyone(Notification::AllWhiteboards(names)))
            .is_err()
        {
            debug!("Outbound queue closed, dropping whiteboard list");
        }
        drop(canvases);

        info!(canvas = %name, width, height, "Whiteboard created");
        Ok(canvas)
    }

    pub fn find(&self, name: &str) -> Option<Arc<Canvas>> {
        self.canvases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Names in creation order.
    pub fn list_names(&self) -> Vec<String> {
        self.canvases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Snapshot of every canvas, used to detach a departing session.
    pub fn all(&self) -> Vec<Arc<Canvas>> {
        self.canvases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.canvases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
