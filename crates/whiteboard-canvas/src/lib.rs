//! Shared pixel canvases.
//!
//! A [`Canvas`] is a fixed-size grid of colored cells that several sessions
//! draw on at once; the [`CanvasRegistry`] owns every canvas created while the
//! server runs. Changes that other sessions must see are queued as
//! [`Outbound`](whiteboard_core::protocol::Outbound) notifications while the
//! lock that serialized the change is still held.

pub mod canvas;
pub mod cell;
pub mod raster;
pub mod registry;

pub use canvas::Canvas;
pub use cell::Cell;
pub use registry::CanvasRegistry;
