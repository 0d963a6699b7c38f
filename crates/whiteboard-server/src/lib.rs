//! Line-protocol TCP server for collaborative whiteboards.
//!
//! Every connection gets its own task that reads one command per line,
//! applies it to the shared [`ServerState`], and answers on the same
//! connection. Changes other sessions must see are queued in order and
//! delivered by a single fan-out task (see [`events`]).

pub mod connection;
pub mod directory;
pub mod events;
pub mod methods;
pub mod server;
pub mod session;
pub mod state;

pub use server::{serve, start_server};
pub use state::ServerState;
