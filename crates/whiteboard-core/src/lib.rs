//! Shared config, errors, and wire protocol for the whiteboard server.

pub mod config;
pub mod error;
pub mod protocol;
