//! pairpad Protocol
//!
//! Wire types for the two persistent channels pairpad serves: the
//! document/presence channel and the terminal channel. Everything here is
//! serialized as JSON text frames over WebSocket.

use uuid::Uuid;

pub mod client;
pub mod server;
pub mod types;

pub use client::{DocClientMessage, TerminalClientMessage};
pub use server::{DocServerMessage, TerminalServerMessage};
pub use types::*;

/// Generate a new opaque id for a freshly accepted connection.
pub fn new_id() -> ClientId {
    ClientId(Uuid::new_v4().simple().to_string())
}
