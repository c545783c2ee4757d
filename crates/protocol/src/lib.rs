//! chatstream Protocol
//!
//! Wire types exchanged between the chatstream client and the inference
//! backend. Frames are serialized as JSON text over a single WebSocket.

use uuid::Uuid;

// Re-exports
pub mod client;
pub mod server;
pub mod types;

pub use client::{ChatTurn, ClientFrame, ControlMessage};
pub use server::ServerFrame;
pub use types::*;

/// Distinguished session that always exists and cannot be deleted.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
