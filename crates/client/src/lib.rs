//! chatstream client
//!
//! Keeps one persistent connection to the inference backend, survives
//! network interruptions, and reassembles streamed text fragments into
//! ordered chat messages. Consumers hold a [`ChatClient`] and read
//! [`ChatSnapshot`]s; everything else runs inside the client actor.

pub mod activity;
pub mod backoff;
pub mod client;
pub mod command;
pub mod config;
pub mod confirmation;
pub mod connection;
pub mod error;
pub mod fragment_buffer;
pub mod session;
pub mod state;
pub mod transcript;
pub mod transport;

pub use client::ChatClient;
pub use command::ChatRequest;
pub use config::{ClientConfig, ReconnectConfig};
pub use error::{ClientError, ConfigError, TransportError};
pub use state::{ChatSnapshot, ClientEvent};
pub use transport::{Connector, MemoryConnector, MemoryLink, MemoryLinks, WebSocketConnector};
