//! WebSocket Handling
//!
//! Each socket gets its own writer, reader and worker task:
//! - the writer drains the connection's outbound queue (and acks relay frames)
//! - the reader decodes nothing, it only feeds text frames into a FIFO queue
//! - the worker dispatches frames one at a time, preserving per-connection order

mod connection;
pub mod dispatch;
mod handler;

use std::fmt;

pub use connection::{ConnectionHandle, DeliveryError, Outbound};
pub use dispatch::{Binding, ConnectionContext};
pub use handler::serve_socket;

/// Which listener a socket arrived on. Decides the message kinds it serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Session creation, pairing and close only
    Handshake,
    /// Full protocol, including `text_translation`
    Relay,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Relay => "relay",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
