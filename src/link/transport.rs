//! Transport abstraction: any message-oriented duplex channel.
//!
//! Concrete implementations:
//! - WebSocket over TCP or TLS ([`WsConnector`](super::ws::WsConnector))
//! - in-memory scripted channels in the integration tests
//!
//! The connection agent is written against these traits only, so a new
//! transport requires zero changes to the session logic.

use crate::error::TransportError;

/// One established connection carrying text frames.
pub trait Transport {
    /// Send one text frame.
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Take the next inbound frame without blocking for long.
    /// Returns `Ok(None)` if nothing is pending.
    ///
    /// A [`TransportError::Decode`] affects only the current frame; any
    /// other error means the connection is gone.
    fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Close the channel.  Must be safe to call more than once.
    fn close(&mut self);
}

/// Opens transports to a server URL.
pub trait Connector: Send {
    fn connect(&mut self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}
