//! Request/reply channel to the sidecar.
//!
//! The sidecar speaks a strict one-request-one-reply protocol: a client must
//! read the reply to a request before it may send the next one. [`RequestSlot`]
//! enforces that alternation on top of any [`RequestChannel`]; the production
//! channel is a WebSocket ([`ws`]), tests plug in their own [`Connector`].

pub mod slot;
pub mod ws;

pub use slot::{RequestSlot, SlotState};
pub use ws::{WsChannel, WsConnector};

use crate::error::transport::TransportError;

use futures_util::future::BoxFuture;

/// One connected request/reply socket.
pub trait RequestChannel: Send {
    /// Send `request` and wait for the single reply to it.
    fn round_trip(&mut self, request: String) -> BoxFuture<'_, Result<String, TransportError>>;
}

/// Opens [`RequestChannel`]s to a local port.
pub trait Connector: Send + Sync {
    fn connect(&self, port: u16) -> BoxFuture<'_, Result<Box<dyn RequestChannel>, TransportError>>;
}
