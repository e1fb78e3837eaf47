//! Transport layer for actor-link channels.
//!
//! This crate defines the [`Connector`] trait, the seam between a channel
//! and whatever byte-stream transport carries it, and provides the
//! production [`TcpConnector`].
//!
//! A connector owns the socket and the stream-reassembly concern: inbound
//! bytes are split on the outer 4-byte length prefix and delivered as one
//! complete frame buffer (prefix included) per [`ConnectorEvent::Data`].
//! What the frames mean is the channel's business; the connector moves
//! opaque, already-framed bytes.

pub mod error;
pub mod tcp;

pub use error::{Result, TransportError};
pub use tcp::TcpConnector;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

/// An event surfaced by an established connection.
#[derive(Debug)]
pub enum ConnectorEvent {
    /// One complete inbound frame, length prefix included.
    Data(Bytes),
    /// The connection was lost (peer close, read error, or write error).
    /// Not emitted for a locally requested [`Connector::disconnect`].
    Disconnected,
}

/// Resolves once a frame handed to [`Connector::send`] has reached the
/// socket. Dropped unresolved if the connection goes down first.
pub type SendCompletion = oneshot::Sender<Result<()>>;

/// A client-side byte-stream transport.
///
/// All methods take `&self` so a connector can be shared between the channel
/// driver task and caller threads; implementations use interior mutability.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish the connection, bounded by `timeout`.
    ///
    /// On success, returns the event stream for the new session. The stream
    /// yields inbound frames until the connection is lost, then a final
    /// [`ConnectorEvent::Disconnected`].
    async fn connect(&self, timeout: Duration) -> Result<mpsc::UnboundedReceiver<ConnectorEvent>>;

    /// Hand one already-framed message to the transport.
    ///
    /// Returns once the transport has accepted the bytes; the actual write
    /// happens on the connection's writer task. `completion`, if provided,
    /// resolves when the bytes reach the socket.
    fn send(&self, frame: Bytes, completion: Option<SendCompletion>) -> Result<()>;

    /// Tear the connection down. Idempotent; a no-op when not connected.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}
