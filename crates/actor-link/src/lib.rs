//! Peer-to-peer actor messaging channels over TCP.
//!
//! A channel connects one local actor endpoint to one remote peer over a
//! long-lived connection and exchanges length-prefixed frames: four control
//! opcodes (Hello, Welcome, Ping, Pong) the channel handles itself, and
//! application frames it relays untouched.
//!
//! Opening a channel dials the peer, then performs a two-message handshake
//! in the background: the connector sends `Hello` with its own
//! [`ActorIdentity`], the acceptor answers `Welcome` with its identity, and
//! from then on the channel is *active*: application sends are checked
//! against the peer's identity, and a Ping/Pong keep-alive watches the
//! connection during quiet periods.
//!
//! ```ignore
//! let local = ActorIdentity::new("gateway", "gw-1");
//! let channel = ConnectorChannel::new(
//!     local,
//!     "10.0.0.7:9400".parse()?,
//!     TcpConnector::new("10.0.0.7:9400".parse()?),
//!     ChannelConfig::default(),
//! );
//!
//! let mut events = channel.open().await?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChannelEvent::Connected { remote, .. } => {
//!             channel.send_to_type("matcher", my_frame.clone())?;
//!         }
//!         ChannelEvent::Data { frame, .. } => handle(frame),
//!         ChannelEvent::Disconnected { .. } => break,
//!     }
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod keepalive;

pub use channel::{ChannelState, ConnectorChannel};
pub use config::ChannelConfig;
pub use error::ChannelError;
pub use event::ChannelEvent;
pub use keepalive::KeepAliveTracker;

pub use actor_link_proto::{ActorIdentity, Frame, FrameHeader, OpCode};
pub use actor_link_transport::{Connector, ConnectorEvent, TcpConnector, TransportError};
