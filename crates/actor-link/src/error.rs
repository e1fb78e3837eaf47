use actor_link_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    /// The channel has no handshaked peer; sends fail fast rather than
    /// buffer.
    #[error("not connected to a peer")]
    NotConnected,

    /// The send named an actor that is not the channel's peer.
    #[error("address mismatch: send addressed {requested} but peer is {remote}")]
    AddressMismatch { requested: String, remote: String },

    /// The channel was closed, or was never in a state where the operation
    /// makes sense. Channels are single-use: construct a new one to retry.
    #[error("channel is closed")]
    Closed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
