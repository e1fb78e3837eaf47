use std::net::SocketAddr;

use actor_link_proto::ActorIdentity;
use bytes::Bytes;

/// Events a channel surfaces to its consumer.
#[derive(Debug)]
pub enum ChannelEvent {
    /// The handshake completed; the channel is active and `remote` is the
    /// peer's asserted identity.
    Connected {
        endpoint: SocketAddr,
        remote: ActorIdentity,
    },

    /// The session ended. Emitted exactly once per successful connect, with
    /// the last known peer identity; `None` when the handshake never
    /// completed.
    Disconnected {
        endpoint: SocketAddr,
        remote: Option<ActorIdentity>,
    },

    /// An application frame arrived. `frame` is the entire inbound buffer,
    /// length prefix and opcode included; parse it with the proto crate.
    Data {
        endpoint: SocketAddr,
        remote: ActorIdentity,
        frame: Bytes,
    },
}
