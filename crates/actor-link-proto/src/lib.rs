//! Wire protocol for actor-link peer channels.
//!
//! Every message on the wire is a **frame**: a length-prefixed binary
//! envelope carrying an opcode and an opaque payload.
//!
//! # Wire Format
//!
//! ```text
//! [len:4 BE][opcode:1][payload:len-1]
//! ```
//!
//! `len` counts the opcode byte plus the payload. The transport layer
//! reassembles the byte stream on the `len` prefix and hands one complete
//! frame buffer (including the prefix) per receive event; [`FrameHeader`]
//! parses that buffer without copying the payload.
//!
//! # Opcodes
//!
//! - `0x01` Hello: connector's half of the handshake, payload is the
//!   sender's [`ActorIdentity`]
//! - `0x02` Welcome: acceptor's reply, payload is its [`ActorIdentity`]
//! - `0x03` Ping / `0x04` Pong: keep-alive probes, no payload
//! - anything else: application traffic, passed through to the consumer
//!   untouched (`0x10` is the conventional first application opcode)

pub mod codec;
pub mod error;
pub mod frame;
pub mod identity;

pub use error::ProtoError;
pub use frame::{encode_frame, Frame, FrameHeader, OpCode, HEADER_SIZE, LEN_PREFIX_SIZE, MAX_FRAME_LEN};
pub use identity::ActorIdentity;
