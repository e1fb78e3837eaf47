//! Frame layout and header parsing.

use bytes::Bytes;

/// Size of the big-endian length prefix.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Smallest possible frame buffer: length prefix plus opcode.
pub const HEADER_SIZE: usize = LEN_PREFIX_SIZE + 1;

/// Upper bound on `len` accepted by the decoder (8 MiB).
///
/// Both the header decoder and the transport reader enforce this, so a
/// corrupted or hostile length prefix cannot drive an allocation.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

const OP_HELLO: u8 = 0x01;
const OP_WELCOME: u8 = 0x02;
const OP_PING: u8 = 0x03;
const OP_PONG: u8 = 0x04;

/// Frame opcode.
///
/// The four control opcodes are interpreted by the channel itself; every
/// other byte value is application traffic and passes through untouched.
/// Application opcodes must stay outside the control range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Hello,
    Welcome,
    Ping,
    Pong,
    Application(u8),
}

impl OpCode {
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Hello => OP_HELLO,
            Self::Welcome => OP_WELCOME,
            Self::Ping => OP_PING,
            Self::Pong => OP_PONG,
            Self::Application(b) => b,
        }
    }

    pub const fn from_byte(b: u8) -> Self {
        match b {
            OP_HELLO => Self::Hello,
            OP_WELCOME => Self::Welcome,
            OP_PING => Self::Ping,
            OP_PONG => Self::Pong,
            other => Self::Application(other),
        }
    }

    /// True for the opcodes the channel consumes itself.
    pub const fn is_control(self) -> bool {
        !matches!(self, Self::Application(_))
    }
}

/// Parsed view of a frame buffer: opcode plus the payload's position.
///
/// The header never copies; [`FrameHeader::payload`] borrows the payload
/// slice back out of the buffer it was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub opcode: OpCode,
    pub payload_offset: usize,
    pub payload_len: usize,
}

impl FrameHeader {
    /// Decode a header from a buffer starting at a length prefix.
    ///
    /// Returns `None` if the buffer is too short to hold the declared frame,
    /// the declared length is zero (a frame always has an opcode), or the
    /// declared length exceeds [`MAX_FRAME_LEN`]. Trailing bytes beyond the
    /// declared frame are ignored.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let len = u32::from_be_bytes([
            *buf.first()?,
            *buf.get(1)?,
            *buf.get(2)?,
            *buf.get(3)?,
        ]) as usize;

        if len == 0 || len > MAX_FRAME_LEN {
            return None;
        }
        if buf.len() < LEN_PREFIX_SIZE.checked_add(len)? {
            return None;
        }

        let opcode = OpCode::from_byte(*buf.get(LEN_PREFIX_SIZE)?);
        Some(Self {
            opcode,
            payload_offset: HEADER_SIZE,
            payload_len: len - 1,
        })
    }

    /// Total wire size of the frame this header describes.
    pub const fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len
    }

    /// Borrow the payload slice out of the buffer this header was decoded
    /// from.
    pub fn payload<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        buf.get(self.payload_offset..self.payload_offset + self.payload_len)
            .unwrap_or(&[])
    }
}

/// Encode a frame from its opcode and payload.
pub fn encode_frame(opcode: OpCode, payload: &[u8]) -> Bytes {
    let len = 1_usize.saturating_add(payload.len());
    let mut buf = Vec::with_capacity(LEN_PREFIX_SIZE.saturating_add(len));
    buf.extend_from_slice(&(len as u32).to_be_bytes());
    buf.push(opcode.to_byte());
    buf.extend_from_slice(payload);
    Bytes::from(buf)
}

/// A fully-decoded frame.
///
/// The channel works from [`FrameHeader`] to avoid copying application
/// payloads; this owned form exists for building outbound control frames and
/// for peers/tests that want a typed view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Hello(Vec<u8>),
    Welcome(Vec<u8>),
    Ping,
    Pong,
    Application { opcode: u8, payload: Vec<u8> },
}

impl Frame {
    pub const fn opcode(&self) -> OpCode {
        match self {
            Self::Hello(_) => OpCode::Hello,
            Self::Welcome(_) => OpCode::Welcome,
            Self::Ping => OpCode::Ping,
            Self::Pong => OpCode::Pong,
            Self::Application { opcode, .. } => OpCode::Application(*opcode),
        }
    }

    /// Encode into wire bytes, length prefix included.
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Hello(payload) | Self::Welcome(payload) => {
                encode_frame(self.opcode(), payload)
            }
            Self::Ping | Self::Pong => encode_frame(self.opcode(), &[]),
            Self::Application { payload, .. } => encode_frame(self.opcode(), payload),
        }
    }

    /// Decode one frame from the front of a buffer.
    ///
    /// Returns the frame and the number of bytes consumed, or `None` if the
    /// buffer does not yet hold a complete frame. Ping and Pong tolerate (and
    /// drop) a payload, since the peer is not required to send one.
    pub fn decode(buf: &[u8]) -> Option<(Self, usize)> {
        let header = FrameHeader::decode(buf)?;
        let payload = header.payload(buf);
        let frame = match header.opcode {
            OpCode::Hello => Self::Hello(payload.to_vec()),
            OpCode::Welcome => Self::Welcome(payload.to_vec()),
            OpCode::Ping => Self::Ping,
            OpCode::Pong => Self::Pong,
            OpCode::Application(opcode) => Self::Application {
                opcode,
                payload: payload.to_vec(),
            },
        };
        Some((frame, header.frame_len()))
    }
}
