use thiserror::Error;

/// Errors produced by the identity codec.
///
/// Frame-level decoding is total: malformed or incomplete frame buffers
/// yield `None` rather than an error, so only the serialized-payload codec
/// can fail.
#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}
