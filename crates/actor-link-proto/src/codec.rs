//! rkyv-backed serialization for control-frame payloads.

use bytes::Bytes;
use rkyv::{
    api::high::{HighSerializer, HighValidator},
    bytecheck::CheckBytes,
    de::Pool,
    ser::allocator::ArenaHandle,
    util::AlignedVec,
    Archive, Deserialize, Serialize,
};

use crate::error::ProtoError;

/// Serialize `value` into a `Bytes` buffer using rkyv.
pub fn encode<T>(value: &T) -> Result<Bytes, ProtoError>
where
    T: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, rkyv::rancor::Error>>,
{
    let buf = rkyv::to_bytes::<rkyv::rancor::Error>(value)
        .map_err(|e| ProtoError::Encode(e.to_string()))?;
    Ok(Bytes::from(buf.into_vec()))
}

/// Deserialize a `T` from the raw bytes produced by [`encode`].
pub fn decode<T>(bytes: &[u8]) -> Result<T, ProtoError>
where
    T: Archive,
    T::Archived: for<'a> CheckBytes<HighValidator<'a, rkyv::rancor::Error>>
        + Deserialize<T, rkyv::rancor::Strategy<Pool, rkyv::rancor::Error>>,
{
    rkyv::from_bytes::<T, rkyv::rancor::Error>(bytes).map_err(|e| ProtoError::Decode(e.to_string()))
}
