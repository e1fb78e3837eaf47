//! Actor identities: the addressing unit of a peer channel.

use std::fmt;

use bytes::Bytes;

use crate::codec;
use crate::error::ProtoError;

/// Separator between the type and name components of an identity key.
pub const KEY_SEPARATOR: char = '#';

/// A logical endpoint: a `(type, name)` pair.
///
/// Both sides of a channel describe themselves with one of these during the
/// handshake. The derived key `"type#name"` is what outbound sends are
/// checked against; two identities are equal exactly when their keys are.
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct ActorIdentity {
    /// The actor type, e.g. `"matcher"`.
    pub actor_type: String,
    /// The instance name within the type, e.g. `"matcher-eu-1"`.
    pub actor_name: String,
}

impl ActorIdentity {
    pub fn new(actor_type: impl Into<String>, actor_name: impl Into<String>) -> Self {
        Self {
            actor_type: actor_type.into(),
            actor_name: actor_name.into(),
        }
    }

    /// The composed `"type#name"` key.
    pub fn key(&self) -> String {
        format!("{}{}{}", self.actor_type, KEY_SEPARATOR, self.actor_name)
    }

    /// True when both components are empty.
    ///
    /// An empty identity in a Welcome payload fails the handshake: a peer
    /// that cannot say who it is cannot be addressed.
    pub fn is_empty(&self) -> bool {
        self.actor_type.is_empty() && self.actor_name.is_empty()
    }

    /// Serialize for transmission in a Hello/Welcome payload.
    pub fn encode(&self) -> Result<Bytes, ProtoError> {
        codec::encode(self)
    }

    /// Deserialize from a Hello/Welcome payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        codec::decode(bytes)
    }
}

impl fmt::Display for ActorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.actor_type, KEY_SEPARATOR, self.actor_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let id = ActorIdentity::new("matcher", "eu-1");
        assert_eq!(id.key(), "matcher#eu-1");
        assert_eq!(id.to_string(), "matcher#eu-1");
    }

    #[test]
    fn test_equality_is_by_fields() {
        let a = ActorIdentity::new("a", "1");
        let b = ActorIdentity::new("a", "1");
        let c = ActorIdentity::new("a", "2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_roundtrip() {
        let id = ActorIdentity::new("gateway", "gw-west-2");
        let encoded = id.encode().expect("encode failed");
        let decoded = ActorIdentity::decode(&encoded).expect("decode failed");
        assert_eq!(decoded, id);
    }

    #[test]
    fn test_roundtrip_unicode() {
        let id = ActorIdentity::new("ワーカー", "вест-1");
        let encoded = id.encode().expect("encode failed");
        let decoded = ActorIdentity::decode(&encoded).expect("decode failed");
        assert_eq!(decoded, id);
    }

    #[test]
    fn test_roundtrip_empty() {
        let id = ActorIdentity::new("", "");
        assert!(id.is_empty());
        let encoded = id.encode().expect("encode failed");
        let decoded = ActorIdentity::decode(&encoded).expect("decode failed");
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_half_empty_is_not_empty() {
        assert!(!ActorIdentity::new("a", "").is_empty());
        assert!(!ActorIdentity::new("", "1").is_empty());
    }
}
