//! Payload codecs.
//!
//! The raw transport only moves opaque [`Bytes`] per channel name. A codec turns
//! a channel's typed payload into those bytes on `send` and back again in the
//! aggregated raw listener, once per inbound event. Both ends of a channel must
//! agree on the codec.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

pub trait Codec: Send + Sync + std::fmt::Debug + 'static {
    fn encode<P: Serialize>(&self, payload: &P) -> Result<Bytes>;

    /// Fails with [`IpcError::Serialization`](crate::IpcError::Serialization) when the bytes do not hold a `P`.
    fn decode<P: DeserializeOwned>(&self, raw: &[u8]) -> Result<P>;
}

/// Compact binary payloads. Used unless a multiplexer is built `with_codec`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<P: Serialize>(&self, payload: &P) -> Result<Bytes> {
        bincode::serialize(payload).map(Bytes::from).map_err(Into::into)
    }

    fn decode<P: DeserializeOwned>(&self, raw: &[u8]) -> Result<P> {
        bincode::deserialize(raw).map_err(Into::into)
    }
}

/// JSON payloads, for renderer code that posts plain objects on the channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<P: Serialize>(&self, payload: &P) -> Result<Bytes> {
        serde_json::to_vec(payload).map(Bytes::from).map_err(Into::into)
    }

    fn decode<P: DeserializeOwned>(&self, raw: &[u8]) -> Result<P> {
        serde_json::from_slice(raw).map_err(Into::into)
    }
}
