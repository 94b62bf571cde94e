//! Codec module - serialization/deserialization for payloads.
//!
//! Payloads are serialized before compression and selected at runtime by
//! the one-byte codec tag carried in the frame header:
//!
//! - [`JsonCodec`] (tag 0) - JSON via `serde_json`, the default
//! - [`ByteCodec`] (tag 1) - pass-through for raw byte payloads
//! - [`MsgPackCodec`] (tag 2) - MessagePack via `rmp-serde`
//!
//! # Design
//!
//! Individual codecs are marker structs with static generic methods;
//! [`Codec`] is the tag-dispatched handle that call sites resolve at
//! runtime through a [`CodecRegistry`]. A registry is constructed once
//! with the built-ins, optionally re-mapped via
//! [`CodecRegistry::register`] before first use, and injected into
//! clients and servers at construction time. There is no global registry,
//! so tests and embedders stay isolated from each other.
//!
//! # Example
//!
//! ```
//! use wirecall::codec::{Codec, CodecRegistry, JSON_CODEC};
//!
//! let registry = CodecRegistry::new();
//! let codec = registry.get(JSON_CODEC).unwrap();
//! let bytes = codec.encode(&"hello").unwrap();
//! let text: String = codec.decode(&bytes).unwrap();
//! assert_eq!(text, "hello");
//! ```

mod byte;
mod json;
mod msgpack;

pub use byte::ByteCodec;
pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use std::collections::HashMap;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Result, WirecallError};

/// Wire tag of the JSON codec.
pub const JSON_CODEC: u8 = 0;

/// Wire tag of the byte pass-through codec.
pub const BYTE_CODEC: u8 = 1;

/// Wire tag of the MessagePack codec.
pub const MSGPACK_CODEC: u8 = 2;

/// A serialization strategy, selected by the header's codec tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// JSON via `serde_json`.
    Json,
    /// Raw byte pass-through.
    Byte,
    /// MessagePack via `rmp-serde`.
    MsgPack,
}

impl Codec {
    /// Serialize a value to payload bytes.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Json => JsonCodec::encode(value),
            Codec::Byte => ByteCodec::encode(value),
            Codec::MsgPack => MsgPackCodec::encode(value),
        }
    }

    /// Deserialize payload bytes into a value.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Codec::Json => JsonCodec::decode(bytes),
            Codec::Byte => ByteCodec::decode(bytes),
            Codec::MsgPack => MsgPackCodec::decode(bytes),
        }
    }
}

/// Tag-keyed codec registry, injected into clients and servers.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: HashMap<u8, Codec>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecRegistry {
    /// Create a registry with the built-in codecs installed.
    pub fn new() -> Self {
        let mut codecs = HashMap::new();
        codecs.insert(JSON_CODEC, Codec::Json);
        codecs.insert(BYTE_CODEC, Codec::Byte);
        codecs.insert(MSGPACK_CODEC, Codec::MsgPack);
        Self { codecs }
    }

    /// Bind a codec to a tag. The last registration for a tag wins.
    pub fn register(&mut self, tag: u8, codec: Codec) {
        self.codecs.insert(tag, codec);
    }

    /// Resolve a codec by tag.
    ///
    /// # Errors
    ///
    /// Returns [`WirecallError::UnsupportedCodec`] for an unknown tag.
    pub fn get(&self, tag: u8) -> Result<Codec> {
        self.codecs
            .get(&tag)
            .copied()
            .ok_or(WirecallError::UnsupportedCodec(tag))
    }
}
