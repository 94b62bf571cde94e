//! MessagePack codec using `rmp-serde`.
//!
//! Structs are serialized as maps (`to_vec_named`) rather than positional
//! arrays, so peers can tolerate field reordering and schema growth the
//! same way they do with JSON.
//!
//! # Example
//!
//! ```
//! use wirecall::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     id: u32,
//!     content: String,
//! }
//!
//! let msg = Message { id: 42, content: "hello".to_string() };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: Message = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use crate::error::{Result, WirecallError};

/// MessagePack codec for structured data.
///
/// Compact binary alternative to the JSON codec; same self-describing
/// struct-as-map layout, roughly half the bytes for typical payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MessagePack bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WirecallError::Encode`] if the value cannot be
    /// serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| WirecallError::Encode(e.to_string()))
    }

    /// Decode MessagePack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns [`WirecallError::Decode`] if the bytes cannot be
    /// deserialized to type `T`.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes).map_err(|e| WirecallError::Decode(e.to_string()))
    }
}
