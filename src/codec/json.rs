//! JSON codec using `serde_json`.
//!
//! The default codec (tag 0). Self-describing text format, interoperable
//! with any peer that can produce JSON payloads.
//!
//! # Example
//!
//! ```
//! use wirecall::codec::JsonCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Greeting {
//!     name: String,
//! }
//!
//! let msg = Greeting { name: "cyj".to_string() };
//! let encoded = JsonCodec::encode(&msg).unwrap();
//! let decoded: Greeting = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use crate::error::{Result, WirecallError};

/// JSON codec for structured data.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WirecallError::Encode`] if the value cannot be
    /// serialized (e.g. a map with non-string keys).
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| WirecallError::Encode(e.to_string()))
    }

    /// Decode JSON bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns [`WirecallError::Decode`] if the bytes are not valid JSON
    /// for type `T`.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| WirecallError::Decode(e.to_string()))
    }
}
