//! Byte codec - pass-through for binary payloads.
//!
//! Used when the payload is already serialized or is raw bytes. The codec
//! is a minimal serde format over a flat byte buffer: byte-shaped values
//! (`Vec<u8>`, `serde_bytes` wrappers, strings) pass through unchanged,
//! anything structured is rejected at encode time.
//!
//! # Example
//!
//! ```
//! use wirecall::codec::ByteCodec;
//!
//! let data: Vec<u8> = vec![0x01, 0x02, 0x03];
//! let encoded = ByteCodec::encode(&data).unwrap();
//! assert_eq!(encoded, data);
//!
//! let decoded: Vec<u8> = ByteCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, data);
//! ```

use serde::de::{DeserializeSeed, IntoDeserializer, SeqAccess, Visitor};
use serde::ser::Impossible;
use serde::Serialize;

use crate::error::{Result, WirecallError};

/// Byte codec that passes payload bytes through without transformation.
pub struct ByteCodec;

impl ByteCodec {
    /// Encode a byte-shaped value.
    ///
    /// # Errors
    ///
    /// Returns [`WirecallError::Encode`] for any value that is not a byte
    /// buffer or string.
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        value.serialize(ByteSerializer)
    }

    /// Decode payload bytes back into a byte buffer or string.
    ///
    /// # Errors
    ///
    /// Returns [`WirecallError::Decode`] if `T` is not byte-shaped, or if
    /// `T` is a string and the payload is not valid UTF-8.
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        T::deserialize(ByteDeserializer { input: bytes })
    }
}

impl serde::ser::Error for WirecallError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        WirecallError::Encode(msg.to_string())
    }
}

impl serde::de::Error for WirecallError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        WirecallError::Decode(msg.to_string())
    }
}

fn not_bytes(kind: &str) -> WirecallError {
    WirecallError::Encode(format!("byte codec cannot encode {kind}"))
}

/// Serializer accepting only byte-shaped top-level values.
struct ByteSerializer;

impl serde::Serializer for ByteSerializer {
    type Ok = Vec<u8>;
    type Error = WirecallError;
    type SerializeSeq = ByteSeq;
    type SerializeTuple = Impossible<Vec<u8>, WirecallError>;
    type SerializeTupleStruct = Impossible<Vec<u8>, WirecallError>;
    type SerializeTupleVariant = Impossible<Vec<u8>, WirecallError>;
    type SerializeMap = Impossible<Vec<u8>, WirecallError>;
    type SerializeStruct = Impossible<Vec<u8>, WirecallError>;
    type SerializeStructVariant = Impossible<Vec<u8>, WirecallError>;

    fn serialize_bytes(self, v: &[u8]) -> Result<Vec<u8>> {
        Ok(v.to_vec())
    }

    fn serialize_str(self, v: &str) -> Result<Vec<u8>> {
        Ok(v.as_bytes().to_vec())
    }

    /// Byte slices and vectors reach the serializer as sequences of `u8`.
    fn serialize_seq(self, len: Option<usize>) -> Result<ByteSeq> {
        Ok(ByteSeq {
            buf: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Vec<u8>> {
        value.serialize(self)
    }

    fn serialize_bool(self, _: bool) -> Result<Vec<u8>> {
        Err(not_bytes("bool"))
    }
    fn serialize_i8(self, _: i8) -> Result<Vec<u8>> {
        Err(not_bytes("i8"))
    }
    fn serialize_i16(self, _: i16) -> Result<Vec<u8>> {
        Err(not_bytes("i16"))
    }
    fn serialize_i32(self, _: i32) -> Result<Vec<u8>> {
        Err(not_bytes("i32"))
    }
    fn serialize_i64(self, _: i64) -> Result<Vec<u8>> {
        Err(not_bytes("i64"))
    }
    fn serialize_u8(self, _: u8) -> Result<Vec<u8>> {
        Err(not_bytes("u8"))
    }
    fn serialize_u16(self, _: u16) -> Result<Vec<u8>> {
        Err(not_bytes("u16"))
    }
    fn serialize_u32(self, _: u32) -> Result<Vec<u8>> {
        Err(not_bytes("u32"))
    }
    fn serialize_u64(self, _: u64) -> Result<Vec<u8>> {
        Err(not_bytes("u64"))
    }
    fn serialize_f32(self, _: f32) -> Result<Vec<u8>> {
        Err(not_bytes("f32"))
    }
    fn serialize_f64(self, _: f64) -> Result<Vec<u8>> {
        Err(not_bytes("f64"))
    }
    fn serialize_char(self, _: char) -> Result<Vec<u8>> {
        Err(not_bytes("char"))
    }
    fn serialize_none(self) -> Result<Vec<u8>> {
        Err(not_bytes("option"))
    }
    fn serialize_some<T: ?Sized + Serialize>(self, _: &T) -> Result<Vec<u8>> {
        Err(not_bytes("option"))
    }
    fn serialize_unit(self) -> Result<Vec<u8>> {
        Err(not_bytes("unit"))
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<Vec<u8>> {
        Err(not_bytes("unit struct"))
    }
    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<Vec<u8>> {
        Err(not_bytes("enum"))
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<Vec<u8>> {
        Err(not_bytes("enum"))
    }
    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple> {
        Err(not_bytes("tuple"))
    }
    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self::SerializeTupleStruct> {
        Err(not_bytes("tuple struct"))
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(not_bytes("enum"))
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap> {
        Err(not_bytes("map"))
    }
    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self::SerializeStruct> {
        Err(not_bytes("struct"))
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(not_bytes("enum"))
    }
}

/// Sequence serializer collecting `u8` elements into the output buffer.
struct ByteSeq {
    buf: Vec<u8>,
}

impl serde::ser::SerializeSeq for ByteSeq {
    type Ok = Vec<u8>;
    type Error = WirecallError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.buf.push(value.serialize(ElementSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Vec<u8>> {
        Ok(self.buf)
    }
}

/// Serializer for sequence elements; only `u8` is accepted.
struct ElementSerializer;

impl serde::Serializer for ElementSerializer {
    type Ok = u8;
    type Error = WirecallError;
    type SerializeSeq = Impossible<u8, WirecallError>;
    type SerializeTuple = Impossible<u8, WirecallError>;
    type SerializeTupleStruct = Impossible<u8, WirecallError>;
    type SerializeTupleVariant = Impossible<u8, WirecallError>;
    type SerializeMap = Impossible<u8, WirecallError>;
    type SerializeStruct = Impossible<u8, WirecallError>;
    type SerializeStructVariant = Impossible<u8, WirecallError>;

    fn serialize_u8(self, v: u8) -> Result<u8> {
        Ok(v)
    }

    fn serialize_bool(self, _: bool) -> Result<u8> {
        Err(not_bytes("sequence of bool"))
    }
    fn serialize_i8(self, _: i8) -> Result<u8> {
        Err(not_bytes("sequence of i8"))
    }
    fn serialize_i16(self, _: i16) -> Result<u8> {
        Err(not_bytes("sequence of i16"))
    }
    fn serialize_i32(self, _: i32) -> Result<u8> {
        Err(not_bytes("sequence of i32"))
    }
    fn serialize_i64(self, _: i64) -> Result<u8> {
        Err(not_bytes("sequence of i64"))
    }
    fn serialize_u16(self, _: u16) -> Result<u8> {
        Err(not_bytes("sequence of u16"))
    }
    fn serialize_u32(self, _: u32) -> Result<u8> {
        Err(not_bytes("sequence of u32"))
    }
    fn serialize_u64(self, _: u64) -> Result<u8> {
        Err(not_bytes("sequence of u64"))
    }
    fn serialize_f32(self, _: f32) -> Result<u8> {
        Err(not_bytes("sequence of f32"))
    }
    fn serialize_f64(self, _: f64) -> Result<u8> {
        Err(not_bytes("sequence of f64"))
    }
    fn serialize_char(self, _: char) -> Result<u8> {
        Err(not_bytes("sequence of char"))
    }
    fn serialize_str(self, _: &str) -> Result<u8> {
        Err(not_bytes("sequence of str"))
    }
    fn serialize_bytes(self, _: &[u8]) -> Result<u8> {
        Err(not_bytes("sequence of bytes"))
    }
    fn serialize_none(self) -> Result<u8> {
        Err(not_bytes("sequence of option"))
    }
    fn serialize_some<T: ?Sized + Serialize>(self, _: &T) -> Result<u8> {
        Err(not_bytes("sequence of option"))
    }
    fn serialize_unit(self) -> Result<u8> {
        Err(not_bytes("sequence of unit"))
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<u8> {
        Err(not_bytes("sequence of unit struct"))
    }
    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Result<u8> {
        Err(not_bytes("sequence of enum"))
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<u8> {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<u8> {
        Err(not_bytes("sequence of enum"))
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(not_bytes("nested sequence"))
    }
    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple> {
        Err(not_bytes("sequence of tuple"))
    }
    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self::SerializeTupleStruct> {
        Err(not_bytes("sequence of tuple struct"))
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(not_bytes("sequence of enum"))
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap> {
        Err(not_bytes("sequence of map"))
    }
    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self::SerializeStruct> {
        Err(not_bytes("sequence of struct"))
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(not_bytes("sequence of enum"))
    }
}

/// Deserializer handing the payload back as bytes, a byte sequence, or a
/// UTF-8 string, depending on what the target type asks for.
struct ByteDeserializer<'de> {
    input: &'de [u8],
}

impl<'de> serde::Deserializer<'de> for ByteDeserializer<'de> {
    type Error = WirecallError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(self.input.to_vec())
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_bytes(self.input)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(self.input.to_vec())
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match std::str::from_utf8(self.input) {
            Ok(s) => visitor.visit_str(s),
            Err(_) => Err(WirecallError::Decode(
                "byte payload is not valid UTF-8".to_string(),
            )),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(ByteSeqAccess {
            iter: self.input.iter(),
        })
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char
        option unit unit_struct tuple tuple_struct map struct enum
        identifier ignored_any
    }
}

struct ByteSeqAccess<'de> {
    iter: std::slice::Iter<'de, u8>,
}

impl<'de> SeqAccess<'de> for ByteSeqAccess<'de> {
    type Error = WirecallError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        match self.iter.next() {
            Some(&b) => seed.deserialize(b.into_deserializer()).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_round_trip() {
        let original: Vec<u8> = vec![0x00, 0x01, 0xFE, 0xFF];
        let encoded = ByteCodec::encode(&original).unwrap();
        assert_eq!(encoded, original);

        let decoded: Vec<u8> = ByteCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_all_byte_values_preserved() {
        let all_bytes: Vec<u8> = (0..=255).collect();
        let encoded = ByteCodec::encode(&all_bytes).unwrap();
        let decoded: Vec<u8> = ByteCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, all_bytes);
    }

    #[test]
    fn test_empty_payload() {
        let empty: Vec<u8> = Vec::new();
        let encoded = ByteCodec::encode(&empty).unwrap();
        assert!(encoded.is_empty());
        let decoded: Vec<u8> = ByteCodec::decode(&encoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_serde_bytes_wrappers() {
        let data = vec![0x01u8, 0x02, 0x03, 0x04, 0x05];
        let encoded = ByteCodec::encode(&serde_bytes::Bytes::new(&data)).unwrap();
        assert_eq!(encoded, data);

        let decoded: serde_bytes::ByteBuf = ByteCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.as_ref(), &data[..]);
    }

    #[test]
    fn test_string_round_trip() {
        let text = "hello bytes".to_string();
        let encoded = ByteCodec::encode(&text).unwrap();
        assert_eq!(encoded, text.as_bytes());

        let decoded: String = ByteCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn test_string_decode_rejects_invalid_utf8() {
        let result: Result<String> = ByteCodec::decode(&[0xFF, 0xFE]);
        assert!(matches!(result, Err(WirecallError::Decode(_))));
    }

    #[test]
    fn test_structured_value_rejected() {
        #[derive(serde::Serialize)]
        struct Structured {
            id: u32,
        }

        let result = ByteCodec::encode(&Structured { id: 1 });
        assert!(matches!(result, Err(WirecallError::Encode(_))));

        let result = ByteCodec::encode(&42u64);
        assert!(matches!(result, Err(WirecallError::Encode(_))));
    }

    #[test]
    fn test_non_byte_sequence_rejected() {
        let words = vec!["a", "b"];
        let result = ByteCodec::encode(&words);
        assert!(matches!(result, Err(WirecallError::Encode(_))));
    }
}
