//! Wire format encoding and decoding.
//!
//! Implements the 20-byte header format:
//! ```text
//! ┌───────┬─────────┬───────┬──────────┬───────────┬────────────┬───────────┬───────────┐
//! │ Start │ Version │ Codec │ Compress │ CallIdLen │ ServiceLen │ MethodLen │PayloadLen │
//! │ 1 byte│ 1 byte  │ 1 byte│ 1 byte   │ 4 bytes   │ 4 bytes    │ 4 bytes   │ 4 bytes   │
//! │ =0x03 │         │  tag  │   tag    │ uint32 BE │ uint32 BE  │ uint32 BE │ uint32 BE │
//! └───────┴─────────┴───────┴──────────┴───────────┴────────────┴───────────┴───────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. The start byte is a fixed
//! sentinel; a mismatch means the stream is desynchronized and the
//! connection must be torn down rather than retried.

use crate::error::{Result, WirecallError};

/// Header size in bytes (fixed, exactly 20, start byte included).
pub const HEADER_SIZE: usize = 20;

/// Sentinel value of the first byte of every frame.
pub const START_BYTE: u8 = 0x03;

/// Current protocol version, carried in the second header byte.
pub const PROTOCOL_VERSION: u8 = 1;

/// Default maximum combined body size (1 GiB).
///
/// The four length fields are attacker-controlled; frames claiming more
/// than this are rejected before any allocation happens.
pub const DEFAULT_MAX_FRAME_SIZE: u64 = 1_073_741_824;

/// Decoded header from wire format.
///
/// The start sentinel is not stored; [`Header::encode`] writes it and
/// [`Header::decode`] rejects buffers that do not begin with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version.
    pub version: u8,
    /// Serialization codec tag (see `codec` module for built-ins).
    pub codec_type: u8,
    /// Compression tag (see `compress` module for built-ins).
    pub compressor_type: u8,
    /// Call id length in bytes.
    pub call_id_len: u32,
    /// Service name length in bytes.
    pub service_name_len: u32,
    /// Method name length in bytes.
    pub method_name_len: u32,
    /// Payload length in bytes.
    pub payload_len: u32,
}

impl Header {
    /// Create a new header at the current protocol version.
    pub fn new(
        codec_type: u8,
        compressor_type: u8,
        call_id_len: u32,
        service_name_len: u32,
        method_name_len: u32,
        payload_len: u32,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            codec_type,
            compressor_type,
            call_id_len,
            service_name_len,
            method_name_len,
            payload_len,
        }
    }

    /// Encode header to bytes (Big Endian), start sentinel included.
    ///
    /// # Example
    ///
    /// ```
    /// use wirecall::protocol::{Header, HEADER_SIZE, START_BYTE};
    ///
    /// let header = Header::new(0, 0, 36, 10, 5, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// assert_eq!(bytes[0], START_BYTE);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = START_BYTE;
        buf[1] = self.version;
        buf[2] = self.codec_type;
        buf[3] = self.compressor_type;
        buf[4..8].copy_from_slice(&self.call_id_len.to_be_bytes());
        buf[8..12].copy_from_slice(&self.service_name_len.to_be_bytes());
        buf[12..16].copy_from_slice(&self.method_name_len.to_be_bytes());
        buf[16..20].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Fails with [`WirecallError::Protocol`] if the buffer is shorter
    /// than [`HEADER_SIZE`] or does not begin with [`START_BYTE`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(WirecallError::Protocol(format!(
                "header too short: {} bytes, need {}",
                buf.len(),
                HEADER_SIZE
            )));
        }
        if buf[0] != START_BYTE {
            return Err(WirecallError::Protocol(format!(
                "invalid start byte: {:#04x}",
                buf[0]
            )));
        }
        Ok(Self {
            version: buf[1],
            codec_type: buf[2],
            compressor_type: buf[3],
            call_id_len: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            service_name_len: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            method_name_len: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            payload_len: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
        })
    }

    /// Combined body size declared by the four length fields.
    ///
    /// Computed in `u64` because the sum of four `u32` fields can exceed
    /// `u32::MAX`.
    #[inline]
    pub fn body_len(&self) -> u64 {
        self.call_id_len as u64
            + self.service_name_len as u64
            + self.method_name_len as u64
            + self.payload_len as u64
    }

    /// Validate the declared body size against a frame size limit.
    pub fn validate(&self, max_frame_size: u64) -> Result<()> {
        let body = self.body_len();
        if body > max_frame_size {
            return Err(WirecallError::Protocol(format!(
                "frame body size {} exceeds maximum {}",
                body, max_frame_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(0, 1, 36, 10, 5, 100);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header {
            version: 0x01,
            codec_type: 0x02,
            compressor_type: 0x04,
            call_id_len: 0x05060708,
            service_name_len: 0x090A0B0C,
            method_name_len: 0x0D0E0F10,
            payload_len: 0x11121314,
        };
        let bytes = header.encode();

        assert_eq!(bytes[0], START_BYTE);
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes[2], 0x02);
        assert_eq!(bytes[3], 0x04);

        // Call id length: 0x05060708 in BE
        assert_eq!(&bytes[4..8], &[0x05, 0x06, 0x07, 0x08]);
        // Service name length: 0x090A0B0C in BE
        assert_eq!(&bytes[8..12], &[0x09, 0x0A, 0x0B, 0x0C]);
        // Method name length: 0x0D0E0F10 in BE
        assert_eq!(&bytes[12..16], &[0x0D, 0x0E, 0x0F, 0x10]);
        // Payload length: 0x11121314 in BE
        assert_eq!(&bytes[16..20], &[0x11, 0x12, 0x13, 0x14]);
    }

    #[test]
    fn test_header_size_is_exactly_20() {
        assert_eq!(HEADER_SIZE, 20);
        let header = Header::new(0, 0, 0, 0, 0, 0);
        assert_eq!(header.encode().len(), 20);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [START_BYTE; HEADER_SIZE - 1];
        let err = Header::decode(&buf).unwrap_err();
        assert!(matches!(err, WirecallError::Protocol(_)));
    }

    #[test]
    fn test_decode_rejects_bad_start_byte() {
        let mut buf = Header::new(0, 0, 1, 1, 1, 1).encode();
        buf[0] = 0x07;
        let err = Header::decode(&buf).unwrap_err();
        assert!(err.to_string().contains("invalid start byte"));
    }

    #[test]
    fn test_zero_length_fields_are_valid() {
        let header = Header::new(0, 0, 0, 0, 0, 0);
        let decoded = Header::decode(&header.encode()).unwrap();
        assert_eq!(decoded.body_len(), 0);
        assert!(decoded.validate(DEFAULT_MAX_FRAME_SIZE).is_ok());
    }

    #[test]
    fn test_body_len_sums_without_overflow() {
        let header = Header::new(0, 0, u32::MAX, u32::MAX, u32::MAX, u32::MAX);
        assert_eq!(header.body_len(), 4 * u32::MAX as u64);
    }

    #[test]
    fn test_validate_oversized_body() {
        let header = Header::new(0, 0, 36, 10, 5, u32::MAX);
        let result = header.validate(1024);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));

        let small = Header::new(0, 0, 36, 10, 5, 100);
        assert!(small.validate(1024).is_ok());
    }

    #[test]
    fn test_new_sets_current_version() {
        let header = Header::new(0, 0, 1, 1, 1, 1);
        assert_eq!(header.version, PROTOCOL_VERSION);
    }
}
