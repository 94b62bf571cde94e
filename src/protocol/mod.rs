//! Protocol module - wire format and message framing.
//!
//! This module implements the binary protocol:
//! - 20-byte header encoding/decoding
//! - Message assembly into contiguous frames
//! - Exact-read stream decoding with sentinel validation

mod message;
mod wire_format;

pub use message::Message;
pub use wire_format::{
    Header, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE, PROTOCOL_VERSION, START_BYTE,
};
