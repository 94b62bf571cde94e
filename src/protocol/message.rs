//! Message assembly and stream decoding.
//!
//! A [`Message`] is one complete unit of wire exchange: the fixed header
//! followed by four variable-length body fields (call id, service name,
//! method name, payload). Encoding produces a single contiguous buffer;
//! decoding reads exactly one frame from an async stream.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire_format::{Header, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE, START_BYTE};
use crate::error::{Result, WirecallError};

/// A complete protocol message.
///
/// Field lengths in `header` always match the body fields; constructors
/// and [`Message::read_from`] keep them consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Frame header.
    pub header: Header,
    /// Unique call identifier, generated by the client.
    pub call_id: String,
    /// Registered service name.
    pub service_name: String,
    /// Method name within the service.
    pub method_name: String,
    /// Opaque payload bytes (already serialized and compressed).
    pub payload: Bytes,
}

impl Message {
    /// Build a message, deriving the header length fields from the body.
    ///
    /// Fails with [`WirecallError::Protocol`] if any field exceeds the
    /// `u32` range of its header length field.
    pub fn new(
        codec_type: u8,
        compressor_type: u8,
        call_id: String,
        service_name: String,
        method_name: String,
        payload: Bytes,
    ) -> Result<Self> {
        let header = Header::new(
            codec_type,
            compressor_type,
            field_len(call_id.len(), "call id")?,
            field_len(service_name.len(), "service name")?,
            field_len(method_name.len(), "method name")?,
            field_len(payload.len(), "payload")?,
        );
        Ok(Self {
            header,
            call_id,
            service_name,
            method_name,
            payload,
        })
    }

    /// Build the response to a request, reusing its call id, codec and
    /// compressor tags, and echoing the service and method names.
    pub fn response_to(request: &Message, payload: Bytes) -> Result<Self> {
        Self::new(
            request.header.codec_type,
            request.header.compressor_type,
            request.call_id.clone(),
            request.service_name.clone(),
            request.method_name.clone(),
            payload,
        )
    }

    /// Encode the message into a single contiguous frame buffer.
    pub fn encode(&self) -> Bytes {
        debug_assert_eq!(self.header.call_id_len as usize, self.call_id.len());
        debug_assert_eq!(self.header.payload_len as usize, self.payload.len());
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.header.body_len() as usize);
        buf.put_slice(&self.header.encode());
        buf.put_slice(self.call_id.as_bytes());
        buf.put_slice(self.service_name.as_bytes());
        buf.put_slice(self.method_name.as_bytes());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Read exactly one message from the stream.
    ///
    /// Reads one start byte first and fails with
    /// [`WirecallError::Protocol`] on a sentinel mismatch without
    /// consuming anything further; the stream is desynchronized at that
    /// point and the connection must be torn down. A stream that ends
    /// before or inside a frame fails with
    /// [`WirecallError::ConnectionClosed`].
    ///
    /// Each body field is copied into its own owned buffer; no field
    /// aliases the read buffer or another field.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut header_buf = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut header_buf[..1])
            .await
            .map_err(map_read_err)?;
        if header_buf[0] != START_BYTE {
            return Err(WirecallError::Protocol(format!(
                "invalid start byte: {:#04x}",
                header_buf[0]
            )));
        }
        reader
            .read_exact(&mut header_buf[1..])
            .await
            .map_err(map_read_err)?;
        let header = Header::decode(&header_buf)?;
        header.validate(DEFAULT_MAX_FRAME_SIZE)?;

        let mut body = vec![0u8; header.body_len() as usize];
        reader.read_exact(&mut body).await.map_err(map_read_err)?;

        let mut offset = 0;
        let call_id = take_string(&body, &mut offset, header.call_id_len, "call id")?;
        let service_name = take_string(&body, &mut offset, header.service_name_len, "service name")?;
        let method_name = take_string(&body, &mut offset, header.method_name_len, "method name")?;
        let payload = Bytes::copy_from_slice(&body[offset..offset + header.payload_len as usize]);

        Ok(Self {
            header,
            call_id,
            service_name,
            method_name,
            payload,
        })
    }
}

fn field_len(len: usize, field: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| WirecallError::Protocol(format!("{field} length {len} exceeds u32 range")))
}

/// Copy the next `len` bytes out of `body` as an owned UTF-8 string.
fn take_string(body: &[u8], offset: &mut usize, len: u32, field: &str) -> Result<String> {
    let start = *offset;
    let end = start + len as usize;
    *offset = end;
    String::from_utf8(body[start..end].to_vec())
        .map_err(|_| WirecallError::Protocol(format!("invalid UTF-8 in {field}")))
}

fn map_read_err(err: std::io::Error) -> WirecallError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        WirecallError::ConnectionClosed
    } else {
        WirecallError::Io(err)
    }
}
