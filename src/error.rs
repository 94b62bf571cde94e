//! Error types for wirecall.

use thiserror::Error;

/// Main error type for all wirecall operations.
#[derive(Debug, Error)]
pub enum WirecallError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error (bad start byte, malformed header, oversized frame).
    /// Connection-fatal: the stream is desynchronized and must be torn down.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connection closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Outbound queue closed before the frame could be submitted.
    #[error("send channel is closed")]
    ChannelClosed,

    /// No codec registered under the given tag.
    #[error("unsupported codec type: {0}")]
    UnsupportedCodec(u8),

    /// No compressor registered under the given tag.
    #[error("unsupported compressor type: {0}")]
    UnsupportedCompressor(u8),

    /// Transport factory does not know the given protocol name.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// Payload serialization failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Payload deserialization failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// Payload compression failed.
    #[error("compress error: {0}")]
    Compress(String),

    /// Payload decompression failed on corrupt input.
    #[error("decompress error: {0}")]
    Decompress(String),

    /// Service name is empty or not capitalized.
    #[error("invalid service name: {0:?}")]
    InvalidServiceName(String),

    /// A service with the same name is already registered.
    #[error("service already registered: {0}")]
    ServiceAlreadyRegistered(String),

    /// The service builder produced zero callable methods.
    #[error("service {0} has no exported methods")]
    NoExportedMethods(String),

    /// No registered service matches the requested name.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// The service exists but has no method with the requested name.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Malformed call arguments (empty service or method name).
    #[error("invalid call: {0}")]
    InvalidCall(String),

    /// A method handler reported an application failure.
    #[error("method failed: {0}")]
    Method(#[from] MethodError),

    /// Discovery has no servers to select from.
    #[error("no available servers")]
    NoAvailableServers,

    /// Deadline elapsed before the call completed or the dial succeeded.
    #[error("timed out")]
    Timeout,

    /// HTTP error talking to the registry.
    #[error("registry HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias using WirecallError.
pub type Result<T> = std::result::Result<T, WirecallError>;

/// Error returned by service method handlers.
///
/// Kept separate from [`WirecallError`] so service code reports plain
/// application failures without constructing framework errors. A failed
/// method is logged on the server and the request is dropped; no response
/// reaches the client.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MethodError(pub String);

impl From<&str> for MethodError {
    fn from(msg: &str) -> Self {
        MethodError(msg.to_string())
    }
}

impl From<String> for MethodError {
    fn from(msg: String) -> Self {
        MethodError(msg)
    }
}

/// Result type returned by service method handlers.
pub type MethodResult = std::result::Result<(), MethodError>;
