//! Compression module - bytes-to-bytes payload transforms.
//!
//! Compression runs after serialization on the way out and before
//! deserialization on the way in, selected by the one-byte compressor tag
//! carried in the frame header:
//!
//! - [`GzipCompressor`] (tag 0) - gzip via `flate2`, the default
//! - [`IdentityCompressor`] (tag 1) - no-op pass-through
//!
//! Unlike codecs, compressors are plain bytes-to-bytes transforms, so the
//! registry holds trait objects and callers can register their own
//! implementations under new tags before first use.

mod gzip;

pub use gzip::GzipCompressor;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, WirecallError};

/// Wire tag of the gzip compressor.
pub const GZIP_COMPRESSOR: u8 = 0;

/// Wire tag of the identity (no-op) compressor.
pub const IDENTITY_COMPRESSOR: u8 = 1;

/// A bytes-to-bytes compression strategy.
pub trait Compressor: Send + Sync {
    /// Compress payload bytes.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress payload bytes.
    ///
    /// Fails with [`WirecallError::Decompress`] on corrupt input.
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// No-op compressor returning the input unchanged.
///
/// Useful in tests and for latency-sensitive payloads that do not
/// compress well.
#[derive(Debug, Default)]
pub struct IdentityCompressor;

impl Compressor for IdentityCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Tag-keyed compressor registry, injected into clients and servers.
#[derive(Clone)]
pub struct CompressorRegistry {
    compressors: HashMap<u8, Arc<dyn Compressor>>,
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressorRegistry {
    /// Create a registry with the built-in compressors installed.
    pub fn new() -> Self {
        let mut compressors: HashMap<u8, Arc<dyn Compressor>> = HashMap::new();
        compressors.insert(GZIP_COMPRESSOR, Arc::new(GzipCompressor));
        compressors.insert(IDENTITY_COMPRESSOR, Arc::new(IdentityCompressor));
        Self { compressors }
    }

    /// Bind a compressor to a tag. The last registration for a tag wins.
    pub fn register(&mut self, tag: u8, compressor: Arc<dyn Compressor>) {
        self.compressors.insert(tag, compressor);
    }

    /// Resolve a compressor by tag.
    ///
    /// # Errors
    ///
    /// Returns [`WirecallError::UnsupportedCompressor`] for an unknown
    /// tag.
    pub fn get(&self, tag: u8) -> Result<Arc<dyn Compressor>> {
        self.compressors
            .get(&tag)
            .cloned()
            .ok_or(WirecallError::UnsupportedCompressor(tag))
    }
}

impl std::fmt::Debug for CompressorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<u8> = self.compressors.keys().copied().collect();
        tags.sort_unstable();
        f.debug_struct("CompressorRegistry")
            .field("tags", &tags)
            .finish()
    }
}
