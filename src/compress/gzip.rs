//! Gzip compressor using `flate2`.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::Compressor;
use crate::error::{Result, WirecallError};

/// Gzip compressor (tag 0, the default).
#[derive(Debug, Default)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .map_err(|e| WirecallError::Compress(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| WirecallError::Decompress(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let data = b"hello hello hello hello hello hello".repeat(10);
        let gzip = GzipCompressor;

        let compressed = gzip.compress(&data).unwrap();
        assert_ne!(compressed, data);

        let decompressed = gzip.decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_repetitive_data_shrinks() {
        let data = vec![0x42u8; 4096];
        let compressed = GzipCompressor.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
    }

    #[test]
    fn test_empty_input_round_trip() {
        let gzip = GzipCompressor;
        let compressed = gzip.compress(b"").unwrap();
        let decompressed = gzip.decompress(&compressed).unwrap();
        assert!(decompressed.is_empty());
    }

    #[test]
    fn test_corrupt_input_fails_decompress() {
        let result = GzipCompressor.decompress(b"definitely not gzip");
        assert!(matches!(result, Err(WirecallError::Decompress(_))));
    }

    #[test]
    fn test_truncated_stream_fails_decompress() {
        let data = b"some payload that compresses".repeat(8);
        let compressed = GzipCompressor.compress(&data).unwrap();
        let truncated = &compressed[..compressed.len() / 2];
        let result = GzipCompressor.decompress(truncated);
        assert!(matches!(result, Err(WirecallError::Decompress(_))));
    }
}
