//! A `flate2`-backed [`Compressor`](crate::traits::Compressor), gated
//! behind the `compression` feature so consumers who never configure a
//! compressor don't pay for `flate2`.

use crate::traits::compression::{Compress, Decompress};
use bytes::Bytes;
use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use std::io::Read;

/// Gzip compression at a configurable level, with an advisory
/// `should_compress` threshold below which the framing layer skips
/// compressing a body at all (§6: "the advisory predicate permits
/// skipping compression for bodies not worth compressing").
#[derive(Debug, Clone)]
pub struct GzipCompressor {
    level: Compression,
    min_size: usize,
}

impl GzipCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level);
        self
    }

    /// Bodies shorter than this are passed through uncompressed; gzip's
    /// fixed header overhead makes compressing them a net loss.
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
            min_size: 64,
        }
    }
}

impl Compress for GzipCompressor {
    fn compress(&self, bytes: Bytes) -> anyhow::Result<Bytes> {
        let mut encoder = GzEncoder::new(&bytes[..], self.level);
        let mut out = Vec::new();
        encoder.read_to_end(&mut out)?;
        Ok(Bytes::from(out))
    }

    fn should_compress(&self, bytes: &Bytes) -> bool {
        bytes.len() >= self.min_size
    }
}

impl Decompress for GzipCompressor {
    fn decompress(&self, bytes: Bytes) -> anyhow::Result<Bytes> {
        let mut decoder = GzDecoder::new(&bytes[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(Bytes::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_gzip() {
        let compressor = GzipCompressor::new();
        let body = Bytes::from(vec![b'x'; 4096]);

        let compressed = compressor.compress(body.clone()).unwrap();
        assert_ne!(compressed, body);

        let decompressed = compressor.decompress(compressed).unwrap();
        assert_eq!(decompressed, body);
    }

    #[test]
    fn small_bodies_are_not_worth_compressing() {
        let compressor = GzipCompressor::new().with_min_size(64);
        assert!(!compressor.should_compress(&Bytes::from_static(b"short")));
        assert!(compressor.should_compress(&Bytes::from(vec![0u8; 128])));
    }
}
