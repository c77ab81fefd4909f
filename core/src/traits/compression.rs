use bytes::Bytes;

/// Compresses an already-encoded frame body.
pub trait Compress {
    fn compress(&self, bytes: Bytes) -> anyhow::Result<Bytes>;

    /// Advisory predicate: permits skipping compression for bodies that
    /// aren't worth the CPU, e.g. ones already below a size threshold.
    fn should_compress(&self, bytes: &Bytes) -> bool {
        !bytes.is_empty()
    }
}

/// Decompresses a frame body that was flagged as compressed on the wire.
pub trait Decompress {
    fn decompress(&self, bytes: Bytes) -> anyhow::Result<Bytes>;
}

/// A compressor that both `encode` and `decode` can share; most
/// implementations (like [`GzipCompressor`]) implement both halves on the
/// same type.
pub trait Compressor: Compress + Decompress + Send + Sync {}

impl<T> Compressor for T where T: Compress + Decompress + Send + Sync {}
