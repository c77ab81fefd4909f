use bytes::{Bytes, BytesMut};

/// Encodes an application-level message into its wire representation.
///
/// Implementations are the plug-in extension point referenced throughout
/// the peer subsystem as `encode_message`; the frame codec never inspects
/// the encoded bytes, it only wraps them with a header.
pub trait MessageEncoder {
    type Item;
    type Error: std::error::Error + Send + Sync + 'static;

    fn encode(&self, item: Self::Item) -> Result<Bytes, Self::Error>;

    /// Whether an already-encoded frame can have its channel field
    /// rewritten in place (§4.A `recode`) rather than requiring the
    /// original message to be re-encoded once a channel finally frees up.
    /// Defaults to `true`, which holds for any encoder whose output the
    /// frame codec treats as an opaque body sitting behind a
    /// separately-addressable channel field — true of every encoder this
    /// crate ships. Override to `false` for an encoder whose wire
    /// representation ties the channel into the body itself (e.g. a
    /// checksum or signature covering the full frame), which forces
    /// queued requests to be held as unencoded messages and encoded
    /// fresh on dequeue instead.
    fn supports_recoding(&self) -> bool {
        true
    }
}

/// Decodes an application-level message out of the bytes a frame carried.
pub trait MessageDecoder {
    type Item;
    type Error: std::error::Error + Send + Sync + 'static;

    fn decode(&self, bytes: BytesMut) -> Result<Self::Item, Self::Error>;
}
