//! The `tokio_util::codec` `Encoder`/`Decoder` halves driving the frame
//! state machine described in §4.A: `NeedHeader -> NeedBody -> Complete`.
//!
//! Encoding and decoding are split into two independent types —
//! [`FrameEncoder`] and [`FrameDecoder`] — rather than one combined
//! codec. A connection's read half and write half are driven by separate
//! tasks in practice (§5: the read loop vs. whichever task calls
//! `send_message`), so there's no shared mutable state to protect by
//! forcing them into one type; `tokio_util::codec::FramedRead` and
//! `FramedWrite` are happy to take different codec types on each half.
//! The opaque decode state machine lives as a private field on
//! `FrameDecoder`, carried across calls until a complete frame lands.

use crate::frame::{self, FrameHeader, HEADER_LEN_V1, HEADER_LEN_V2};
use bytes::{Bytes, BytesMut};
use chanmux_core::error::CodecError;
use chanmux_core::traits::{Compressor, MessageDecoder, MessageEncoder};
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

/// A body this large is almost certainly a corrupt length field rather
/// than a legitimate payload; reject it before allocating (§6 table:
/// `max_frame_body_len`).
pub const DEFAULT_MAX_FRAME_BODY_LEN: u32 = 16 * 1024 * 1024;

/// Frames outbound messages. Not `Clone` — encoding is stateless between
/// calls, but a single instance is still meant to be owned by one writer
/// (directly, or behind a `parking_lot::Mutex` when several callers write
/// concurrently, as `ClientPeer` does).
pub struct FrameEncoder<Enc> {
    encoder: Enc,
    compressor: Option<Arc<dyn Compressor>>,
    max_frame_body_len: u32,
}

impl<Enc> FrameEncoder<Enc> {
    pub fn new(encoder: Enc) -> Self {
        Self {
            encoder,
            compressor: None,
            max_frame_body_len: DEFAULT_MAX_FRAME_BODY_LEN,
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn with_max_frame_body_len(mut self, max_frame_body_len: u32) -> Self {
        self.max_frame_body_len = max_frame_body_len;
        self
    }
}

impl<Enc> FrameEncoder<Enc>
where
    Enc: MessageEncoder,
{
    /// Whether a frame this encoder produced can have its channel field
    /// rewritten in place via [`crate::frame::recode`] rather than being
    /// re-derived from the original message (§4.A `supports_recoding`).
    /// Delegates to the wrapped message encoder — the frame header's
    /// channel field is always rewritable on its own, so the only way
    /// recoding can be unsafe is if the message encoder itself folds the
    /// channel into the body.
    pub fn supports_recoding(&self) -> bool {
        self.encoder.supports_recoding()
    }
}

impl<Enc> Encoder<(Enc::Item, u16)> for FrameEncoder<Enc>
where
    Enc: MessageEncoder,
{
    type Error = CodecError;

    fn encode(
        &mut self,
        (item, channel): (Enc::Item, u16),
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        let mut body = self
            .encoder
            .encode(item)
            .map_err(|e| CodecError::EncodeFailure(e.into()))?;

        let mut compressed = false;
        if let Some(compressor) = self.compressor.as_ref() {
            if compressor.should_compress(&body) {
                body = compressor
                    .compress(body)
                    .map_err(CodecError::CompressFailure)?;
                compressed = true;
            }
        }

        if body.len() as u64 > self.max_frame_body_len as u64 {
            return Err(CodecError::BodyTooLarge(
                body.len() as u32,
                self.max_frame_body_len,
            ));
        }

        frame::encode_v2(dst, channel, compressed, &body);
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum DecodeState {
    NeedHeader,
    NeedBody(FrameHeader),
}

/// Decodes inbound frames, driving the `NeedHeader -> NeedBody ->
/// Complete` state machine across as many partial reads as it takes.
pub struct FrameDecoder<Dec> {
    decoder: Dec,
    compressor: Option<Arc<dyn Compressor>>,
    max_frame_body_len: u32,
    state: DecodeState,
}

impl<Dec> FrameDecoder<Dec> {
    pub fn new(decoder: Dec) -> Self {
        Self {
            decoder,
            compressor: None,
            max_frame_body_len: DEFAULT_MAX_FRAME_BODY_LEN,
            state: DecodeState::NeedHeader,
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn with_max_frame_body_len(mut self, max_frame_body_len: u32) -> Self {
        self.max_frame_body_len = max_frame_body_len;
        self
    }
}

impl<Dec> Decoder for FrameDecoder<Dec>
where
    Dec: MessageDecoder,
{
    type Item = (Dec::Item, u16);
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state.clone() {
                DecodeState::NeedHeader => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let version = src[0];
                    let header_len = frame::header_len_for_version(version)?;
                    debug_assert!(header_len == HEADER_LEN_V1 || header_len == HEADER_LEN_V2);

                    if src.len() < header_len {
                        return Ok(None);
                    }

                    let header = frame::parse_header(src)?;

                    if header.body_len > self.max_frame_body_len {
                        self.state = DecodeState::NeedHeader;
                        return Err(CodecError::BodyTooLarge(
                            header.body_len,
                            self.max_frame_body_len,
                        ));
                    }

                    self.state = DecodeState::NeedBody(header);
                }
                DecodeState::NeedBody(header) => {
                    let body_len = header.body_len as usize;
                    if src.len() < body_len {
                        return Ok(None);
                    }

                    let mut body: Bytes = src.split_to(body_len).freeze();

                    if header.compressed {
                        let compressor = self
                            .compressor
                            .as_ref()
                            .ok_or(CodecError::MissingCompressor)?;
                        body = compressor
                            .decompress(body)
                            .map_err(CodecError::DecompressFailure)?;
                    }

                    let item = self
                        .decoder
                        .decode(BytesMut::from(&body[..]))
                        .map_err(|e| CodecError::DecodeFailure(e.into()))?;

                    self.state = DecodeState::NeedHeader;
                    return Ok(Some((item, header.channel)));
                }
            }
        }
    }
}
