//! The on-wire frame: a compact header (§3 of the design) followed by an
//! opaque body. Two header layouts are recognized on decode; encoders
//! always emit version 2.
//!
//! ```text
//! v1 (6 bytes): | version=1 | channel:u8 |      body_len:u32     |
//! v2 (8 bytes): | version=2 | flags:u8   | channel:u16 | body_len:u32 |
//! ```
//!
//! All multi-byte integers are big-endian.

use bytes::{Buf, BufMut, BytesMut};
use chanmux_core::error::CodecError;

pub const VERSION_1: u8 = 1;
pub const VERSION_2: u8 = 2;

pub const HEADER_LEN_V1: usize = 6;
pub const HEADER_LEN_V2: usize = 8;

const FLAG_COMPRESSED: u8 = 0b0000_0001;

/// The upper bound on channel IDs a version-2 header can carry. One value
/// below the full `u16` range is reserved: [`RECODE_PLACEHOLDER_CHANNEL`].
pub const MAX_CHANNEL_V2: u32 = u16::MAX as u32;

/// The channel stamped on a request that's been eagerly encoded while
/// still sitting in the pending-send queue, before a real channel has
/// been assigned (§4.C step 3). `recode` rewrites this in place once a
/// channel frees up.
pub const RECODE_PLACEHOLDER_CHANNEL: u16 = u16::MAX;

/// A parsed frame header, threaded through [`crate::codec::Codec`]'s
/// decode state machine until the body bytes it describes have arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub channel: u16,
    pub compressed: bool,
    pub body_len: u32,
}

/// Returns the header length that would be read from `version`, or
/// `CodecError::UnknownVersion` for anything but 1 or 2 (§4.A: "Version
/// detection reads the first byte; values other than 1 or 2 must fail").
pub fn header_len_for_version(version: u8) -> Result<usize, CodecError> {
    match version {
        VERSION_1 => Ok(HEADER_LEN_V1),
        VERSION_2 => Ok(HEADER_LEN_V2),
        other => Err(CodecError::UnknownVersion(other)),
    }
}

/// Parses a header out of `src`, advancing it past the header bytes.
/// Callers must first have confirmed `src.len() >= header_len_for_version(src[0])`.
pub fn parse_header(src: &mut BytesMut) -> Result<FrameHeader, CodecError> {
    let version = src[0];
    match version {
        VERSION_1 => {
            let _version = src.get_u8();
            let channel = src.get_u8() as u16;
            let body_len = src.get_u32();
            Ok(FrameHeader {
                version,
                channel,
                compressed: false,
                body_len,
            })
        }
        VERSION_2 => {
            let _version = src.get_u8();
            let flags = src.get_u8();
            let channel = src.get_u16();
            let body_len = src.get_u32();
            Ok(FrameHeader {
                version,
                channel,
                compressed: flags & FLAG_COMPRESSED != 0,
                body_len,
            })
        }
        other => Err(CodecError::UnknownVersion(other)),
    }
}

/// Writes a version-2 header followed by `body` into `dst`.
pub fn encode_v2(dst: &mut BytesMut, channel: u16, compressed: bool, body: &[u8]) {
    let flags = if compressed { FLAG_COMPRESSED } else { 0 };
    dst.reserve(HEADER_LEN_V2 + body.len());
    dst.put_u8(VERSION_2);
    dst.put_u8(flags);
    dst.put_u16(channel);
    dst.put_u32(body.len() as u32);
    dst.extend_from_slice(body);
}

/// Rewrites the channel field of an already-encoded frame without
/// touching the body (§4.A `recode`). Only version-2 frames are
/// supported, since encoders never emit version 1.
pub fn recode(frame: &mut [u8], new_channel: u16) -> Result<(), CodecError> {
    if frame.len() < HEADER_LEN_V2 || frame[0] != VERSION_2 {
        return Err(CodecError::UnknownVersion(frame.first().copied().unwrap_or(0)));
    }

    let bytes = new_channel.to_be_bytes();
    frame[2] = bytes[0];
    frame[3] = bytes[1];
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_header_layout_matches_worked_example() {
        let mut dst = BytesMut::new();
        encode_v2(&mut dst, 42, false, br#"{"foo":"bar","baz":42}"#);

        assert_eq!(dst[0], 0x02);
        assert_eq!(dst[1], 0x00);
        assert_eq!(&dst[2..4], &0x002Au16.to_be_bytes());
        assert_eq!(&dst[4..8], &0x0000_0016u32.to_be_bytes());
        assert_eq!(&dst[8..], br#"{"foo":"bar","baz":42}"#);
    }

    #[test]
    fn recode_rewrites_channel_in_place() {
        let mut dst = BytesMut::new();
        encode_v2(&mut dst, RECODE_PLACEHOLDER_CHANNEL, false, b"hello");
        recode(&mut dst, 7).unwrap();

        let mut src = dst;
        let header = parse_header(&mut src).unwrap();
        assert_eq!(header.channel, 7);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = header_len_for_version(9).unwrap_err();
        assert!(matches!(err, CodecError::UnknownVersion(9)));
    }
}
