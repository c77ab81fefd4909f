//! The chanmux wire frame and its `tokio_util` codec.
//!
//! This crate is deliberately transport-agnostic: it knows how to turn an
//! application message plus a channel into bytes and back, and nothing
//! about sockets, connections, or peers. `chanmux-client` and
//! `chanmux-server` drive a [`Codec`] against a real or in-memory byte
//! stream via `tokio_util::codec::Framed`.

pub mod codec;
pub mod frame;

pub use codec::{FrameDecoder, FrameEncoder, DEFAULT_MAX_FRAME_BODY_LEN};
pub use frame::{recode, FrameHeader, RECODE_PLACEHOLDER_CHANNEL, VERSION_1, VERSION_2};
