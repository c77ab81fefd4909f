//! Shared error types, plug-in traits, and transport abstraction for the
//! chanmux peer subsystem.
//!
//! This crate has no opinion about wire format (that's
//! `chanmux-protocol`) or connection management (that's `chanmux-client`
//! and `chanmux-server`); it only defines the seams those crates build
//! against, so that the peer subsystem can be exercised against an
//! in-memory transport in tests and a real TCP transport in production
//! without either side knowing the difference.

pub mod close;
pub mod config;
pub mod error;
pub mod peer;
pub mod traits;
pub mod transport;

#[cfg(feature = "codec")]
pub mod codecs;

#[cfg(feature = "compression")]
pub mod compression;

pub use error::{Error, Result};
