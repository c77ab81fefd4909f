//! Concrete implementations of the [`crate::traits::transport`] family.
//!
//! [`tcp`] is the production reactor (a plain Tokio TCP socket); [`memory`]
//! is an in-process duplex-pair stand-in used by both `chanmux-client` and
//! `chanmux-server`'s test suites so peer behavior can be exercised
//! without binding a real port.

pub mod memory;
pub mod tcp;

pub use memory::{MemoryConnection, MemoryReactor};
pub use tcp::{TcpConnection, TcpReactor};
