//! Re-exports of the reactor implementations most callers reach for, so
//! that a simple TCP client doesn't need a direct `chanmux-core`
//! dependency of its own.

pub use chanmux_core::transport::{MemoryConnection, MemoryReactor, TcpConnection, TcpReactor};
pub use chanmux_core::traits::{Acceptor, Connection, Reactor};
