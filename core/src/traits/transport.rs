//! The reactor/transport seam.
//!
//! The peer subsystem (`chanmux-client`, `chanmux-server`) is written
//! against these traits rather than against `tokio::net::TcpStream`
//! directly, so that an in-memory duplex transport can stand in during
//! tests. `chanmux-client` ships a Tokio TCP implementation as the default
//! production reactor.

use crate::error::TransportError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

/// A single byte-stream connection, already split into independently
/// ownable read/write halves so the framing layer can drive a read loop
/// on one task while callers write from others.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// The peer's host, as presented at connect/accept time.
    fn peer_host(&self) -> String;

    /// The peer's port.
    fn peer_port(&self) -> u16;
}

/// A bound listener accepting inbound connections of type `C`.
#[async_trait]
pub trait Acceptor: Send {
    type Conn: Connection;

    async fn accept(&mut self) -> Result<Self::Conn, TransportError>;

    /// The address the acceptor ended up bound to (useful when `port: 0`
    /// was requested and the OS picked an ephemeral one).
    fn local_addr(&self) -> io::Result<std::net::SocketAddr>;
}

/// The reactor: the thing that can dial out, bind a listener, and run a
/// timer. `chanmux-client`'s `TcpReactor` is the default production
/// implementation; `MemoryReactor` backs the in-process test transport.
#[async_trait]
pub trait Reactor: Send + Sync + Debug + 'static {
    type Conn: Connection;
    type Acceptor: Acceptor<Conn = Self::Conn>;

    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: std::time::Duration,
    ) -> Result<Self::Conn, TransportError>;

    async fn bind(
        &self,
        address: std::net::IpAddr,
        port: u16,
        backlog: u32,
    ) -> Result<Self::Acceptor, TransportError>;
}
