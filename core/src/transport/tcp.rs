//! The default, production `Reactor`/`Connection`/`Acceptor` family: a
//! thin wrapper around `tokio::net::TcpStream`/`TcpListener`.

use crate::error::TransportError;
use crate::traits::transport::{Acceptor, Connection, Reactor};
use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};

/// A connected TCP socket, tagged with the peer's address so a
/// `ClientPeer`/`ServerPeer` can report `host`/`port` in its stats
/// snapshot without keeping a second copy around.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    peer_host: String,
    peer_port: u16,
}

impl TcpConnection {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream,
            peer_host: peer.ip().to_string(),
            peer_port: peer.port(),
        })
    }
}

impl AsyncRead for TcpConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

impl Connection for TcpConnection {
    fn peer_host(&self) -> String {
        self.peer_host.clone()
    }

    fn peer_port(&self) -> u16 {
        self.peer_port
    }
}

/// The default reactor: dials out over plain TCP and binds a plain TCP
/// listener. Carries no state of its own — `ClientSupervisor` and
/// `Listener` own the connections it produces.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpReactor;

#[async_trait]
impl Reactor for TcpReactor {
    type Conn = TcpConnection;
    type Acceptor = TcpAcceptor;

    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: std::time::Duration,
    ) -> Result<Self::Conn, TransportError> {
        let addr = format!("{host}:{port}");
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout(host.to_string(), port))?
            .map_err(|e| TransportError::ConnectFailed(host.to_string(), port, e))?;

        TcpConnection::new(stream)
            .map_err(|e| TransportError::ConnectFailed(host.to_string(), port, e))
    }

    async fn bind(
        &self,
        address: IpAddr,
        port: u16,
        backlog: u32,
    ) -> Result<Self::Acceptor, TransportError> {
        let socket_addr = SocketAddr::new(address, port);
        let domain = match socket_addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        };

        let socket = socket2::Socket::new(domain, socket2::Type::STREAM, Some(socket2::Protocol::TCP))
            .map_err(|e| TransportError::BindFailed(address, port, e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::BindFailed(address, port, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::BindFailed(address, port, e))?;
        socket
            .bind(&socket_addr.into())
            .map_err(|e| TransportError::BindFailed(address, port, e))?;
        socket
            .listen(backlog as i32)
            .map_err(|e| TransportError::BindFailed(address, port, e))?;

        let listener = TcpListener::from_std(socket.into())
            .map_err(|e| TransportError::BindFailed(address, port, e))?;

        Ok(TcpAcceptor { listener })
    }
}

#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    type Conn = TcpConnection;

    async fn accept(&mut self) -> Result<Self::Conn, TransportError> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        TcpConnection::new(stream).map_err(TransportError::AcceptFailed)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
