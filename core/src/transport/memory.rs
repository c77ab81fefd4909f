//! An in-process duplex-pair transport, standing in for TCP in unit
//! tests so `ClientPeer`/`ServerPeer` behavior can be exercised without
//! binding a real socket. A [`MemoryReactor`] is cheaply `Clone`-able
//! (it's an `Arc` around a registry of bound "addresses") so the same
//! instance can be handed to both a test client and a test server.

use crate::error::TransportError;
use crate::traits::transport::{Acceptor, Connection, Reactor};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

const DUPLEX_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub struct MemoryConnection {
    inner: DuplexStream,
    peer_host: String,
    peer_port: u16,
}

impl AsyncRead for MemoryConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl Connection for MemoryConnection {
    fn peer_host(&self) -> String {
        self.peer_host.clone()
    }

    fn peer_port(&self) -> u16 {
        self.peer_port
    }
}

#[derive(Debug)]
pub struct MemoryAcceptor {
    address: IpAddr,
    port: u16,
    receiver: mpsc::Receiver<MemoryConnection>,
}

#[async_trait]
impl Acceptor for MemoryAcceptor {
    type Conn = MemoryConnection;

    async fn accept(&mut self) -> Result<Self::Conn, TransportError> {
        self.receiver.recv().await.ok_or_else(|| {
            TransportError::AcceptFailed(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "memory listener was dropped",
            ))
        })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::new(self.address, self.port))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryReactor {
    listeners: Arc<Mutex<HashMap<(IpAddr, u16), mpsc::Sender<MemoryConnection>>>>,
}

#[async_trait]
impl Reactor for MemoryReactor {
    type Conn = MemoryConnection;
    type Acceptor = MemoryAcceptor;

    async fn connect(
        &self,
        host: &str,
        port: u16,
        _timeout: std::time::Duration,
    ) -> Result<Self::Conn, TransportError> {
        let address: IpAddr = host
            .parse()
            .unwrap_or_else(|_| std::net::Ipv4Addr::LOCALHOST.into());

        let sender = {
            let listeners = self.listeners.lock().unwrap();
            listeners.get(&(address, port)).cloned()
        }
        .ok_or_else(|| {
            TransportError::ConnectFailed(
                host.to_string(),
                port,
                io::Error::new(io::ErrorKind::ConnectionRefused, "no listener registered"),
            )
        })?;

        let (client_half, server_half) = tokio::io::duplex(DUPLEX_BUF_SIZE);
        let client_conn = MemoryConnection {
            inner: client_half,
            peer_host: address.to_string(),
            peer_port: port,
        };
        let server_conn = MemoryConnection {
            inner: server_half,
            peer_host: "127.0.0.1".to_string(),
            peer_port: 0,
        };

        sender.send(server_conn).await.map_err(|_| {
            TransportError::ConnectFailed(
                host.to_string(),
                port,
                io::Error::new(io::ErrorKind::ConnectionRefused, "listener was dropped"),
            )
        })?;

        Ok(client_conn)
    }

    async fn bind(
        &self,
        address: IpAddr,
        port: u16,
        backlog: u32,
    ) -> Result<Self::Acceptor, TransportError> {
        let (tx, rx) = mpsc::channel(backlog.max(1) as usize);
        self.listeners.lock().unwrap().insert((address, port), tx);
        Ok(MemoryAcceptor {
            address,
            port,
            receiver: rx,
        })
    }
}
