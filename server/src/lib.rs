//! Server-side half of chanmux: [`ServerPeer`](peer::ServerPeer) dispatches
//! decoded requests to a user handler and writes the response back tagged
//! with its original channel (§4.D); [`Listener`] binds a reactor acceptor
//! and spawns one `ServerPeer` per accepted connection.
//!
//! ```no_run
//! use chanmux_core::codecs::JsonCodec;
//! use chanmux_core::config::ServerConfig;
//! use chanmux_core::transport::TcpReactor;
//! use chanmux_server::Listener;
//! use std::sync::Arc;
//!
//! # #[derive(serde::Serialize, serde::Deserialize, Clone)] struct Ping;
//! # #[derive(serde::Serialize, serde::Deserialize, Clone)] struct Pong;
//! # async fn run() -> anyhow::Result<()> {
//! let listener = Arc::new(Listener::new(
//!     TcpReactor,
//!     ServerConfig::default(),
//!     JsonCodec::<Pong>::new(),
//!     JsonCodec::<Ping>::new(),
//!     |_request: Ping, _peer| Box::pin(async move { Ok(Pong) }),
//! ));
//! listener.listen(9000).await?;
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod peer;

use chanmux_core::config::ServerConfig;
use chanmux_core::error::{Error, TransportError};
use chanmux_core::traits::{Acceptor, Compressor, Connection, MessageDecoder, MessageEncoder, Reactor};
use peer::{default_handle_connection, default_handle_error, HandleConnectionFn, HandleErrorFn, HandleRequestFn};
use std::net::SocketAddr;
use std::sync::Arc;

pub use chanmux_core::config::ServerConfig as Config;
pub use peer::ServerPeer;

/// Binds an acceptor and spawns a [`ServerPeer`] per accepted connection,
/// each driven by the same `handle_request`/`handle_error`/
/// `handle_connection` hooks (§4.D).
pub struct Listener<R, Enc, Dec>
where
    R: Reactor,
    Enc: MessageEncoder,
    Dec: MessageDecoder,
{
    reactor: Arc<R>,
    config: ServerConfig,
    encoder: Enc,
    decoder: Dec,
    compressor: Option<Arc<dyn Compressor>>,
    max_frame_body_len: u32,
    handle_request: Arc<HandleRequestFn<Enc, Dec>>,
    handle_error: Arc<HandleErrorFn<Enc, Dec>>,
    handle_connection: Arc<HandleConnectionFn<Enc, Dec>>,
}

impl<R, Enc, Dec> Listener<R, Enc, Dec>
where
    R: Reactor,
    Enc: MessageEncoder + Clone + Send + Sync + 'static,
    Enc::Item: Clone + Send + 'static,
    Dec: MessageDecoder + Clone + Send + Sync + 'static,
    Dec::Item: Clone + Send + 'static,
{
    /// `handle_request` is the only mandatory hook: it's invoked once per
    /// inbound message and must produce the response to write back on the
    /// same channel (§4.D). `handle_error`/`handle_connection` default to
    /// "re-raise" and "no-op" respectively; override them with
    /// [`Self::with_handle_error`]/[`Self::with_handle_connection`].
    pub fn new<F, Fut>(reactor: R, config: ServerConfig, encoder: Enc, decoder: Dec, handle_request: F) -> Self
    where
        F: Fn(Dec::Item, Arc<ServerPeer<Enc, Dec>>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Enc::Item>> + Send + 'static,
    {
        Self {
            reactor: Arc::new(reactor),
            config,
            encoder,
            decoder,
            compressor: None,
            max_frame_body_len: chanmux_protocol::DEFAULT_MAX_FRAME_BODY_LEN,
            handle_request: Arc::new(move |request, peer| Box::pin(handle_request(request, peer))),
            handle_error: Arc::new(default_handle_error::<Enc, Dec>),
            handle_connection: Arc::new(default_handle_connection::<Enc, Dec>),
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

    /// Overrides the default "re-raise the original error" recovery hook
    /// (§4.D: invoked at most once, on a handler failure or a response
    /// encode failure).
    pub fn with_handle_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(anyhow::Error, Dec::Item, Option<Enc::Item>, Arc<ServerPeer<Enc, Dec>>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Enc::Item>> + Send + 'static,
    {
        self.handle_error = Arc::new(move |error, request, original, peer| Box::pin(f(error, request, original, peer)));
        self
    }

    /// Overrides the default no-op per-connection hook, run once per
    /// accepted connection before any message is dispatched (§4.D).
    pub fn with_handle_connection<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ServerPeer<Enc, Dec>>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.handle_connection = Arc::new(move |peer| Box::pin(f(peer)));
        self
    }

    /// Binds `config.bind_address:port` with the configured accept
    /// backlog and accepts connections until the acceptor errors out,
    /// spawning a [`ServerPeer`] for each one. Resolves once bound,
    /// running the accept loop on a background task; returns the address
    /// actually bound (useful when `port == 0`).
    pub async fn listen(self: &Arc<Self>, port: u16) -> Result<SocketAddr, Error> {
        let mut acceptor = self
            .reactor
            .bind(self.config.bind_address, port, self.config.queue_size)
            .await
            .map_err(Error::Transport)?;

        let local_addr = acceptor.local_addr().map_err(TransportError::Io)?;
        logging::listener::listening(self.config.bind_address, local_addr.port());

        let listener = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match acceptor.accept().await {
                    Ok(conn) => {
                        logging::listener::connection_accepted(&conn.peer_host(), conn.peer_port());
                        listener.spawn_peer(conn).await;
                    }
                    Err(error) => {
                        logging::listener::accept_failed(&error);
                        return;
                    }
                }
            }
        });

        Ok(local_addr)
    }

    async fn spawn_peer(&self, conn: R::Conn) -> Arc<ServerPeer<Enc, Dec>> {
        ServerPeer::spawn(
            conn,
            self.encoder.clone(),
            self.decoder.clone(),
            self.compressor.clone(),
            self.max_frame_body_len,
            self.handle_request.clone(),
            self.handle_error.clone(),
            self.handle_connection.clone(),
        )
        .await
    }
}
