//! `ServerPeer`: per-connection request dispatcher (§4.D).
//!
//! Each inbound frame is handed to a user-supplied `handle_request`
//! closure; its response is written back tagged with the same channel.
//! A failing handler (or a failing *encode* of its response) gets one
//! chance to recover via `handle_error` before the channel is abandoned.

use crate::logging;
use bytes::BytesMut;
use chanmux_core::close::CloseSignal;
use chanmux_core::error::CodecError;
use chanmux_core::peer::drive_read_loop;
use chanmux_core::traits::{Compressor, Connection, MessageDecoder, MessageEncoder};
use chanmux_protocol::{FrameDecoder, FrameEncoder};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

pub(crate) type HandleRequestFn<Enc, Dec> = dyn Fn(
        <Dec as MessageDecoder>::Item,
        Arc<ServerPeer<Enc, Dec>>,
    ) -> BoxFuture<'static, anyhow::Result<<Enc as MessageEncoder>::Item>>
    + Send
    + Sync;

pub(crate) type HandleErrorFn<Enc, Dec> = dyn Fn(
        anyhow::Error,
        <Dec as MessageDecoder>::Item,
        Option<<Enc as MessageEncoder>::Item>,
        Arc<ServerPeer<Enc, Dec>>,
    ) -> BoxFuture<'static, anyhow::Result<<Enc as MessageEncoder>::Item>>
    + Send
    + Sync;

pub(crate) type HandleConnectionFn<Enc, Dec> =
    dyn Fn(Arc<ServerPeer<Enc, Dec>>) -> BoxFuture<'static, ()> + Send + Sync;

/// One accepted connection's worth of request dispatch. Constructed via
/// [`ServerPeer::spawn`], which runs `handle_connection` to completion
/// before starting the read loop, per §4.D.
pub struct ServerPeer<Enc, Dec>
where
    Enc: MessageEncoder,
    Dec: MessageDecoder,
{
    host: String,
    port: u16,
    encoder: Mutex<FrameEncoder<Enc>>,
    write_tx: mpsc::UnboundedSender<BytesMut>,
    close_signal: CloseSignal,
    handle_request: Arc<HandleRequestFn<Enc, Dec>>,
    handle_error: Arc<HandleErrorFn<Enc, Dec>>,
    read_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    write_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<Enc, Dec> ServerPeer<Enc, Dec>
where
    Enc: MessageEncoder + Send + 'static,
    Enc::Item: Clone + Send + 'static,
    Dec: MessageDecoder + Send + 'static,
    Dec::Item: Clone + Send + 'static,
{
    /// Takes ownership of an accepted connection, runs `handle_connection`
    /// to completion, then spawns the read loop and write task.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn spawn<C>(
        conn: C,
        encoder: Enc,
        decoder: Dec,
        compressor: Option<Arc<dyn Compressor>>,
        max_frame_body_len: u32,
        handle_request: Arc<HandleRequestFn<Enc, Dec>>,
        handle_error: Arc<HandleErrorFn<Enc, Dec>>,
        handle_connection: Arc<HandleConnectionFn<Enc, Dec>>,
    ) -> Arc<Self>
    where
        C: Connection,
    {
        let host = conn.peer_host();
        let port = conn.peer_port();

        let (read_half, write_half) = tokio::io::split(conn);

        let mut frame_encoder = FrameEncoder::new(encoder).with_max_frame_body_len(max_frame_body_len);
        let mut frame_decoder = FrameDecoder::new(decoder).with_max_frame_body_len(max_frame_body_len);
        if let Some(compressor) = compressor {
            frame_encoder = frame_encoder.with_compressor(compressor.clone());
            frame_decoder = frame_decoder.with_compressor(compressor);
        }

        let framed_read = FramedRead::new(read_half, frame_decoder);
        let (write_tx, write_rx) = mpsc::unbounded_channel::<BytesMut>();

        let peer = Arc::new(Self {
            host,
            port,
            encoder: Mutex::new(frame_encoder),
            write_tx,
            close_signal: CloseSignal::new(),
            handle_request,
            handle_error,
            read_task: Mutex::new(None),
            write_task: Mutex::new(None),
        });

        handle_connection(peer.clone()).await;

        let write_task = tokio::spawn(Self::run_writer(write_half, write_rx));

        let read_peer = peer.clone();
        let read_task = tokio::spawn(async move {
            let close_signal = read_peer.close_signal.clone();
            drive_read_loop(framed_read, close_signal, move |(message, channel)| {
                let peer = read_peer.clone();
                tokio::spawn(async move { peer.dispatch(message, channel).await });
            })
            .await;
        });

        *peer.read_task.lock() = Some(read_task);
        *peer.write_task.lock() = Some(write_task);

        peer
    }

    async fn run_writer<W>(mut write_half: W, mut rx: mpsc::UnboundedReceiver<BytesMut>)
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        while let Some(bytes) = rx.recv().await {
            if let Err(error) = write_half.write_all(&bytes).await {
                logging::server_peer::response_write_failed(&error);
                break;
            }
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_closed(&self) -> bool {
        self.close_signal.is_closed()
    }

    pub fn close_signal(&self) -> &CloseSignal {
        &self.close_signal
    }

    pub fn close(&self) {
        self.close_signal.close(None);
        if let Some(handle) = self.read_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.write_task.lock().take() {
            handle.abort();
        }
    }

    /// Runs the user handler for one inbound request and writes (or
    /// fails to write) its response. See module docs for the recovery
    /// path on handler or encode failure.
    async fn dispatch(self: Arc<Self>, request: Dec::Item, channel: u16) {
        let outcome = (self.handle_request)(request.clone(), self.clone()).await;

        let response = match outcome {
            Ok(response) => response,
            Err(error) => {
                logging::server_peer::handler_failed(channel, &error);
                match self.recover(error, request, None, channel).await {
                    Some(response) => response,
                    None => return,
                }
            }
        };

        match self.encode_response(response.clone(), channel) {
            Ok(bytes) => {
                let _ = self.write_tx.send(bytes);
            }
            Err(error) => {
                logging::server_peer::response_encode_failed(channel, &error);
                if let Some(alternate) = self
                    .recover(anyhow::Error::new(error), request, Some(response), channel)
                    .await
                {
                    match self.encode_response(alternate, channel) {
                        Ok(bytes) => {
                            let _ = self.write_tx.send(bytes);
                        }
                        Err(error2) => logging::server_peer::response_encode_failed(channel, &error2),
                    }
                }
            }
        }
    }

    /// Invokes `handle_error` exactly once; a failure here (or a second
    /// encode failure, checked by the caller) is logged and the channel
    /// is abandoned without a response (§4.D: "at most one retry").
    async fn recover(
        self: &Arc<Self>,
        error: anyhow::Error,
        request: Dec::Item,
        original_response: Option<Enc::Item>,
        channel: u16,
    ) -> Option<Enc::Item> {
        match (self.handle_error)(error, request, original_response, self.clone()).await {
            Ok(response) => Some(response),
            Err(error) => {
                logging::server_peer::error_handler_failed(channel, &error);
                None
            }
        }
    }

    fn encode_response(&self, response: Enc::Item, channel: u16) -> Result<BytesMut, CodecError> {
        let mut encoder = self.encoder.lock();
        let mut buf = BytesMut::new();
        encoder.encode((response, channel), &mut buf)?;
        Ok(buf)
    }
}

/// The default `handle_error`: re-raises the original error, producing
/// no alternate response.
pub(crate) fn default_handle_error<Enc, Dec>(
    error: anyhow::Error,
    _request: Dec::Item,
    _original_response: Option<Enc::Item>,
    _peer: Arc<ServerPeer<Enc, Dec>>,
) -> BoxFuture<'static, anyhow::Result<Enc::Item>>
where
    Enc: MessageEncoder,
    Dec: MessageDecoder,
{
    Box::pin(async move { Err(error) })
}

/// The default `handle_connection`: a no-op.
pub(crate) fn default_handle_connection<Enc, Dec>(_peer: Arc<ServerPeer<Enc, Dec>>) -> BoxFuture<'static, ()>
where
    Enc: MessageEncoder,
    Dec: MessageDecoder,
{
    Box::pin(async {})
}
