//! `ClientPeer`: per-connection request multiplexer (§4.C).
//!
//! A `ClientPeer` owns one live connection and hands out channels to
//! callers of [`ClientPeer::send_message`]. Responses are correlated back
//! to the caller purely by channel number; there is no separate request
//! id. When all channels are in flight, new requests queue and are
//! dispatched FIFO as channels free up.

use crate::logging;
use bytes::BytesMut;
use chanmux_core::close::CloseSignal;
use chanmux_core::config::MAX_CHANNELS_CEILING;
use chanmux_core::error::Error;
use chanmux_core::peer::drive_read_loop;
use chanmux_core::traits::{Compressor, Connection, MessageDecoder, MessageEncoder};
use chanmux_protocol::frame::RECODE_PLACEHOLDER_CHANNEL;
use chanmux_protocol::{frame, FrameDecoder, FrameEncoder};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedRead;

/// A point-in-time read of a peer's bookkeeping (§4.C statistics
/// snapshot).
#[derive(Debug, Clone)]
pub struct ClientPeerStats {
    pub host: String,
    pub port: u16,
    pub max_channels: usize,
    pub active_channels: usize,
    pub queued_messages: usize,
    pub sent_messages: u64,
    pub received_responses: u64,
    pub timeouts: u64,
}

/// A request's half of the one-shot result channel, shared between
/// wherever the request currently lives (the channel table, the pending
/// queue, or a scheduled timeout) and fulfilled exactly once from
/// whichever of those three fires first.
struct Completion<Resp>(Arc<Mutex<Option<oneshot::Sender<Result<Resp, Error>>>>>);

impl<Resp> Clone for Completion<Resp> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<Resp> Completion<Resp> {
    fn new(tx: oneshot::Sender<Result<Resp, Error>>) -> Self {
        Self(Arc::new(Mutex::new(Some(tx))))
    }

    /// Fulfills the request if nothing has already done so. Returns
    /// whether this call was the one that delivered the result.
    fn try_complete(&self, result: Result<Resp, Error>) -> bool {
        if let Some(tx) = self.0.lock().take() {
            let _ = tx.send(result);
            true
        } else {
            false
        }
    }
}

/// What a queued request is holding onto while it waits for a channel.
/// Eagerly encoded (with a placeholder channel `recode` rewrites on
/// dequeue) when the encoder supports it; otherwise the raw message is
/// held and encoded fresh once a real channel is assigned (§4.C step 3).
enum QueuedPayload<Item> {
    Encoded(BytesMut),
    Raw(Item),
}

struct QueueEntry<Resp, Item> {
    payload: QueuedPayload<Item>,
    completion: Completion<Resp>,
}

struct State<Resp, Item> {
    table: Vec<Option<Completion<Resp>>>,
    queue: VecDeque<QueueEntry<Resp, Item>>,
    sent_messages: u64,
    received_responses: u64,
    timeouts: u64,
}

impl<Resp, Item> State<Resp, Item> {
    fn new(max_channels: usize) -> Self {
        Self {
            table: (0..max_channels).map(|_| None).collect(),
            queue: VecDeque::new(),
            sent_messages: 0,
            received_responses: 0,
            timeouts: 0,
        }
    }

    /// Lowest free index, per §4.C step 2's tie-break rule.
    fn allocate_channel(&mut self) -> Option<u16> {
        self.table.iter().position(Option::is_none).map(|i| i as u16)
    }
}

/// One connection's worth of request multiplexing. Constructed via
/// [`ClientPeer::spawn`], which also starts the background read loop and
/// write task; callers only ever see the `Arc<ClientPeer<_, _>>` handle.
pub struct ClientPeer<Enc, Resp>
where
    Enc: MessageEncoder,
{
    host: String,
    port: u16,
    max_channels: usize,
    state: Mutex<State<Resp, Enc::Item>>,
    encoder: Mutex<FrameEncoder<Enc>>,
    write_tx: mpsc::UnboundedSender<BytesMut>,
    close_signal: CloseSignal,
    read_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    write_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<Enc, Resp> ClientPeer<Enc, Resp>
where
    Enc: MessageEncoder + Send + 'static,
    Enc::Item: Send + 'static,
    Resp: Send + 'static,
{
    /// Takes ownership of an already-established connection and spawns
    /// the read loop and write task that drive it. `max_channels` must be
    /// at or below [`MAX_CHANNELS_CEILING`].
    pub fn spawn<C, Dec>(
        conn: C,
        host: String,
        port: u16,
        max_channels: usize,
        encoder: Enc,
        decoder: Dec,
        compressor: Option<Arc<dyn Compressor>>,
        max_frame_body_len: u32,
    ) -> Result<Arc<Self>, Error>
    where
        C: Connection,
        Dec: MessageDecoder<Item = Resp> + Send + 'static,
    {
        if max_channels > MAX_CHANNELS_CEILING {
            return Err(Error::TooManyChannels(max_channels, MAX_CHANNELS_CEILING));
        }

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
            max_channels,
            state: Mutex::new(State::new(max_channels)),
            encoder: Mutex::new(frame_encoder),
            write_tx,
            close_signal: CloseSignal::new(),
            read_task: Mutex::new(None),
            write_task: Mutex::new(None),
        });

        let write_task = tokio::spawn(Self::run_writer(write_half, write_rx));

        let read_peer = peer.clone();
        let read_task = tokio::spawn(async move {
            let close_signal = read_peer.close_signal.clone();
            drive_read_loop(framed_read, close_signal, move |(message, channel)| {
                read_peer.handle_message(message, channel);
            })
            .await;
            read_peer.drain_on_close();
        });

        *peer.read_task.lock() = Some(read_task);
        *peer.write_task.lock() = Some(write_task);

        Ok(peer)
    }

    async fn run_writer<W>(mut write_half: W, mut rx: mpsc::UnboundedReceiver<BytesMut>)
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        while let Some(bytes) = rx.recv().await {
            if let Err(error) = write_half.write_all(&bytes).await {
                logging::client_peer::write_failed(&error);
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

    /// Forces the connection closed: aborts the read and write tasks
    /// (dropping the underlying socket halves), fulfills the close
    /// notification, and drains any in-flight or queued requests. Safe
    /// to call more than once.
    pub fn close(&self) {
        self.close_signal.close(None);

        if let Some(handle) = self.read_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.write_task.lock().take() {
            handle.abort();
        }

        self.drain_on_close();
    }

    pub fn stats(&self) -> ClientPeerStats {
        let state = self.state.lock();
        ClientPeerStats {
            host: self.host.clone(),
            port: self.port,
            max_channels: self.max_channels,
            active_channels: state.table.iter().filter(|slot| slot.is_some()).count(),
            queued_messages: state.queue.len(),
            sent_messages: state.sent_messages,
            received_responses: state.received_responses,
            timeouts: state.timeouts,
        }
    }

    /// Sends `request` and waits for its response. If every channel is
    /// currently in flight the request is queued and dispatched once one
    /// frees up (§4.C step 3); either way the returned future only
    /// resolves once a response arrives, the optional `timeout` elapses,
    /// or the connection closes.
    pub async fn send_message(
        self: &Arc<Self>,
        request: Enc::Item,
        timeout: Option<Duration>,
    ) -> Result<Resp, Error> {
        if self.close_signal.is_closed() {
            return Err(Error::RequestNotSent("connection is already closed"));
        }

        let (tx, rx) = oneshot::channel();
        let completion = Completion::new(tx);

        let assigned_channel = {
            let mut state = self.state.lock();
            let channel = state.allocate_channel();
            if let Some(channel) = channel {
                state.table[channel as usize] = Some(completion.clone());
                state.sent_messages += 1;
            }
            channel
        };

        match assigned_channel {
            Some(channel) => {
                let encoded = {
                    let mut encoder = self.encoder.lock();
                    let mut buf = BytesMut::new();
                    match encoder.encode((request, channel), &mut buf) {
                        Ok(()) => buf,
                        Err(err) => {
                            self.state.lock().table[channel as usize] = None;
                            return Err(Error::Codec(err));
                        }
                    }
                };

                if self.write_tx.send(encoded).is_err() {
                    return Err(Error::RequestNotSent("connection writer task has stopped"));
                }
            }
            None => {
                // Every channel is occupied; this has to wait in the
                // queue. If the encoder supports recoding, encode now
                // with a placeholder channel on the caller's own task so
                // the flush only has to rewrite two bytes; otherwise hold
                // the raw message and encode it once a real channel is
                // assigned.
                let payload = {
                    let mut encoder = self.encoder.lock();
                    if encoder.supports_recoding() {
                        let mut buf = BytesMut::new();
                        match encoder.encode((request, RECODE_PLACEHOLDER_CHANNEL), &mut buf) {
                            Ok(()) => QueuedPayload::Encoded(buf),
                            Err(err) => return Err(Error::Codec(err)),
                        }
                    } else {
                        QueuedPayload::Raw(request)
                    }
                };

                self.state.lock().queue.push_back(QueueEntry {
                    payload,
                    completion: completion.clone(),
                });
            }
        }

        if let Some(duration) = timeout {
            let timeout_completion = completion.clone();
            let peer = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                if timeout_completion.try_complete(Err(Error::Timeout)) {
                    peer.state.lock().timeouts += 1;
                }
            });
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionClosed),
        }
    }

    /// Correlates an inbound frame to its waiting request by channel and
    /// fulfills it, then tries to dispatch queued requests onto the
    /// channel this response just freed. A channel with no occupant (a
    /// response that arrived after its request already timed out and was
    /// garbage, or a bogus channel from the peer) is dropped silently.
    fn handle_message(&self, message: Resp, channel: u16) {
        let completion = {
            let mut state = self.state.lock();
            if (channel as usize) < state.table.len() {
                state.table[channel as usize].take()
            } else {
                None
            }
        };

        match completion {
            Some(completion) => {
                if completion.try_complete(Ok(message)) {
                    self.state.lock().received_responses += 1;
                }
            }
            None => logging::client_peer::late_response_dropped(channel),
        }

        self.flush_queue();
    }

    fn flush_queue(&self) {
        loop {
            let dequeued = {
                let mut state = self.state.lock();
                let Some(channel) = state.allocate_channel() else {
                    return;
                };

                match state.queue.pop_front() {
                    Some(entry) => Some((channel, entry)),
                    None => None,
                }
            };

            let Some((channel, entry)) = dequeued else {
                return;
            };

            let bytes = match entry.payload {
                QueuedPayload::Encoded(mut encoded) => match frame::recode(&mut encoded, channel) {
                    Ok(()) => encoded,
                    Err(error) => {
                        logging::client_peer::recode_failed(error);
                        entry
                            .completion
                            .try_complete(Err(Error::RequestNotSent("failed to recode queued frame")));
                        continue;
                    }
                },
                QueuedPayload::Raw(item) => {
                    let mut encoder = self.encoder.lock();
                    let mut buf = BytesMut::new();
                    match encoder.encode((item, channel), &mut buf) {
                        Ok(()) => buf,
                        Err(err) => {
                            logging::client_peer::recode_failed(err);
                            entry
                                .completion
                                .try_complete(Err(Error::RequestNotSent("failed to encode queued message")));
                            continue;
                        }
                    }
                }
            };

            {
                let mut state = self.state.lock();
                state.table[channel as usize] = Some(entry.completion);
                state.sent_messages += 1;
            }

            if self.write_tx.send(bytes).is_err() {
                return;
            }
        }
    }

    /// Drains every in-flight and queued request once the read loop has
    /// closed the connection: in-flight requests fail with
    /// `ConnectionClosed`, queued ones with `RequestNotSent` (they never
    /// reached the wire at all).
    fn drain_on_close(&self) {
        let (table, queue) = {
            let mut state = self.state.lock();
            (
                std::mem::take(&mut state.table),
                std::mem::take(&mut state.queue),
            )
        };

        for slot in table.into_iter().flatten() {
            slot.try_complete(Err(Error::ConnectionClosed));
        }

        for entry in queue {
            entry
                .completion
                .try_complete(Err(Error::RequestNotSent("connection closed while request was queued")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanmux_core::codecs::JsonCodec;
    use chanmux_core::traits::transport::{Acceptor, Reactor};
    use chanmux_core::transport::memory::MemoryReactor;
    use futures::{SinkExt, StreamExt};
    use serde::{Deserialize, Serialize};
    use std::net::Ipv4Addr;
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    struct Req(String);

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    struct Resp(String);

    /// Accepts one connection on `reactor` and echoes every decoded
    /// request back on the same channel, so a `ClientPeer` dialed at it
    /// can be exercised without a real socket.
    async fn spawn_echo_server(reactor: MemoryReactor, address: std::net::IpAddr, port: u16) {
        let mut acceptor = reactor.bind(address, port, 4).await.unwrap();

        tokio::spawn(async move {
            let conn = acceptor.accept().await.unwrap();
            let (read_half, write_half) = tokio::io::split(conn);
            let mut framed_read = FramedRead::new(read_half, FrameDecoder::new(JsonCodec::<Req>::new()));
            let mut framed_write = FramedWrite::new(write_half, FrameEncoder::new(JsonCodec::<Resp>::new()));

            while let Some(Ok((Req(body), channel))) = framed_read.next().await {
                if framed_write.send((Resp(body), channel)).await.is_err() {
                    break;
                }
            }
        });
    }

    #[tokio::test]
    async fn round_trips_a_request_over_an_in_memory_transport() {
        let reactor = MemoryReactor::default();
        let address: std::net::IpAddr = Ipv4Addr::LOCALHOST.into();
        spawn_echo_server(reactor.clone(), address, 9500).await;

        let conn = reactor.connect("127.0.0.1", 9500, Duration::from_secs(1)).await.unwrap();
        let peer = ClientPeer::spawn(
            conn,
            "127.0.0.1".to_string(),
            9500,
            4,
            JsonCodec::<Req>::new(),
            JsonCodec::<Resp>::new(),
            None,
            chanmux_protocol::DEFAULT_MAX_FRAME_BODY_LEN,
        )
        .unwrap();

        let response = peer.send_message(Req("hello".to_string()), None).await.unwrap();
        assert_eq!(response, Resp("hello".to_string()));
        assert_eq!(peer.stats().active_channels, 0);
        assert_eq!(peer.stats().received_responses, 1);
    }

    #[tokio::test]
    async fn queued_requests_beyond_max_channels_still_get_dispatched() {
        let reactor = MemoryReactor::default();
        let address: std::net::IpAddr = Ipv4Addr::LOCALHOST.into();
        spawn_echo_server(reactor.clone(), address, 9501).await;

        let conn = reactor.connect("127.0.0.1", 9501, Duration::from_secs(1)).await.unwrap();
        let peer = ClientPeer::spawn(
            conn,
            "127.0.0.1".to_string(),
            9501,
            1,
            JsonCodec::<Req>::new(),
            JsonCodec::<Resp>::new(),
            None,
            chanmux_protocol::DEFAULT_MAX_FRAME_BODY_LEN,
        )
        .unwrap();

        let (first, second) = tokio::join!(
            peer.send_message(Req("one".to_string()), None),
            peer.send_message(Req("two".to_string()), None),
        );

        assert_eq!(first.unwrap(), Resp("one".to_string()));
        assert_eq!(second.unwrap(), Resp("two".to_string()));
    }

    #[tokio::test]
    async fn closing_the_connection_fails_an_in_flight_request() {
        let reactor = MemoryReactor::default();
        let address: std::net::IpAddr = Ipv4Addr::LOCALHOST.into();
        spawn_echo_server(reactor.clone(), address, 9502).await;

        let conn = reactor.connect("127.0.0.1", 9502, Duration::from_secs(1)).await.unwrap();
        let peer = ClientPeer::spawn(
            conn,
            "127.0.0.1".to_string(),
            9502,
            4,
            JsonCodec::<Req>::new(),
            JsonCodec::<Resp>::new(),
            None,
            chanmux_protocol::DEFAULT_MAX_FRAME_BODY_LEN,
        )
        .unwrap();

        peer.close();

        let result = peer.send_message(Req("too late".to_string()), None).await;
        assert!(matches!(result, Err(Error::RequestNotSent(_))));
    }
}
