//! `ClientSupervisor`: a pool of [`ClientPeer`] connections across one or
//! more hosts, with request routing, reconnect-with-backoff, and a
//! request-retry-once-on-close policy (§4.E).

use crate::logging;
use crate::peer::ClientPeer;
use chanmux_core::close::CloseSignal;
use chanmux_core::config::ClientConfig;
use chanmux_core::error::Error;
use chanmux_core::traits::{Compressor, MessageDecoder, MessageEncoder, Reactor};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Notify;

type ChooseConnectionFn<Enc, Resp> = dyn Fn(&[Arc<ClientPeer<Enc, Resp>>], &<Enc as MessageEncoder>::Item) -> Option<Arc<ClientPeer<Enc, Resp>>>
    + Send
    + Sync;

type ShouldReconnectFn = dyn Fn(&str, u16, u32) -> bool + Send + Sync;

type InitializeConnectionFn<Enc, Resp> =
    dyn Fn(Arc<ClientPeer<Enc, Resp>>) -> BoxFuture<'static, Result<(), Error>> + Send + Sync;

fn default_choose_connection<Enc, Resp>(
    snapshot: &[Arc<ClientPeer<Enc, Resp>>],
    _request: &Enc::Item,
) -> Option<Arc<ClientPeer<Enc, Resp>>>
where
    Enc: MessageEncoder,
{
    use rand::Rng;
    if snapshot.is_empty() {
        return None;
    }
    let index = rand::thread_rng().gen_range(0..snapshot.len());
    Some(snapshot[index].clone())
}

/// A one-shot, multi-waiter resolution, analogous to [`CloseSignal`] but
/// carrying a `Result` rather than an optional cause — used for the
/// per-host "registration promise" `add_host` returns.
#[derive(Default)]
struct RegistrationInner {
    result: OnceLock<Result<(), Arc<Error>>>,
    notify: Notify,
}

#[derive(Clone, Default)]
struct Registration(Arc<RegistrationInner>);

impl Registration {
    fn resolve(&self, result: Result<(), Arc<Error>>) {
        if self.0.result.set(result).is_ok() {
            self.0.notify.notify_waiters();
        }
    }

    async fn wait(&self) -> Result<(), Arc<Error>> {
        loop {
            let notified = self.0.notify.notified();
            if let Some(result) = self.0.result.get() {
                return result.clone();
            }
            notified.await;
        }
    }
}

struct HostEntry<Enc, Resp> {
    host: String,
    port: u16,
    removed: AtomicBool,
    current: Mutex<Option<Arc<ClientPeer<Enc, Resp>>>>,
    registration: Registration,
}

impl<Enc, Resp> HostEntry<Enc, Resp> {
    fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            removed: AtomicBool::new(false),
            current: Mutex::new(None),
            registration: Registration::default(),
        }
    }
}

/// Pools connections to one or more hosts behind a single logical client.
/// Requests are routed to a chosen connection via [`Self::send_request`];
/// disconnected hosts are retried with exponential backoff until
/// [`Self::should_reconnect`] (overridable) says to give up.
pub struct ClientSupervisor<R, Enc, Dec>
where
    R: Reactor,
    Enc: MessageEncoder + Clone + Send + Sync + 'static,
    Dec: MessageDecoder + Clone + Send + Sync + 'static,
    Enc::Item: Clone + Send + Sync + 'static,
    Dec::Item: Send + 'static,
{
    reactor: Arc<R>,
    config: ClientConfig,
    encoder: Enc,
    decoder: Dec,
    compressor: Option<Arc<dyn Compressor>>,
    max_frame_body_len: u32,
    hosts: Mutex<Vec<Arc<HostEntry<Enc, Dec::Item>>>>,
    connections: Mutex<Arc<[Arc<ClientPeer<Enc, Dec::Item>>]>>,
    running: AtomicBool,
    choose_connection: Box<ChooseConnectionFn<Enc, Dec::Item>>,
    should_reconnect: Box<ShouldReconnectFn>,
    initialize_connection: Box<InitializeConnectionFn<Enc, Dec::Item>>,
}

impl<R, Enc, Dec> ClientSupervisor<R, Enc, Dec>
where
    R: Reactor,
    Enc: MessageEncoder + Clone + Send + Sync + 'static,
    Dec: MessageDecoder + Clone + Send + Sync + 'static,
    Enc::Item: Clone + Send + Sync + 'static,
    Dec::Item: Send + 'static,
{
    /// `config.hosts` (§6: the initial `host:port` list) is registered
    /// the same way an explicit [`Self::add_host`] call would be —
    /// idempotently, and deferred until [`Self::start`] connects them.
    pub fn new(reactor: R, config: ClientConfig, encoder: Enc, decoder: Dec) -> Self {
        let hosts = config
            .hosts
            .iter()
            .map(|(host, port)| Arc::new(HostEntry::new(host.clone(), *port)))
            .collect();

        Self {
            reactor: Arc::new(reactor),
            config,
            encoder,
            decoder,
            compressor: None,
            max_frame_body_len: chanmux_protocol::DEFAULT_MAX_FRAME_BODY_LEN,
            hosts: Mutex::new(hosts),
            connections: Mutex::new(Arc::from(Vec::new())),
            running: AtomicBool::new(false),
            choose_connection: Box::new(default_choose_connection::<Enc, Dec::Item>),
            should_reconnect: Box::new(|_host, _port, _attempts| true),
            initialize_connection: Box::new(|_peer| Box::pin(async { Ok(()) })),
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

    /// Overrides the default uniform-random connection selection.
    pub fn with_choose_connection<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Arc<ClientPeer<Enc, Dec::Item>>], &Enc::Item) -> Option<Arc<ClientPeer<Enc, Dec::Item>>>
            + Send
            + Sync
            + 'static,
    {
        self.choose_connection = Box::new(f);
        self
    }

    /// Overrides whether a disconnected or newly-unreachable host should
    /// re-enter the backoff loop. Defaults to always retrying.
    pub fn with_should_reconnect<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u16, u32) -> bool + Send + Sync + 'static,
    {
        self.should_reconnect = Box::new(f);
        self
    }

    /// Overrides the per-connection initialization hook run before a
    /// fresh connection counts toward readiness. Defaults to a no-op.
    pub fn with_initialize_connection<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ClientPeer<Enc, Dec::Item>>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.initialize_connection = Box::new(move |peer| Box::pin(f(peer)));
        self
    }

    /// Registers a host. Idempotent: calling this again for an
    /// already-registered `(host, port)` returns the same registration
    /// future rather than starting a second connection attempt. If the
    /// supervisor is already running, a connection attempt begins
    /// immediately; otherwise it's deferred until [`Self::start`].
    ///
    /// The registration itself (and the connection attempt, if one is
    /// due) happens as soon as this is called, not when the returned
    /// future is first polled — so callers are free to register several
    /// hosts before awaiting any of them, or before calling
    /// [`Self::start`], without deadlocking on a future that nothing has
    /// yet triggered the resolution of.
    pub fn add_host(
        self: &Arc<Self>,
        host: impl Into<String>,
        port: u16,
    ) -> impl std::future::Future<Output = Result<(), Arc<Error>>> {
        let host = host.into();

        let (entry, freshly_added) = {
            let mut hosts = self.hosts.lock();
            match hosts.iter().find(|e| e.host == host && e.port == port) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let entry = Arc::new(HostEntry::new(host.clone(), port));
                    hosts.push(entry.clone());
                    (entry, true)
                }
            }
        };

        if freshly_added && self.running.load(Ordering::SeqCst) {
            let supervisor = Arc::clone(self);
            let entry = entry.clone();
            tokio::spawn(async move { supervisor.connect_host(entry, 0).await });
        }

        let registration = entry.registration.clone();
        async move { registration.wait().await }
    }

    /// Removes a host and closes its live connection, if any. A reconnect
    /// attempt already in flight for this host discovers the removal on
    /// its next check and aborts without retrying further.
    pub fn remove_host(&self, host: &str, port: u16) {
        let removed_entry = {
            let mut hosts = self.hosts.lock();
            let index = hosts.iter().position(|e| e.host == host && e.port == port);
            index.map(|i| hosts.remove(i))
        };

        if let Some(entry) = removed_entry {
            entry.removed.store(true, Ordering::SeqCst);
            if let Some(peer) = entry.current.lock().take() {
                peer.close();
            }
            self.rebuild_connections_snapshot();
        }
    }

    /// Starts the reactor (a no-op for most reactors, present for
    /// symmetry with the spec's `start`/`stop`/`is_running` triad) and
    /// connects to every registered host concurrently. Resolves once
    /// every host's initial connection (including its retries) has
    /// succeeded — a host that `should_reconnect` gives up on early
    /// resolves the whole future as an error.
    pub async fn start(self: &Arc<Self>) -> Result<(), Arc<Error>> {
        self.running.store(true, Ordering::SeqCst);

        let entries: Vec<_> = self.hosts.lock().clone();
        let attempts = entries.into_iter().map(|entry| {
            let supervisor = Arc::clone(self);
            async move {
                let supervisor_for_spawn = Arc::clone(&supervisor);
                let entry_for_spawn = entry.clone();
                tokio::spawn(async move { supervisor_for_spawn.connect_host(entry_for_spawn, 0).await });
                entry.registration.wait().await
            }
        });

        futures::future::try_join_all(attempts).await?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// A snapshot of the currently open connections.
    pub fn connections(&self) -> Arc<[Arc<ClientPeer<Enc, Dec::Item>>]> {
        self.connections.lock().clone()
    }

    /// Routes `request` to a connection and awaits its response.
    ///
    /// - If `connection` is supplied (used internally by
    ///   [`Self::initialize_connection`]'s caller), it's used directly.
    /// - Otherwise a connection is chosen from the current snapshot via
    ///   the (possibly overridden) `choose_connection` policy.
    /// - If the chosen connection fails with `ConnectionClosed`, the
    ///   request is retried exactly once against a freshly chosen
    ///   connection. All other errors propagate unchanged.
    pub async fn send_request(
        self: &Arc<Self>,
        request: Enc::Item,
        connection: Option<Arc<ClientPeer<Enc, Dec::Item>>>,
        timeout: Option<Duration>,
    ) -> Result<Dec::Item, Error> {
        self.send_request_inner(request, connection, timeout, true).await
    }

    async fn send_request_inner(
        self: &Arc<Self>,
        request: Enc::Item,
        connection: Option<Arc<ClientPeer<Enc, Dec::Item>>>,
        timeout: Option<Duration>,
        allow_retry: bool,
    ) -> Result<Dec::Item, Error> {
        let peer = match connection {
            Some(peer) => peer,
            None => {
                let snapshot = self.connections();
                match (self.choose_connection)(&snapshot, &request) {
                    Some(peer) => peer,
                    None => return Err(Error::NoConnection),
                }
            }
        };

        if peer.is_closed() {
            return Err(Error::RequestNotSent("chosen connection is already closed"));
        }

        match peer.send_message(request.clone(), timeout).await {
            Err(Error::ConnectionClosed) if allow_retry => {
                Box::pin(self.send_request_inner(request, None, timeout, false)).await
            }
            other => other,
        }
    }

    fn rebuild_connections_snapshot(&self) {
        let hosts = self.hosts.lock();
        let peers: Vec<_> = hosts
            .iter()
            .filter_map(|entry| entry.current.lock().clone())
            .collect();
        *self.connections.lock() = Arc::from(peers);
    }

    /// Attempts a single connection to `entry`'s host, then enters the
    /// reconnect-with-backoff loop on failure (§4.E reconnection loop).
    /// `attempts` is the number of prior failed attempts for this
    /// disconnection episode; 0 for a fresh host or a just-closed one.
    async fn connect_host(self: Arc<Self>, entry: Arc<HostEntry<Enc, Dec::Item>>, attempts: u32) {
        if entry.removed.load(Ordering::SeqCst) {
            logging::supervisor::host_removed_during_reconnect(&entry.host, entry.port);
            return;
        }

        if !self.running.load(Ordering::SeqCst) {
            entry
                .registration
                .resolve(Err(Arc::new(Error::RequestNotSent("reactor is not running"))));
            return;
        }

        let connect_result = self
            .reactor
            .connect(&entry.host, entry.port, self.config.connection_timeout)
            .await;

        let conn = match connect_result {
            Ok(conn) => conn,
            Err(err) => {
                self.handle_connect_failure(entry, attempts, Error::Transport(err)).await;
                return;
            }
        };

        let peer = match ClientPeer::spawn(
            conn,
            entry.host.clone(),
            entry.port,
            self.config.max_channels,
            self.encoder.clone(),
            self.decoder.clone(),
            self.compressor.clone(),
            self.max_frame_body_len,
        ) {
            Ok(peer) => peer,
            Err(err) => {
                self.handle_connect_failure(entry, attempts, err).await;
                return;
            }
        };

        if let Err(err) = (self.initialize_connection)(peer.clone()).await {
            logging::supervisor::initialize_connection_failed(&entry.host, entry.port, &err);
            peer.close();
            self.handle_connect_failure(entry, attempts, err).await;
            return;
        }

        *entry.current.lock() = Some(peer.clone());
        self.rebuild_connections_snapshot();
        entry.registration.resolve(Ok(()));
        logging::supervisor::reconnect_succeeded(&entry.host, entry.port);

        let supervisor = Arc::clone(&self);
        let entry_for_watch = entry.clone();
        let close_signal: CloseSignal = peer.close_signal().clone();
        tokio::spawn(async move {
            let cause = close_signal.wait().await;
            logging::supervisor::connection_lost(
                &entry_for_watch.host,
                entry_for_watch.port,
                cause.as_deref().map(|e| e as &(dyn std::error::Error)),
            );

            // A null cause is a clean close (the application closed the
            // peer itself, e.g. via `remove_host`) and is not retried; a
            // non-null cause is unexpected and always re-enters the
            // backoff loop. `should_reconnect` isn't consulted here since
            // its (host, port, attempts) signature has no way to express
            // "force a reconnect after an intentional close" safely as a
            // default — only the attempts-based connect-failure path uses it.
            let intentional = cause.is_none();
            *entry_for_watch.current.lock() = None;
            supervisor.rebuild_connections_snapshot();

            if entry_for_watch.removed.load(Ordering::SeqCst) {
                return;
            }

            if intentional {
                return;
            }

            supervisor.connect_host(entry_for_watch, 0).await;
        });
    }

    async fn handle_connect_failure(
        self: Arc<Self>,
        entry: Arc<HostEntry<Enc, Dec::Item>>,
        attempts: u32,
        error: Error,
    ) {
        if !(self.should_reconnect)(&entry.host, entry.port, attempts) {
            logging::supervisor::reconnect_abandoned(&entry.host, entry.port, &error);
            self.remove_host(&entry.host, entry.port);
            entry.registration.resolve(Err(Arc::new(error)));
            return;
        }

        let base = self.config.connection_timeout;
        let delay = std::cmp::min(base.saturating_mul(1 << attempts.min(16)), base.saturating_mul(10));
        let next_attempts = attempts + 1;

        logging::supervisor::reconnect_attempt(&entry.host, entry.port, next_attempts, delay);

        tokio::time::sleep(delay).await;

        self.connect_host(entry, next_attempts).await;
    }
}
