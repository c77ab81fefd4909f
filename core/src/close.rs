//! The base peer's close notification (§4.B): a one-shot, multi-waiter
//! signal carrying an optional cause, shared between `chanmux-client`'s
//! `ClientPeer` and `chanmux-server`'s `ServerPeer`.

use crate::error::Error;
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    cause: OnceLock<Option<Arc<Error>>>,
    notify: Notify,
}

/// Cheaply `Clone`-able handle to a connection's close notification.
/// `close` may be called from exactly one place in practice (the read
/// loop noticing EOF or a decode error) but is safe to call more than
/// once: only the first cause is recorded.
#[derive(Clone, Default)]
pub struct CloseSignal(Arc<Inner>);

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fulfills the notification. A second call is a no-op.
    pub fn close(&self, cause: Option<Arc<Error>>) {
        if self.0.cause.set(cause).is_ok() {
            self.0.notify.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.0.cause.get().is_some()
    }

    /// Returns the close cause, waiting for `close` to be called if it
    /// hasn't been yet. Safe to call from any number of tasks, before or
    /// after `close` fires.
    pub async fn wait(&self) -> Option<Arc<Error>> {
        loop {
            let notified = self.0.notify.notified();
            if let Some(cause) = self.0.cause.get() {
                return cause.clone();
            }
            notified.await;
        }
    }

    /// Registers a fire-and-forget listener, mirroring the spec's
    /// `on_closed(listener)` callback API (listeners receive the cause,
    /// possibly `None` for a clean close).
    pub fn on_closed<F>(&self, listener: F)
    where
        F: FnOnce(Option<Arc<Error>>) + Send + 'static,
    {
        let signal = self.clone();
        tokio::spawn(async move {
            let cause = signal.wait().await;
            listener(cause);
        });
    }
}
