//! The shared shape of "Peer (base)" from §4.B: drive a decoded-message
//! stream until EOF or a decode error, delivering each complete frame to
//! a caller-supplied handler and closing the connection's [`CloseSignal`]
//! exactly once when the stream ends.
//!
//! `ClientPeer` and `ServerPeer` specialize only in what `on_message`
//! does with a frame (fulfill a waiting request vs. dispatch to a user
//! handler) — per the design notes, that's a function, not a subclass.

use crate::close::CloseSignal;
use crate::error::Error;
use futures::{Stream, StreamExt};
use std::sync::Arc;

/// Runs the inbound read loop. Any error from the underlying stream
/// (malformed frame, I/O failure) closes the connection with that error
/// as cause; a clean EOF closes it with `None`. This is the only path by
/// which a single bad frame takes the whole connection down (§4.B).
pub async fn drive_read_loop<S, T, E, F>(mut stream: S, close_signal: CloseSignal, mut on_message: F)
where
    S: Stream<Item = Result<T, E>> + Unpin,
    E: Into<Error>,
    F: FnMut(T),
{
    loop {
        match stream.next().await {
            Some(Ok(item)) => on_message(item),
            Some(Err(err)) => {
                close_signal.close(Some(Arc::new(err.into())));
                return;
            }
            None => {
                close_signal.close(None);
                return;
            }
        }
    }
}
