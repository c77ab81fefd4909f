//! Named call sites wrapping `tracing`, mirroring `chanmux-client`'s
//! `logging` module so both sides of the peer subsystem read the same
//! way in a combined trace.

pub mod server_peer {
    use std::fmt::Display;

    pub fn handler_failed(channel: u16, error: impl Display) {
        tracing::warn!(channel, %error, "request handler failed");
    }

    pub fn error_handler_failed(channel: u16, error: impl Display) {
        tracing::error!(channel, %error, "handle_error itself failed, dropping response");
    }

    pub fn response_encode_failed(channel: u16, error: impl Display) {
        tracing::warn!(channel, %error, "failed to encode response");
    }

    pub fn response_write_failed(error: &std::io::Error) {
        tracing::warn!(%error, "server peer write task stopped");
    }

    pub fn connection_closed(host: &str, port: u16, cause: Option<&(dyn std::error::Error)>) {
        match cause {
            Some(cause) => tracing::warn!(host, port, %cause, "connection closed unexpectedly"),
            None => tracing::debug!(host, port, "connection closed cleanly"),
        }
    }
}

pub mod listener {
    pub fn listening(address: std::net::IpAddr, port: u16) {
        tracing::info!(%address, port, "listening");
    }

    pub fn accept_failed(error: impl std::fmt::Display) {
        tracing::warn!(%error, "failed to accept an incoming connection");
    }

    pub fn connection_accepted(host: &str, port: u16) {
        tracing::debug!(host, port, "accepted connection");
    }
}
