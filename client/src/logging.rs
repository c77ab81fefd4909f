//! Named call sites wrapping `tracing`, so business logic reads as intent
//! (`logging::client_peer::write_failed(&err)`) rather than ad-hoc
//! `tracing::warn!` calls sprinkled through the peer and supervisor.

pub mod client_peer {
    use std::fmt::Display;

    pub fn write_failed(error: &std::io::Error) {
        tracing::warn!(%error, "client peer write task stopped");
    }

    pub fn late_response_dropped(channel: u16) {
        tracing::debug!(channel, "dropped late response on channel with no occupant");
    }

    pub fn recode_failed(error: impl Display) {
        tracing::error!(%error, "failed to recode a queued frame");
    }
}

pub mod supervisor {
    use std::fmt::Display;

    pub fn connection_lost(host: &str, port: u16, cause: Option<&(dyn std::error::Error)>) {
        match cause {
            Some(cause) => tracing::warn!(host, port, %cause, "connection closed unexpectedly"),
            None => tracing::debug!(host, port, "connection closed cleanly"),
        }
    }

    pub fn reconnect_attempt(host: &str, port: u16, attempt: u32, delay: std::time::Duration) {
        tracing::info!(host, port, attempt, delay_secs = delay.as_secs_f64(), "attempting reconnect");
    }

    pub fn reconnect_succeeded(host: &str, port: u16) {
        tracing::info!(host, port, "reconnected");
    }

    pub fn reconnect_abandoned(host: &str, port: u16, error: impl Display) {
        tracing::warn!(host, port, %error, "giving up on reconnecting, removing host");
    }

    pub fn host_removed_during_reconnect(host: &str, port: u16) {
        tracing::debug!(host, port, "host removed while a reconnect was pending, aborting");
    }

    pub fn initialize_connection_failed(host: &str, port: u16, error: impl Display) {
        tracing::warn!(host, port, %error, "initialize_connection hook failed, closing connection");
    }
}
