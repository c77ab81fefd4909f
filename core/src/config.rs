//! Configuration shared across the client supervisor and the server
//! listener (§6 of the design: `connection_timeout`, `max_channels`,
//! `queue_size`, `bind_address`).

use std::net::IpAddr;
use std::time::Duration;

/// The protocol-level ceiling on channel IDs: a version-2 header carries
/// the channel in a `u16`, but channel `u16::MAX` is reserved as the
/// placeholder used by eager recoding (§4.C step 3), so the usable range
/// tops out one below the full 16-bit space. `max_channels` itself must
/// additionally stay at or under 2^15, per the distilled spec.
pub const MAX_CHANNELS_CEILING: usize = 1 << 15;

/// Configuration for a [`ClientSupervisor`](../../chanmux_client/struct.ClientSupervisor.html).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Initial set of `(host, port)` pairs to connect to on `start`.
    pub hosts: Vec<(String, u16)>,
    /// Connect deadline, and the base of the reconnect backoff schedule.
    pub connection_timeout: Duration,
    /// Per-connection in-flight request cap. Must be `<= MAX_CHANNELS_CEILING`.
    pub max_channels: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            connection_timeout: Duration::from_secs(5),
            max_channels: 128,
        }
    }
}

/// Configuration for a [`Listener`](../../chanmux_server/struct.Listener.html).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP accept backlog.
    pub queue_size: u32,
    /// Listening address.
    pub bind_address: IpAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            queue_size: 5,
            bind_address: "0.0.0.0".parse().unwrap(),
        }
    }
}
