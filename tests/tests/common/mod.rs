//! Shared request/response types and a loopback TCP server/client pair,
//! used across the integration tests in this crate the way the teacher's
//! `tests/tests/streams/helpers.rs` backs its own end-to-end suite.

use anyhow::{anyhow, Result};
use chanmux_client::transport::TcpReactor;
use chanmux_client::{ClientConfig, ClientSupervisor};
use chanmux_core::codecs::JsonCodec;
use chanmux_core::config::ServerConfig;
use chanmux_server::Listener;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Request {
    Ping,
    Echo(String),
    Delay(u64),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Response {
    Pong,
    Echo(String),
}

pub type TestSupervisor = ClientSupervisor<TcpReactor, JsonCodec<Request>, JsonCodec<Response>>;

/// Binds an echo-and-ping server on an OS-assigned loopback port and
/// returns the address it ended up bound to.
pub async fn spawn_server() -> Result<SocketAddr> {
    let config = ServerConfig {
        bind_address: std::net::Ipv4Addr::LOCALHOST.into(),
        ..ServerConfig::default()
    };

    let listener = Arc::new(Listener::new(
        TcpReactor,
        config,
        JsonCodec::<Response>::new(),
        JsonCodec::<Request>::new(),
        |request: Request, _peer| async move {
            let response = match request {
                Request::Ping => Response::Pong,
                Request::Echo(message) => Response::Echo(message),
                Request::Delay(millis) => {
                    tokio::time::sleep(Duration::from_millis(millis)).await;
                    Response::Pong
                }
            };
            Ok(response)
        },
    ));

    listener
        .listen(0)
        .await
        .map_err(|e| anyhow!("failed to bind test server: {e}"))
}

/// Connects a supervisor to every address in `addrs`, waiting for all of
/// them to come up before returning.
pub async fn spawn_supervisor(addrs: &[SocketAddr], max_channels: usize) -> Result<Arc<TestSupervisor>> {
    let config = ClientConfig {
        max_channels,
        connection_timeout: Duration::from_millis(200),
        ..Default::default()
    };

    let supervisor = Arc::new(ClientSupervisor::new(
        TcpReactor,
        config,
        JsonCodec::<Request>::new(),
        JsonCodec::<Response>::new(),
    ));

    // `add_host` registers synchronously the moment it's called but only
    // resolves once `start` actually connects; registering every host
    // first and awaiting `start` once (rather than awaiting each
    // registration in turn, which would deadlock before `start` runs) is
    // the intended usage.
    for addr in addrs {
        let _ = supervisor.add_host(addr.ip().to_string(), addr.port());
    }

    supervisor
        .start()
        .await
        .map_err(|e| anyhow!("failed to connect to initial hosts: {e}"))?;

    Ok(supervisor)
}
