//! Connects to a chanmux server over loopback TCP and sends a single
//! JSON request/response pair. Pair with a server started from
//! `chanmux-server`'s own example, or with the echo server spun up by
//! `chanmux-tests`.

use chanmux_client::transport::TcpReactor;
use chanmux_client::{ClientConfig, ClientSupervisor};
use chanmux_core::codecs::JsonCodec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Ping {
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Pong {
    message: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("CHANMUX_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("CHANMUX_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9000);

    let supervisor = Arc::new(ClientSupervisor::new(
        TcpReactor,
        ClientConfig::default(),
        JsonCodec::<Ping>::new(),
        JsonCodec::<Pong>::new(),
    ));

    // `add_host` registers synchronously as soon as it's called; its
    // returned future only resolves once `start` below actually connects,
    // so it must not be awaited first — that would wait on a connection
    // attempt that hasn't been started yet.
    let _ = supervisor.add_host(host.clone(), port);
    supervisor
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to {host}:{port}: {e}"))?;

    let request = Ping {
        message: "hello from chanmux-client".to_string(),
    };

    let response = supervisor
        .send_request(request, None, Some(Duration::from_secs(5)))
        .await?;

    println!("received: {}", response.message);
    Ok(())
}
