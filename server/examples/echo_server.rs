//! Listens on loopback TCP and echoes every JSON request back as the
//! response. Pair with `chanmux-client`'s `request_reply` example, or
//! with `chanmux-tests`.

use chanmux_core::codecs::JsonCodec;
use chanmux_core::config::ServerConfig;
use chanmux_core::transport::TcpReactor;
use chanmux_server::Listener;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    body: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("CHANMUX_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9000);

    let listener = Arc::new(Listener::new(
        TcpReactor,
        ServerConfig::default(),
        JsonCodec::<Message>::new(),
        JsonCodec::<Message>::new(),
        |request: Message, _peer| async move { Ok(request) },
    ));

    let addr = listener.listen(port).await?;
    println!("echoing on {addr}");

    std::future::pending::<()>().await;
    Ok(())
}
