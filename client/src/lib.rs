//! Client-side half of chanmux: a per-connection request multiplexer
//! ([`peer::ClientPeer`]) and a host-pool supervisor
//! ([`supervisor::ClientSupervisor`]) that adds routing, reconnect-with-
//! backoff, and request retry on top of it.
//!
//! ```no_run
//! use chanmux_client::{transport::TcpReactor, ClientConfig, ClientSupervisor};
//! use chanmux_core::codecs::JsonCodec;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[derive(serde::Serialize, serde::Deserialize, Clone)] struct Ping;
//! # #[derive(serde::Serialize, serde::Deserialize)] struct Pong;
//! # async fn run() {
//! let supervisor = Arc::new(ClientSupervisor::new(
//!     TcpReactor,
//!     ClientConfig::default(),
//!     JsonCodec::<Ping>::new(),
//!     JsonCodec::<Pong>::new(),
//! ));
//! // Registering is synchronous the moment `add_host` is called; its
//! // returned future only resolves once `start` actually connects, so
//! // it's dropped here rather than awaited ahead of `start`.
//! let _ = supervisor.add_host("localhost", 9000);
//! supervisor.start().await.expect("initial connect");
//! let response = supervisor
//!     .send_request(Ping, None, Some(Duration::from_secs(1)))
//!     .await
//!     .expect("request");
//! # }
//! ```

pub mod logging;
pub mod peer;
pub mod supervisor;
pub mod transport;

pub use chanmux_core::config::ClientConfig;
pub use chanmux_core::error::{Error, Result};
pub use peer::{ClientPeer, ClientPeerStats};
pub use supervisor::ClientSupervisor;
