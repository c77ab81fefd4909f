//! Reconnect-on-close control (§4.E): an intentional close is never
//! retried, and `should_reconnect` returning false abandons the host and
//! fails `start` instead of retrying forever.

mod common;

use chanmux_client::transport::TcpReactor;
use chanmux_client::{ClientConfig, ClientSupervisor};
use chanmux_core::codecs::JsonCodec;
use common::{spawn_server, Request};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn should_reconnect_false_abandons_host_and_fails_start() {
    // Nothing is listening on this port, so the first connect attempt
    // fails; `should_reconnect` refusing a retry should surface that
    // failure from `start` instead of backing off forever.
    let unreachable: SocketAddr = (Ipv4Addr::LOCALHOST, 1).into();

    let supervisor = Arc::new(
        ClientSupervisor::<_, JsonCodec<Request>, _>::new(
            TcpReactor,
            ClientConfig {
                connection_timeout: Duration::from_millis(100),
                ..Default::default()
            },
            JsonCodec::<Request>::new(),
            JsonCodec::<common::Response>::new(),
        )
        .with_should_reconnect(|_host, _port, _attempts| false),
    );

    let _ = supervisor.add_host(unreachable.ip().to_string(), unreachable.port());
    let result = supervisor.start().await;
    assert!(result.is_err());
}

#[tokio::test]
async fn an_intentional_close_does_not_reconnect() {
    let addr = spawn_server().await.unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_for_hook = attempts.clone();

    let supervisor = Arc::new(
        ClientSupervisor::<_, JsonCodec<Request>, _>::new(
            TcpReactor,
            ClientConfig::default(),
            JsonCodec::<Request>::new(),
            JsonCodec::<common::Response>::new(),
        )
        .with_should_reconnect(move |_host, _port, _attempts| {
            attempts_for_hook.fetch_add(1, Ordering::SeqCst);
            true
        }),
    );

    let _ = supervisor.add_host(addr.ip().to_string(), addr.port());
    supervisor.start().await.unwrap();

    let peer = supervisor.connections()[0].clone();
    peer.close();

    // Give the close-watcher task a chance to run; since the cause is
    // `None` (an intentional, application-initiated close) it must not
    // re-enter the backoff loop at all.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(supervisor.connections().is_empty());
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
}
