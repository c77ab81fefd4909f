//! `send_request`'s single automatic retry (§4.E): a request whose chosen
//! connection closes while the request is in flight is retried exactly
//! once against a freshly chosen connection, rather than failing the
//! caller outright.

mod common;

use chanmux_client::transport::TcpReactor;
use chanmux_client::{ClientConfig, ClientSupervisor};
use chanmux_core::codecs::JsonCodec;
use common::{spawn_server, Request, Response};
use std::sync::Arc;
use std::time::Duration;

/// Always routes to the first connection in the snapshot that isn't
/// already closed, rather than the default uniform-random pick — so
/// which host a retry lands on is deterministic instead of racing the
/// connection-set snapshot rebuild that follows a close.
fn route_to_first_open(
    snapshot: &[Arc<chanmux_client::ClientPeer<JsonCodec<Request>, Response>>],
    _request: &Request,
) -> Option<Arc<chanmux_client::ClientPeer<JsonCodec<Request>, Response>>> {
    snapshot.iter().find(|peer| !peer.is_closed()).cloned()
}

#[tokio::test]
async fn a_request_retries_once_onto_a_surviving_connection_after_its_peer_closes() {
    let addr_a = spawn_server().await.unwrap();
    let addr_b = spawn_server().await.unwrap();

    let supervisor = Arc::new(
        ClientSupervisor::new(
            TcpReactor,
            ClientConfig::default(),
            JsonCodec::<Request>::new(),
            JsonCodec::<Response>::new(),
        )
        .with_choose_connection(route_to_first_open),
    );

    let _ = supervisor.add_host(addr_a.ip().to_string(), addr_a.port());
    let _ = supervisor.add_host(addr_b.ip().to_string(), addr_b.port());
    supervisor.start().await.unwrap();

    let host_a = supervisor.connections()[0].clone();

    let in_flight = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.send_request(Request::Delay(300), None, None).await }
    });

    // Give the request time to land on host_a (the only open connection
    // when `route_to_first_open` first runs) before closing it out from
    // under it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    host_a.close();

    let result = in_flight.await.unwrap();
    assert_eq!(result.unwrap(), Response::Pong);
}

#[tokio::test]
async fn concurrent_requests_survive_one_connections_close() {
    let addr_a = spawn_server().await.unwrap();
    let addr_b = spawn_server().await.unwrap();

    let supervisor = Arc::new(
        ClientSupervisor::new(
            TcpReactor,
            ClientConfig::default(),
            JsonCodec::<Request>::new(),
            JsonCodec::<Response>::new(),
        )
        .with_choose_connection(route_to_first_open),
    );

    let _ = supervisor.add_host(addr_a.ip().to_string(), addr_a.port());
    let _ = supervisor.add_host(addr_b.ip().to_string(), addr_b.port());
    supervisor.start().await.unwrap();

    let host_a = supervisor.connections()[0].clone();

    // Every request sleeps server-side long enough to still be in flight
    // when host_a closes, so each one actually exercises the retry path
    // rather than completing beforehand.
    let mut handles = Vec::new();
    for _ in 0..10 {
        let supervisor = supervisor.clone();
        handles.push(tokio::spawn(async move {
            supervisor.send_request(Request::Delay(200), None, None).await
        }));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    host_a.close();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), Response::Pong);
    }
}
