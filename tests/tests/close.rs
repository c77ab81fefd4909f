//! Close drains (§8 invariant): once a connection closes, every
//! previously-returned request future completes — `ConnectionClosed` for
//! requests that were in flight, `RequestNotSent` for ones still queued —
//! and the channel table and queue are left empty.

mod common;

use chanmux_core::error::Error;
use common::{spawn_server, spawn_supervisor, Request};
use std::time::Duration;

#[tokio::test]
async fn in_flight_requests_fail_with_connection_closed() {
    let addr = spawn_server().await.unwrap();
    let supervisor = spawn_supervisor(&[addr], 8).await.unwrap();
    let peer = supervisor.connections()[0].clone();

    let in_flight = tokio::spawn({
        let peer = peer.clone();
        async move { peer.send_message(Request::Delay(2_000), None).await }
    });

    // Let the request actually land on a channel before we close.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(peer.stats().active_channels, 1);

    peer.close();

    let result = in_flight.await.unwrap();
    assert!(matches!(result, Err(Error::ConnectionClosed)));

    let stats = peer.stats();
    assert_eq!(stats.active_channels, 0);
    assert_eq!(stats.queued_messages, 0);
}

#[tokio::test]
async fn queued_requests_fail_with_request_not_sent() {
    let addr = spawn_server().await.unwrap();
    let supervisor = spawn_supervisor(&[addr], 1).await.unwrap();
    let peer = supervisor.connections()[0].clone();

    // Occupy the single channel so the second request has to queue.
    let in_flight = tokio::spawn({
        let peer = peer.clone();
        async move { peer.send_message(Request::Delay(2_000), None).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(peer.stats().active_channels, 1);

    let queued = tokio::spawn({
        let peer = peer.clone();
        async move { peer.send_message(Request::Ping, None).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(peer.stats().queued_messages, 1);

    peer.close();

    assert!(matches!(in_flight.await.unwrap(), Err(Error::ConnectionClosed)));
    assert!(matches!(queued.await.unwrap(), Err(Error::RequestNotSent(_))));
}

#[tokio::test]
async fn send_message_on_an_already_closed_connection_fails_immediately() {
    let addr = spawn_server().await.unwrap();
    let supervisor = spawn_supervisor(&[addr], 8).await.unwrap();
    let peer = supervisor.connections()[0].clone();

    peer.close();

    let result = peer.send_message(Request::Ping, None).await;
    assert!(matches!(result, Err(Error::RequestNotSent(_))));
}
