//! Timeout race (§8 concrete scenario 5): a request whose timer fires
//! before the server replies fails with `Timeout`, and the channel stays
//! occupied until the late response arrives and is silently dropped.

mod common;

use chanmux_core::error::Error;
use common::{spawn_server, spawn_supervisor, Request};
use std::time::Duration;

#[tokio::test]
async fn slow_response_times_out_and_is_later_dropped_silently() {
    let addr = spawn_server().await.unwrap();
    let supervisor = spawn_supervisor(&[addr], 8).await.unwrap();
    let peer = supervisor.connections()[0].clone();

    let result = supervisor
        .send_request(Request::Delay(500), None, Some(Duration::from_millis(20)))
        .await;

    assert!(matches!(result, Err(Error::Timeout)));
    assert_eq!(peer.stats().timeouts, 1);
    // The channel slot is deliberately not reclaimed on timeout (§4.C
    // step 4); it's still "active" until the late response arrives.
    assert_eq!(peer.stats().active_channels, 1);

    // Wait out the slow handler; the late response must not bump
    // `received_responses` and must free the channel.
    tokio::time::sleep(Duration::from_millis(700)).await;
    let stats = peer.stats();
    assert_eq!(stats.active_channels, 0);
    assert_eq!(stats.received_responses, 0);
}

#[tokio::test]
async fn a_timed_out_request_does_not_block_other_requests() {
    let addr = spawn_server().await.unwrap();
    let supervisor = spawn_supervisor(&[addr], 8).await.unwrap();

    let timed_out = supervisor.send_request(Request::Delay(500), None, Some(Duration::from_millis(20)));
    let fast = supervisor.send_request(Request::Ping, None, Some(Duration::from_secs(2)));

    let (timed_out, fast) = tokio::join!(timed_out, fast);
    assert!(matches!(timed_out, Err(Error::Timeout)));
    assert!(fast.is_ok());
}
