//! Channel reuse under overflow (§8 concrete scenario 4): with
//! `max_channels` smaller than the number of concurrent requests, the
//! surplus queues and is dispatched FIFO as channels free up.

mod common;

use common::{spawn_server, spawn_supervisor, Request, Response};
use std::time::Duration;

const MAX_CHANNELS: usize = 16;
const IN_FLIGHT: usize = 18;
const HANDLER_DELAY_MS: u64 = 300;

#[tokio::test]
async fn overflow_requests_queue_and_drain_as_channels_free_up() {
    let addr = spawn_server().await.unwrap();
    let supervisor = spawn_supervisor(&[addr], MAX_CHANNELS).await.unwrap();
    let peer = supervisor.connections()[0].clone();

    let mut handles = Vec::with_capacity(IN_FLIGHT);
    for _ in 0..IN_FLIGHT {
        let supervisor = supervisor.clone();
        handles.push(tokio::spawn(async move {
            supervisor
                .send_request(Request::Delay(HANDLER_DELAY_MS), None, Some(Duration::from_secs(5)))
                .await
        }));
    }

    // Give every request time to either grab a channel or queue, well
    // before the slowest handler replies.
    tokio::time::sleep(Duration::from_millis(HANDLER_DELAY_MS / 3)).await;
    let mid_flight = peer.stats();
    assert_eq!(mid_flight.active_channels, MAX_CHANNELS);
    assert_eq!(mid_flight.queued_messages, IN_FLIGHT - MAX_CHANNELS);
    assert_eq!(mid_flight.max_channels, MAX_CHANNELS);

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), Response::Pong);
    }

    let drained = peer.stats();
    assert_eq!(drained.active_channels, 0);
    assert_eq!(drained.queued_messages, 0);
    assert_eq!(drained.sent_messages, IN_FLIGHT as u64);
    assert_eq!(drained.received_responses, IN_FLIGHT as u64);
}
