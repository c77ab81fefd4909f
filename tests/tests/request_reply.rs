//! End-to-end request/reply over loopback TCP: a `Listener` and a
//! `ClientSupervisor` wired together, exercising the full encode ->
//! write -> read -> decode -> dispatch -> encode -> write -> read ->
//! decode round trip described in §2's data flow.

mod common;

use common::{spawn_server, spawn_supervisor, Request, Response};
use std::time::Duration;

#[tokio::test]
async fn ping_pong_round_trips() {
    let addr = spawn_server().await.unwrap();
    let supervisor = spawn_supervisor(&[addr], 16).await.unwrap();

    let response = supervisor
        .send_request(Request::Ping, None, Some(Duration::from_secs(2)))
        .await
        .unwrap();

    assert_eq!(response, Response::Pong);
}

#[tokio::test]
async fn echo_preserves_payload() {
    let addr = spawn_server().await.unwrap();
    let supervisor = spawn_supervisor(&[addr], 16).await.unwrap();

    let response = supervisor
        .send_request(
            Request::Echo("hello chanmux".to_string()),
            None,
            Some(Duration::from_secs(2)),
        )
        .await
        .unwrap();

    assert_eq!(response, Response::Echo("hello chanmux".to_string()));
}

#[tokio::test]
async fn many_sequential_requests_on_one_connection_all_succeed() {
    let addr = spawn_server().await.unwrap();
    let supervisor = spawn_supervisor(&[addr], 16).await.unwrap();

    for i in 0..50 {
        let response = supervisor
            .send_request(Request::Echo(i.to_string()), None, Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(response, Response::Echo(i.to_string()));
    }
}

#[tokio::test]
async fn concurrent_requests_do_not_cross_talk() {
    let addr = spawn_server().await.unwrap();
    let supervisor = spawn_supervisor(&[addr], 32).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..32 {
        let supervisor = supervisor.clone();
        handles.push(tokio::spawn(async move {
            let response = supervisor
                .send_request(Request::Echo(i.to_string()), None, Some(Duration::from_secs(2)))
                .await
                .unwrap();
            assert_eq!(response, Response::Echo(i.to_string()));
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}
