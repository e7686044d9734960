//! Global metrics as observed through a running server

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use serial_test::serial;
use tcp_router::core::message::Entry;
use tcp_router::protocol::context::Context;
use tcp_router::service::client::Client;
use tcp_router::utils::global_metrics;

use common::{start, test_server, wait_until};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn traffic_and_sessions_are_counted() {
    let mut server = test_server();
    server.add_route(
        1,
        |ctx: &mut Context| {
            let data = ctx.request().map(|r| r.data.clone()).unwrap_or_default();
            ctx.set_response(Entry::new(2, data));
        },
        [],
    );
    let (server, addr, _serving) = start(server).await;
    let before = global_metrics().snapshot();

    let mut client = Client::connect(&addr.to_string()).await.unwrap();
    for _ in 0..3 {
        client.request(Entry::new(1, &b"abcd"[..])).await.unwrap();
    }
    drop(client);
    wait_until(|| server.sessions().is_empty()).await;

    let after = global_metrics().snapshot();
    assert_eq!(after.sessions_total - before.sessions_total, 1);
    assert_eq!(after.sessions_active, before.sessions_active);
    assert_eq!(after.messages_received - before.messages_received, 3);
    assert_eq!(after.messages_sent - before.messages_sent, 3);
    assert_eq!(after.bytes_received - before.bytes_received, 12);
    assert_eq!(after.bytes_sent - before.bytes_sent, 3 * (8 + 4));

    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn missing_routes_and_panics_are_counted() {
    let mut server = test_server();
    server.add_route(1, |_: &mut Context| panic!("counted"), []);
    server.add_route(
        2,
        |ctx: &mut Context| {
            ctx.set_response(Entry::new(3, Vec::<u8>::new()));
        },
        [],
    );
    let (server, addr, _serving) = start(server).await;
    let before = global_metrics().snapshot();

    let mut client = Client::connect(&addr.to_string()).await.unwrap();
    client.send(Entry::new(1, Vec::<u8>::new())).await.unwrap();
    client.send(Entry::new(99, Vec::<u8>::new())).await.unwrap();
    // a response to the last request means the earlier two were dispatched
    client.request(Entry::new(2, Vec::<u8>::new())).await.unwrap();

    let after = global_metrics().snapshot();
    assert_eq!(after.handler_panics - before.handler_panics, 1);
    assert_eq!(after.routes_not_found - before.routes_not_found, 1);

    server.stop();
}
