//! End-to-end feed behavior against the mock store.

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use common::{eventually, record, MockStore};
use webhook_feed::config::FeedConfig;
use webhook_feed::liveness::{ConnectionStatus, FeedSnapshot};
use webhook_feed::model::EndpointId;
use webhook_feed::store::HttpStore;
use webhook_feed::view::FeedBinding;

fn config(server: &MockStore) -> FeedConfig {
    let mut config = FeedConfig::default();
    config.store.base_url = server.base_url();
    config.fallback.ceiling_ms = 300;
    config.polling.interval_ms = 100;
    config.reconnect.base_delay_ms = 50;
    config.reconnect.max_delay_ms = 200;
    config
}

fn binding(server: &MockStore) -> FeedBinding<HttpStore> {
    let config = config(server);
    let store = Arc::new(HttpStore::new(&config.store).unwrap());
    FeedBinding::new(store, config)
}

fn ids(snapshot: &FeedSnapshot) -> Vec<u64> {
    snapshot.items.iter().map(|r| r.id).collect()
}

async fn wait_for(
    rx: &mut watch::Receiver<FeedSnapshot>,
    what: &str,
    condition: impl FnMut(&FeedSnapshot) -> bool,
) -> FeedSnapshot {
    match timeout(Duration::from_secs(5), rx.wait_for(condition)).await {
        Ok(Ok(snapshot)) => snapshot.clone(),
        _ => panic!("timed out waiting for {}", what),
    }
}

fn select(binding: &mut FeedBinding<HttpStore>, endpoint: &str) -> watch::Receiver<FeedSnapshot> {
    binding.select(Some(EndpointId::from(endpoint))).unwrap();
    binding.subscribe().unwrap()
}

async fn connected(binding: &mut FeedBinding<HttpStore>, endpoint: &str) -> watch::Receiver<FeedSnapshot> {
    let mut rx = select(binding, endpoint);
    wait_for(&mut rx, "connected and loaded", |s| {
        s.loaded && s.status == ConnectionStatus::Connected
    })
    .await;
    rx
}

#[tokio::test]
async fn test_push_delivers_live_requests() {
    let server = MockStore::start().await;
    server.insert("ep-1", record("ep-1", 1));
    server.insert("ep-1", record("ep-1", 2));

    let mut feed = binding(&server);
    let mut rx = connected(&mut feed, "ep-1").await;

    let snapshot = feed.snapshot().unwrap();
    assert_eq!(ids(&snapshot), vec![2, 1]);
    assert_eq!(snapshot.high_water_mark, 2);
    assert_eq!(snapshot.endpoint.as_ref().map(|e| e.request_count), Some(2));
    assert_eq!(
        snapshot.items[0].headers.get("content-type"),
        Some("application/json")
    );

    server.capture("ep-1", record("ep-1", 3));
    let snapshot = wait_for(&mut rx, "pushed request", |s| s.items.len() == 3).await;
    assert_eq!(ids(&snapshot), vec![3, 2, 1]);
    assert!(feed.is_recently_arrived(3));
    assert!(!feed.is_recently_arrived(2));

    // Same record again, then a new one: the duplicate leaves no trace.
    server.push("ep-1", json!({"type": "new_request", "data": record("ep-1", 3)}).to_string());
    server.capture("ep-1", record("ep-1", 4));
    let snapshot = wait_for(&mut rx, "second pushed request", |s| s.items.len() >= 4).await;
    assert_eq!(ids(&snapshot), vec![4, 3, 2, 1]);
    assert_eq!(feed.connection_status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let server = MockStore::start().await;
    let mut feed = binding(&server);
    let mut rx = connected(&mut feed, "ep-1").await;

    server.push("ep-1", "not json at all");
    server.push("ep-1", r#"{"type":"mystery","data":{}}"#);
    server.push("ep-1", r#"{"type":"new_request","data":{"id":"seven"}}"#);
    server.capture("ep-1", record("ep-1", 7));

    let snapshot = wait_for(&mut rx, "valid request after garbage", |s| !s.items.is_empty()).await;
    assert_eq!(ids(&snapshot), vec![7]);
    assert_eq!(snapshot.status, ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_server_ping_is_answered_and_sends_pass_through() {
    let server = MockStore::start().await;
    let mut feed = binding(&server);
    let _rx = connected(&mut feed, "ep-1").await;

    server.push("ep-1", r#"{"type":"ping"}"#);
    feed.send_message(json!({"type": "hello", "data": {"client": "test"}}));

    let answered = eventually(Duration::from_secs(5), || async {
        let received = server.received();
        received.iter().any(|f| f.contains("pong")) && received.iter().any(|f| f.contains("hello"))
    })
    .await;
    assert!(answered, "received: {:?}", server.received());
}

#[tokio::test]
async fn test_falls_back_to_polling_then_hands_over() {
    let server = MockStore::start().await;
    server.set_ws_enabled(false);
    server.insert("ep-1", record("ep-1", 1));

    let mut feed = binding(&server);
    let mut rx = select(&mut feed, "ep-1");

    let snapshot = wait_for(&mut rx, "polling", |s| s.status == ConnectionStatus::Polling).await;
    assert!(snapshot.loaded);

    server.insert("ep-1", record("ep-1", 5));
    let snapshot = wait_for(&mut rx, "polled request", |s| s.items.len() == 2).await;
    assert_eq!(ids(&snapshot), vec![5, 1]);
    assert!(snapshot.is_recently_arrived(5));
    assert_eq!(snapshot.status, ConnectionStatus::Polling);

    server.set_ws_enabled(true);
    wait_for(&mut rx, "channel open", |s| s.status == ConnectionStatus::Connected).await;

    // Polling stopped with the open: a record only in the store stays unseen.
    sleep(Duration::from_millis(50)).await;
    let calls = server.list_calls();
    server.insert("ep-1", record("ep-1", 6));
    sleep(Duration::from_millis(500)).await;
    assert_eq!(server.list_calls(), calls);
    assert_eq!(ids(&feed.snapshot().unwrap()), vec![5, 1]);
    assert_eq!(feed.connection_status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_reconnects_and_refreshes_after_loss() {
    let server = MockStore::start().await;
    server.insert("ep-1", record("ep-1", 1));

    let mut feed = binding(&server);
    let mut rx = connected(&mut feed, "ep-1").await;

    // Captured while the channel is down: only the refresh can find it.
    server.insert("ep-1", record("ep-1", 2));
    server.drop_connections();

    let snapshot = wait_for(&mut rx, "refresh after reconnect", |s| {
        s.status == ConnectionStatus::Connected && s.items.len() == 2
    })
    .await;
    assert_eq!(ids(&snapshot), vec![2, 1]);
    assert!(!snapshot.is_recently_arrived(2));
    assert_eq!(snapshot.high_water_mark, 2);
}

#[tokio::test]
async fn test_switching_endpoints_isolates_feeds() {
    let server = MockStore::start().await;
    server.insert("ep-a", record("ep-a", 1));
    server.insert("ep-a", record("ep-a", 2));
    server.insert("ep-b", record("ep-b", 10));

    let mut feed = binding(&server);
    let _old = connected(&mut feed, "ep-a").await;
    let mut rx = connected(&mut feed, "ep-b").await;
    assert_eq!(ids(&feed.snapshot().unwrap()), vec![10]);

    // Old endpoint's traffic and a misaddressed record on the new channel.
    server.capture("ep-a", record("ep-a", 3));
    server.push(
        "ep-b",
        json!({"type": "new_request", "data": record("ep-a", 4)}).to_string(),
    );
    server.capture("ep-b", record("ep-b", 11));

    let snapshot = wait_for(&mut rx, "new endpoint request", |s| s.items.len() >= 2).await;
    assert_eq!(ids(&snapshot), vec![11, 10]);
    assert_eq!(snapshot.tag.endpoint, EndpointId::from("ep-b"));

    // Only the current session's socket stays open.
    assert!(eventually(Duration::from_secs(5), || async { server.open_sockets() == 1 }).await);
}

#[tokio::test]
async fn test_unmount_closes_channel() {
    let server = MockStore::start().await;
    let mut feed = binding(&server);
    let _rx = connected(&mut feed, "ep-1").await;
    assert!(eventually(Duration::from_secs(5), || async { server.open_sockets() == 1 }).await);

    feed.unmount();
    assert_eq!(feed.connection_status(), ConnectionStatus::Disconnected);
    assert!(feed.items().is_empty());
    assert!(eventually(Duration::from_secs(5), || async { server.open_sockets() == 0 }).await);
}

#[tokio::test]
async fn test_delete_and_clear_go_through_store() {
    let server = MockStore::start().await;
    for id in 1..=3 {
        server.insert("ep-1", record("ep-1", id));
    }

    let mut feed = binding(&server);
    let _rx = connected(&mut feed, "ep-1").await;

    feed.delete_request(2).await.unwrap();
    assert_eq!(ids(&feed.snapshot().unwrap()), vec![3, 1]);
    assert_eq!(server.record_ids("ep-1"), vec![1, 3]);

    assert!(feed.delete_request(99).await.is_err());

    feed.clear_requests().await.unwrap();
    let snapshot = feed.snapshot().unwrap();
    assert!(snapshot.items.is_empty());
    assert_eq!(snapshot.high_water_mark, 3);
    assert!(server.record_ids("ep-1").is_empty());
}
