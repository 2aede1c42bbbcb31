//! Feed client tests against a local WebSocket peer

use std::time::{Duration, Instant};

use ais_live::{
    config::FeedConfig,
    database::MemoryStore,
    feed::{FeedClient, FeedSource},
    ingest,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

fn feed_config(url: String) -> FeedConfig {
    FeedConfig {
        url,
        api_key: "test-key".to_string(),
        bounding_boxes: vec![[[40.0, -74.5], [42.0, -68.0]]],
        message_types: vec!["PositionReport".to_string()],
        close_timeout: Duration::from_secs(1),
    }
}

fn report(mmsi: u32) -> String {
    json!({
        "MessageType": "PositionReport",
        "Message": {"PositionReport": {"TrueHeading": 90}},
        "MetaData": {
            "MMSI": mmsi,
            "ShipName": "FEED TEST",
            "latitude": 41.0,
            "longitude": -71.0,
            "time_utc": "2024-06-01 12:00:00.123456 +0000 UTC"
        }
    })
    .to_string()
}

/// Accept one client, record its subscription, send `frames`, then either
/// close or wait for the client's close and acknowledge it.
async fn start_peer(frames: Vec<Message>, close_after: bool) -> (String, JoinHandle<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();

        let subscription = match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("Expected subscription text, got {:?}", other),
        };

        for frame in frames {
            ws.send(frame).await.unwrap();
        }

        if close_after {
            ws.close(None).await.unwrap();
        }
        // Drain; replies to a client close are flushed while reading
        while let Some(Ok(_)) = ws.next().await {}

        subscription
    });

    (url, handle)
}

#[tokio::test]
async fn test_sends_subscription_and_yields_frames() {
    let (url, peer) = start_peer(
        vec![
            Message::Text(report(111111111).into()),
            Message::Binary(report(222222222).into_bytes().into()),
        ],
        false,
    )
    .await;

    let mut client = FeedClient::connect(&feed_config(url)).await.unwrap();

    let first = client.recv().await.unwrap().unwrap();
    assert_eq!(first, report(111111111).into_bytes());
    let second = client.recv().await.unwrap().unwrap();
    assert_eq!(second, report(222222222).into_bytes());

    client.close(Duration::from_secs(1)).await.unwrap();

    let subscription = peer.await.unwrap();
    assert_eq!(
        subscription,
        json!({
            "Apikey": "test-key",
            "BoundingBoxes": [[[40.0, -74.5], [42.0, -68.0]]],
            "FilterMessageTypes": ["PositionReport"]
        })
    );
}

#[tokio::test]
async fn test_peer_close_ends_sequence() {
    let (url, peer) = start_peer(vec![Message::Text(report(111111111).into())], true).await;

    let mut client = FeedClient::connect(&feed_config(url)).await.unwrap();
    assert!(client.recv().await.unwrap().is_some());
    assert!(client.recv().await.unwrap().is_none());

    drop(client);
    peer.await.unwrap();
}

#[tokio::test]
async fn test_close_wait_is_bounded_when_peer_is_silent() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let peer = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        ws.next().await.unwrap().unwrap();
        // Hold the socket open without reading or acknowledging the close
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(ws);
    });

    let mut client = FeedClient::connect(&feed_config(url)).await.unwrap();

    let wait = Duration::from_millis(300);
    let started = Instant::now();
    client.close(wait).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= wait, "close returned early: {:?}", elapsed);
    assert!(elapsed < wait + Duration::from_secs(1), "close hung: {:?}", elapsed);
    peer.abort();
}

#[tokio::test]
async fn test_ingest_from_feed_skips_bad_messages() {
    let (url, peer) = start_peer(
        vec![
            Message::Text(report(111111111).into()),
            Message::Text("{\"MessageType\": 42}".into()),
            Message::Text(report(222222222).into()),
        ],
        true,
    )
    .await;

    let client = FeedClient::connect(&feed_config(url)).await.unwrap();
    let store = MemoryStore::new();

    let stats = ingest::run(
        client,
        &store,
        std::future::pending(),
        Duration::from_secs(1),
    )
    .await
    .unwrap();

    assert_eq!(stats.stored, 2);
    assert_eq!(stats.skipped, 1);
    assert_eq!(store.len().await, 2);
    peer.await.unwrap();
}
