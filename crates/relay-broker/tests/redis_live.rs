//! Round trip through a real Redis server.
//!
//! Ignored by default. Run with a server available:
//! `RELAY_TEST_REDIS_URL=redis://127.0.0.1:6379 cargo test -p relay-broker -- --ignored`

use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_broker::{Broker, RedisBroker};
use relay_core::MessageType;
use serde_json::json;

fn redis_url() -> String {
    std::env::var("RELAY_TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into())
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn publish_and_receive() {
    let broker = RedisBroker::new(&redis_url())
        .unwrap()
        .with_poll_interval(Duration::from_millis(200));
    broker.connect().await.unwrap();
    broker.subscribe("relay-test").await.unwrap();

    broker
        .publish(
            "relay-test",
            json!({"type": "send", "topic": "root/a", "conn_id": null, "n": 7}),
        )
        .await
        .unwrap();

    let mut received = None;
    for _ in 0..20 {
        if let Some(msg) = broker.get_message().await.unwrap() {
            received = Some(msg);
            break;
        }
    }
    let msg = received.expect("message within poll budget");
    assert_eq!(msg.kind, MessageType::Send);
    assert_eq!(msg.topic.as_deref(), Some("root/a"));
    assert_eq!(msg.data["n"], json!(7));

    broker.disconnect().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn reconnect_resubscribes() {
    let broker = RedisBroker::new(&redis_url())
        .unwrap()
        .with_poll_interval(Duration::from_millis(200));
    broker.subscribe("relay-test-reconnect").await.unwrap();
    broker.disconnect().await.unwrap();
    broker.connect().await.unwrap();

    broker
        .publish("relay-test-reconnect", json!({"type": "broadcast"}))
        .await
        .unwrap();

    let mut got = false;
    for _ in 0..20 {
        if broker.get_message().await.unwrap().is_some() {
            got = true;
            break;
        }
    }
    assert!(got);
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn subscribe_does_not_wait_for_poll() {
    let broker = Arc::new(
        RedisBroker::new(&redis_url())
            .unwrap()
            .with_poll_interval(Duration::from_secs(3)),
    );
    broker.connect().await.unwrap();
    broker.subscribe("relay-test-poll-a").await.unwrap();

    let listener = {
        let broker = broker.clone();
        tokio::spawn(async move { broker.get_message().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    broker.subscribe("relay-test-poll-b").await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    broker
        .publish("relay-test-poll-b", json!({"type": "broadcast", "n": 1}))
        .await
        .unwrap();
    let msg = listener.await.unwrap().unwrap().expect("message on new channel");
    assert_eq!(msg.data["n"], json!(1));

    broker.disconnect().await.unwrap();
}
