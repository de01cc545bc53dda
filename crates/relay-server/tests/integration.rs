//! End-to-end tests using a real WebSocket client against the axum server
//! and an in-process broker.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relay_broker::MemoryBroker;
use relay_server::{Orchestrator, RelayServer, ServerConfig, close_code};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    base_url: String,
    server: RelayServer<MemoryBroker>,
}

impl TestServer {
    fn orchestrator(&self) -> &Arc<Orchestrator<MemoryBroker>> {
        self.server.orchestrator()
    }

    /// Connect with `conn_id` and wait until the server has registered it.
    async fn connect(&self, conn_id: &str) -> WsStream {
        let before = self.orchestrator().connection_count();
        let (ws, _) = connect_async(format!("{}?conn_id={conn_id}", self.base_url))
            .await
            .unwrap();
        self.wait_for(|o| o.connection_count() > before).await;
        ws
    }

    async fn wait_for(&self, check: impl Fn(&Orchestrator<MemoryBroker>) -> bool) {
        timeout(TIMEOUT, async {
            while !check(self.orchestrator().as_ref()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    async fn wait_subscribed(&self, conn_id: &str, pattern: &str) {
        self.wait_for(|o| {
            o.registry()
                .find_by_id(conn_id)
                .is_some_and(|c| c.is_subscribed(pattern))
        })
        .await;
    }
}

async fn boot_server(config: ServerConfig) -> TestServer {
    let orchestrator = Arc::new(Orchestrator::new(MemoryBroker::new(), "relay"));
    orchestrator.startup().await.unwrap();
    let server = RelayServer::new(config, orchestrator);
    let addr = server.listen().await.unwrap();
    TestServer {
        base_url: format!("ws://{addr}/ws"),
        server,
    }
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next text frame as JSON, skipping pings.
async fn recv_json(ws: &mut WsStream, wait: Duration) -> Option<Value> {
    timeout(wait, async {
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).ok();
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

#[tokio::test]
async fn publish_reaches_subscribed_clients_only() {
    let ts = boot_server(ServerConfig::default()).await;
    let mut publisher = ts.connect("pub").await;
    let mut subscriber = ts.connect("sub").await;
    let mut bystander = ts.connect("other").await;

    send_json(&mut subscriber, json!({"type": "subscribe", "topic": "root/+"})).await;
    ts.wait_subscribed("sub", "root/+").await;

    send_json(
        &mut publisher,
        json!({"type": "send", "topic": "root/sub1", "msg": "hello"}),
    )
    .await;

    assert_eq!(
        recv_json(&mut subscriber, TIMEOUT).await,
        Some(json!({"msg": "hello"}))
    );
    assert!(recv_json(&mut bystander, QUIET).await.is_none());
    assert!(recv_json(&mut publisher, QUIET).await.is_none());

    ts.orchestrator().shutdown().await;
}

#[tokio::test]
async fn initial_topic_from_query_subscribes() {
    let ts = boot_server(ServerConfig::default()).await;
    let (mut sub, _) = connect_async(format!("{}?conn_id=q&topic=news/%23", ts.base_url))
        .await
        .unwrap();
    ts.wait_subscribed("q", "news/#").await;
    let mut publisher = ts.connect("p").await;

    send_json(&mut publisher, json!({"type": "send", "topic": "news/a/b", "n": 1})).await;
    assert_eq!(recv_json(&mut sub, TIMEOUT).await.unwrap()["n"], 1);

    ts.orchestrator().shutdown().await;
}

#[tokio::test]
async fn broadcast_reaches_every_client() {
    let ts = boot_server(ServerConfig::default()).await;
    let mut a = ts.connect("a").await;
    let mut b = ts.connect("b").await;

    send_json(&mut a, json!({"type": "broadcast", "note": "all"})).await;

    assert_eq!(recv_json(&mut a, TIMEOUT).await.unwrap()["note"], "all");
    assert_eq!(recv_json(&mut b, TIMEOUT).await.unwrap()["note"], "all");

    ts.orchestrator().shutdown().await;
}

#[tokio::test]
async fn send_by_conn_id_targets_one_client() {
    let ts = boot_server(ServerConfig::default()).await;
    let mut a = ts.connect("a").await;
    let mut b = ts.connect("b").await;

    send_json(&mut a, json!({"type": "send_by_conn_id", "conn_id": "b", "dm": true})).await;

    assert_eq!(recv_json(&mut b, TIMEOUT).await.unwrap()["dm"], true);
    assert!(recv_json(&mut a, QUIET).await.is_none());

    ts.orchestrator().shutdown().await;
}

#[tokio::test]
async fn invalid_message_gets_error_and_connection_stays_open() {
    let ts = boot_server(ServerConfig::default()).await;
    let mut a = ts.connect("a").await;

    send_json(&mut a, json!({"type": "send"})).await;
    let reply = recv_json(&mut a, TIMEOUT).await.unwrap();
    assert_eq!(reply["error"], "Invalid message type \"send\" with no topic");

    send_json(&mut a, json!({"type": "broadcast", "still": "here"})).await;
    assert_eq!(recv_json(&mut a, TIMEOUT).await.unwrap()["still"], "here");
    assert_eq!(ts.orchestrator().connection_count(), 1);

    ts.orchestrator().shutdown().await;
}

#[tokio::test]
async fn set_conn_id_notifies_client() {
    let ts = boot_server(ServerConfig::default()).await;
    let mut a = ts.connect("a").await;

    let conn = ts.orchestrator().registry().find_by_id("a").unwrap();
    ts.orchestrator().set_conn_id(&conn, "renamed");

    assert_eq!(
        recv_json(&mut a, TIMEOUT).await.unwrap(),
        json!({"type": "set_conn_id", "conn_id": "renamed"})
    );

    ts.orchestrator().shutdown().await;
}

#[tokio::test]
async fn client_disconnect_deregisters() {
    let ts = boot_server(ServerConfig::default()).await;
    let mut a = ts.connect("a").await;
    let _b = ts.connect("b").await;

    a.close(None).await.unwrap();
    ts.wait_for(|o| o.connection_count() == 1).await;
    assert!(ts.orchestrator().registry().find_by_id("a").is_none());

    ts.orchestrator().shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_clients_with_service_restart() {
    let ts = boot_server(ServerConfig::default()).await;
    let mut a = ts.connect("a").await;

    ts.orchestrator().shutdown().await;

    let frame = timeout(TIMEOUT, async {
        while let Some(Ok(msg)) = a.next().await {
            if let Message::Close(frame) = msg {
                return frame;
            }
        }
        None
    })
    .await
    .unwrap()
    .expect("close frame");
    assert_eq!(u16::from(frame.code), close_code::SERVICE_RESTART);
    assert_eq!(ts.orchestrator().connection_count(), 0);
}

#[tokio::test]
async fn missing_bearer_is_closed_with_policy_violation() {
    let config = ServerConfig {
        require_bearer: true,
        ..ServerConfig::default()
    };
    let ts = boot_server(config).await;

    let (mut ws, _) = connect_async(format!("{}?conn_id=anon", ts.base_url))
        .await
        .unwrap();
    let msg = timeout(TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
    let Message::Close(Some(frame)) = &msg else {
        panic!("expected close frame, got {msg:?}");
    };
    assert_eq!(u16::from(frame.code), close_code::POLICY_VIOLATION);
    assert_eq!(ts.orchestrator().connection_count(), 0);

    let mut request = format!("{}?conn_id=authed", ts.base_url)
        .into_client_request()
        .unwrap();
    let _ = request
        .headers_mut()
        .insert("authorization", HeaderValue::from_static("Bearer token"));
    let (_ws, _) = connect_async(request).await.unwrap();
    ts.wait_for(|o| o.registry().find_by_id("authed").is_some()).await;
    let authed = ts.orchestrator().registry().find_by_id("authed").unwrap();
    assert_eq!(authed.bearer_token(), Some("token"));

    ts.orchestrator().shutdown().await;
}
