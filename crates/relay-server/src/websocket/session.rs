//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::histogram;
use relay_broker::Broker;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::metrics::CONNECTION_DURATION_SECONDS;
use crate::orchestrator::Orchestrator;
use crate::transport::{ChannelTransport, Outbound, close_code};

/// Shortest allowed ping interval.
const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the socket with the orchestrator
/// 2. Spawns a writer that drains the outbound queue and sends pings
/// 3. Feeds inbound text (or UTF-8 binary) frames to the orchestrator
/// 4. Deregisters on disconnect
#[instrument(skip_all, fields(conn_id = %conn_id, authenticated = bearer_token.is_some()))]
pub async fn run_ws_session<B: Broker + 'static>(
    socket: WebSocket,
    conn_id: String,
    topic: Option<String>,
    bearer_token: Option<String>,
    orchestrator: Arc<Orchestrator<B>>,
    config: Arc<ServerConfig>,
) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (transport, outbound) =
        ChannelTransport::channel(config.send_queue_capacity, config.send_timeout);

    let conn = match orchestrator
        .new_authenticated_connection(transport, conn_id, topic.as_deref(), bearer_token)
        .await
    {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "connection handshake failed");
            return;
        }
    };

    let mut writer = tokio::spawn(write_frames(
        ws_tx,
        outbound,
        config.heartbeat_interval.max(MIN_HEARTBEAT),
    ));

    loop {
        tokio::select! {
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    orchestrator.handle_text(&conn, text.as_str()).await;
                }
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => orchestrator.handle_text(&conn, text).await,
                    Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(code = frame.map(|f| f.code), "client sent close frame");
                    break;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "websocket read failed");
                    break;
                }
                None => break,
            },
            _ = &mut writer => {
                debug!("writer stopped");
                break;
            }
        }
    }

    writer.abort();
    let _ = orchestrator.remove_connection(&conn);
    let age = conn.age();
    histogram!(CONNECTION_DURATION_SECONDS).record(age.as_secs_f64());
    info!(duration_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX), "client disconnected");
}

/// Forward queued frames to the socket and ping on `heartbeat`.
///
/// Stops after a close frame or the first failed write.
async fn write_frames(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    heartbeat: Duration,
) {
    let mut ping = tokio::time::interval(heartbeat);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close(code)) => {
                    let frame = CloseFrame {
                        code,
                        reason: close_code::reason(code).into(),
                    };
                    let _ = ws_tx.send(Message::Close(Some(frame))).await;
                    break;
                }
                None => break,
            },
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}
