//! `GET /ws` upgrade handler.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use relay_broker::Broker;
use relay_core::ids::generate_conn_id;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::{bearer_token, is_authorized};
use crate::server::AppState;
use crate::transport::close_code;

use super::session::run_ws_session;

/// Query parameters accepted on the upgrade request.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Requested connection id. A fresh `conn_…` id is generated when absent.
    pub conn_id: Option<String>,
    /// Pattern to subscribe to immediately.
    pub topic: Option<String>,
}

impl ConnectParams {
    /// The requested id, or a generated one.
    pub fn resolve_conn_id(&self) -> String {
        self.conn_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map_or_else(generate_conn_id, str::to_string)
    }
}

/// Upgrade the request and hand the socket to a session.
pub async fn ws_handler<B: Broker + 'static>(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<AppState<B>>,
) -> Response {
    let conn_id = params.resolve_conn_id();
    let ws = ws.max_message_size(state.config.max_message_size);

    if !is_authorized(&headers, state.config.require_bearer) {
        warn!(conn_id, "rejecting connection without bearer token");
        return ws.on_upgrade(reject_unauthorized);
    }

    let token = bearer_token(&headers).map(str::to_string);
    debug!(conn_id, topic = ?params.topic, authenticated = token.is_some(), "upgrading connection");
    let orchestrator = state.orchestrator.clone();
    let config = state.config.clone();
    ws.on_upgrade(move |socket| {
        run_ws_session(socket, conn_id, params.topic, token, orchestrator, config)
    })
}

async fn reject_unauthorized(mut socket: WebSocket) {
    let frame = CloseFrame {
        code: close_code::POLICY_VIOLATION,
        reason: close_code::reason(close_code::POLICY_VIOLATION).into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "could not send policy close frame");
    }
}
