//! Connection orchestrator.
//!
//! Owns the registry, the broker, and the task group. Client messages are
//! published to the broker channel; a background listener reads the channel
//! back and fans each message out to local connections. Every server in a
//! deployment therefore sees every message, and each delivers to its own
//! clients.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use relay_broker::{AnyBroker, Broker, BrokerError, ExponentialBackoff, ReconnectConfig, create_broker};
use relay_core::{ConnTarget, Message};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::connection::Connection;
use crate::dispatch::Dispatcher;
use crate::errors::{ConnectionError, ConnectionErrorKind, report_error};
use crate::metrics::{
    BROKER_RECONNECTS_TOTAL, CONNECTIONS_ACTIVE, CONNECTIONS_CLOSED_TOTAL,
    CONNECTIONS_OPENED_TOTAL, MESSAGES_PUBLISHED_TOTAL, MESSAGES_RECEIVED_TOTAL,
};
use crate::registry::ConnectionRegistry;
use crate::subscriptions::{handle_subscription, is_subscription_message};
use crate::tasks::TaskGroup;
use crate::transport::{Transport, TransportError, close_code};

/// How long shutdown waits for the listener before aborting it.
const LISTENER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct Listener {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Routes messages between local connections and the broker.
pub struct Orchestrator<B: Broker = AnyBroker> {
    broker: Arc<B>,
    channel: String,
    registry: Arc<ConnectionRegistry>,
    tasks: Arc<TaskGroup>,
    dispatcher: Dispatcher,
    listener: Mutex<Option<Listener>>,
    reconnect: ReconnectConfig,
}

impl Orchestrator<AnyBroker> {
    /// Build an orchestrator over the broker named by `url`.
    pub fn from_url(url: &str, channel: impl Into<String>) -> Result<Self, BrokerError> {
        Ok(Self::new(create_broker(url)?, channel))
    }
}

impl<B: Broker + 'static> Orchestrator<B> {
    /// Orchestrator publishing to and listening on `channel`.
    pub fn new(broker: B, channel: impl Into<String>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let tasks = Arc::new(TaskGroup::new());
        Self {
            broker: Arc::new(broker),
            channel: channel.into(),
            dispatcher: Dispatcher::new(registry.clone(), tasks.clone()),
            registry,
            tasks,
            listener: Mutex::new(None),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Override the listener's reconnect backoff.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// The underlying broker.
    pub fn broker(&self) -> &Arc<B> {
        &self.broker
    }

    /// Broker channel shared by every server.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Live connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Dispatch tasks not yet reaped.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the broker listener is running.
    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .is_some_and(|l| !l.handle.is_finished())
    }

    // ── connection lifecycle ──

    /// Accept `transport` and register it.
    ///
    /// The connection is not visible to fan-out until the handshake succeeds.
    pub async fn new_connection<T: Transport + 'static>(
        &self,
        transport: T,
        id: impl Into<String>,
        topic: Option<&str>,
    ) -> Result<Arc<Connection>, TransportError> {
        self.new_authenticated_connection(transport, id, topic, None)
            .await
    }

    /// [`new_connection`](Self::new_connection) carrying the client's bearer token.
    pub async fn new_authenticated_connection<T: Transport + 'static>(
        &self,
        transport: T,
        id: impl Into<String>,
        topic: Option<&str>,
        bearer_token: Option<String>,
    ) -> Result<Arc<Connection>, TransportError> {
        let conn = Arc::new(
            Connection::new(Box::new(transport), id, topic).with_bearer_token(bearer_token),
        );
        conn.accept().await?;
        self.registry.add(conn.clone());

        counter!(CONNECTIONS_OPENED_TOTAL).increment(1);
        self.record_active();
        info!(conn_id = %conn.id(), topics = ?conn.topics(), "connection registered");
        Ok(conn)
    }

    /// Close the transport with `code` and deregister.
    pub async fn close_connection(&self, conn: &Connection, code: u16) {
        if let Err(e) = conn.close(code).await {
            debug!(conn_id = %conn.id(), error = %e, "close frame not delivered");
        }
        let _ = self.remove_connection(conn);
    }

    /// Deregister without touching the transport.
    ///
    /// Returns `false` if the connection was already gone.
    pub fn remove_connection(&self, conn: &Connection) -> bool {
        let removed = self.registry.remove(conn.key());
        if removed {
            counter!(CONNECTIONS_CLOSED_TOTAL).increment(1);
            self.record_active();
            info!(conn_id = %conn.id(), "connection removed");
        }
        removed
    }

    /// Replace the connection's id and tell the client.
    pub fn set_conn_id(&self, conn: &Arc<Connection>, id: impl Into<String>) {
        let id = id.into();
        let previous = conn.set_id(id.clone());
        debug!(previous, conn_id = %id, "connection id reassigned");
        self.dispatcher.notify_conn_id(conn.clone(), &id);
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_active(&self) {
        gauge!(CONNECTIONS_ACTIVE).set(self.registry.len() as f64);
    }

    // ── outbound ──

    /// Deliver `payload` to connections subscribed to a pattern matching `topic`.
    pub fn send(&self, topic: impl Into<String>, payload: Map<String, Value>) {
        self.dispatcher.send(topic.into(), payload);
    }

    /// Deliver `payload` to every connection.
    pub fn broadcast(&self, payload: Map<String, Value>) {
        self.dispatcher.broadcast(payload);
    }

    /// Deliver `payload` to the connection(s) addressed by `target`.
    pub fn send_by_conn_id(&self, target: impl Into<ConnTarget>, payload: Map<String, Value>) {
        self.dispatcher.send_by_conn_id(target.into(), payload);
    }

    /// Route a message by its type.
    pub fn send_msg(&self, message: Message) {
        self.dispatcher.send_msg(message);
    }

    // ── inbound ──

    /// Apply a subscription change or publish `message` to the broker.
    pub async fn receive(
        &self,
        conn: &Arc<Connection>,
        message: Message,
    ) -> Result<(), ConnectionError> {
        if is_subscription_message(&message) {
            let _ = handle_subscription(conn, &message)
                .map_err(|kind| ConnectionError::new(conn.clone(), kind))?;
            return Ok(());
        }

        let kind = message.kind;
        self.broker
            .publish(&self.channel, message.into_envelope())
            .await
            .map_err(|e| ConnectionError::new(conn.clone(), ConnectionErrorKind::Publish(e)))?;
        counter!(MESSAGES_PUBLISHED_TOTAL).increment(1);
        debug!(conn_id = %conn.id(), %kind, "published client message");
        Ok(())
    }

    /// Decode, validate, and receive one text frame.
    ///
    /// Failures are answered on the connection; it stays open.
    pub async fn handle_text(&self, conn: &Arc<Connection>, text: &str) {
        let result = match serde_json::from_str::<Value>(text)
            .map_err(relay_core::EnvelopeError::from)
            .and_then(Message::from_client_payload)
        {
            Ok(message) => self.receive(conn, message).await,
            Err(e) => Err(ConnectionError::new(conn.clone(), e)),
        };
        if let Err(err) = result {
            report_error(err).await;
        }
    }

    // ── lifecycle ──

    /// Connect the broker, subscribe to the channel, and start the listener.
    ///
    /// A second call while the listener is running is ignored.
    #[instrument(skip_all, fields(channel = %self.channel, broker = self.broker.name()))]
    pub async fn startup(&self) -> Result<(), BrokerError> {
        if self.is_listening() {
            warn!("orchestrator already started");
            return Ok(());
        }

        self.broker.connect().await?;
        self.broker.subscribe(&self.channel).await?;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_listener(
            self.broker.clone(),
            self.channel.clone(),
            self.dispatcher.clone(),
            self.reconnect.clone(),
            cancel.clone(),
        ));

        let previous = self.listener.lock().replace(Listener { cancel, handle });
        if let Some(previous) = previous {
            previous.cancel.cancel();
            previous.handle.abort();
        }
        info!("orchestrator started");
        Ok(())
    }

    /// Stop everything: pending dispatches, connections, listener, broker.
    ///
    /// Safe to call more than once.
    #[instrument(skip_all, fields(channel = %self.channel))]
    pub async fn shutdown(&self) {
        let aborted = self.tasks.shutdown().await;

        let connections = self.registry.drain();
        let closed = connections.len();
        let _ = join_all(connections.iter().map(|conn| async move {
            if let Err(e) = conn.close(close_code::SERVICE_RESTART).await {
                debug!(conn_id = %conn.id(), error = %e, "close frame not delivered");
            }
        }))
        .await;
        counter!(CONNECTIONS_CLOSED_TOTAL).increment(closed as u64);
        self.record_active();

        let listener = self.listener.lock().take();
        if let Some(Listener { cancel, mut handle }) = listener {
            cancel.cancel();
            if tokio::time::timeout(LISTENER_STOP_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                warn!("broker listener did not stop in time, aborting");
                handle.abort();
            }
        }

        if let Err(e) = self.broker.disconnect().await {
            warn!(error = %e, "broker disconnect failed");
        }
        info!(aborted, closed, "orchestrator shut down");
    }
}

impl<B: Broker> std::fmt::Debug for Orchestrator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("broker", &self.broker.name())
            .field("channel", &self.channel)
            .field("connections", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Read the broker channel until cancelled, routing every message locally.
///
/// Connection-level broker failures trigger a reconnect after an exponential
/// backoff delay; anything else is logged and skipped.
async fn run_listener<B: Broker + 'static>(
    broker: Arc<B>,
    channel: String,
    dispatcher: Dispatcher,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut backoff = ExponentialBackoff::new(reconnect);
    debug!(channel, "broker listener started");

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = broker.get_message() => result,
        };

        match result {
            Ok(Some(message)) => {
                backoff.reset();
                counter!(MESSAGES_RECEIVED_TOTAL).increment(1);
                dispatcher.send_msg(message);
            }
            Ok(None) => backoff.reset(),
            Err(e) if e.is_retryable() => {
                let delay = backoff.next_delay();
                warn!(
                    error = %e,
                    attempt = backoff.attempt(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "broker connection lost, reconnecting"
                );
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
                counter!(BROKER_RECONNECTS_TOTAL).increment(1);
                if let Err(e) = reconnect_broker(broker.as_ref(), &channel).await {
                    warn!(error = %e, "broker reconnect failed");
                } else {
                    info!(channel, "broker reconnected");
                }
            }
            Err(e) => warn!(error = %e, "skipping undeliverable broker message"),
        }
    }

    debug!(channel, "broker listener stopped");
}

async fn reconnect_broker<B: Broker>(broker: &B, channel: &str) -> Result<(), BrokerError> {
    if let Err(e) = broker.disconnect().await {
        debug!(error = %e, "disconnect before reconnect failed");
    }
    broker.connect().await?;
    broker.subscribe(channel).await
}
