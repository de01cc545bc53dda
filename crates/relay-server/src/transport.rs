//! Client transport abstraction.
//!
//! The orchestrator never touches a socket directly. Each connection owns a
//! [`Transport`]; the WebSocket adapter uses [`ChannelTransport`], which
//! queues frames for a single writer task so the socket never sees
//! concurrent writes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

/// WebSocket close codes used by the relay.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Policy violation (e.g. missing credentials).
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Server is restarting; clients should reconnect.
    pub const SERVICE_RESTART: u16 = 1012;

    /// Human-readable reason sent with the close frame.
    pub fn reason(code: u16) -> &'static str {
        match code {
            NORMAL => "normal closure",
            POLICY_VIOLATION => "policy violation",
            SERVICE_RESTART => "service restart",
            _ => "",
        }
    }
}

/// Failure to hand a frame to the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The client side is gone.
    #[error("transport closed")]
    Closed,
    /// The outbound queue stayed full for too long.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Bidirectional client socket, as seen by the orchestrator.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Complete the handshake. Called once before registration.
    async fn accept(&self) -> Result<(), TransportError>;

    /// Send one text frame.
    async fn send_text(&self, text: Arc<String>) -> Result<(), TransportError>;

    /// Close the socket with `code`.
    async fn close(&self, code: u16) -> Result<(), TransportError>;
}

/// A frame queued for the socket writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame.
    Text(Arc<String>),
    /// Close frame; the writer stops after sending it.
    Close(u16),
}

/// [`Transport`] backed by a bounded queue drained by a writer task.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Outbound>,
    send_timeout: Duration,
}

impl ChannelTransport {
    /// Wrap an existing sender.
    pub fn new(tx: mpsc::Sender<Outbound>, send_timeout: Duration) -> Self {
        Self { tx, send_timeout }
    }

    /// Create a transport and the receiver its writer task should drain.
    pub fn channel(capacity: usize, send_timeout: Duration) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx, send_timeout), rx)
    }

    async fn push(&self, frame: Outbound) -> Result<(), TransportError> {
        self.tx
            .send_timeout(frame, self.send_timeout)
            .await
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => TransportError::Timeout(self.send_timeout),
                SendTimeoutError::Closed(_) => TransportError::Closed,
            })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn accept(&self) -> Result<(), TransportError> {
        if self.tx.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn send_text(&self, text: Arc<String>) -> Result<(), TransportError> {
        self.push(Outbound::Text(text)).await
    }

    async fn close(&self, code: u16) -> Result<(), TransportError> {
        self.push(Outbound::Close(code)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn frames_arrive_in_order() {
        let (transport, mut rx) = ChannelTransport::channel(8, Duration::from_secs(1));
        transport.accept().await.unwrap();
        transport.send_text(Arc::new("a".into())).await.unwrap();
        transport.close(close_code::NORMAL).await.unwrap();

        assert_eq!(rx.recv().await, Some(Outbound::Text(Arc::new("a".into()))));
        assert_eq!(rx.recv().await, Some(Outbound::Close(1000)));
    }

    #[tokio::test]
    async fn closed_receiver_fails() {
        let (transport, rx) = ChannelTransport::channel(8, Duration::from_secs(1));
        drop(rx);
        assert_matches!(transport.accept().await, Err(TransportError::Closed));
        assert_matches!(
            transport.send_text(Arc::new("x".into())).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_times_out() {
        let (transport, _rx) = ChannelTransport::channel(1, Duration::from_millis(50));
        transport.send_text(Arc::new("1".into())).await.unwrap();
        assert_matches!(
            transport.send_text(Arc::new("2".into())).await,
            Err(TransportError::Timeout(_))
        );
    }

    #[test]
    fn close_reasons() {
        assert_eq!(close_code::reason(close_code::SERVICE_RESTART), "service restart");
        assert_eq!(close_code::reason(4000), "");
    }
}
