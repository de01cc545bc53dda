//! # relay-server
//!
//! Routes JSON messages between WebSocket clients, across processes, through a
//! pluggable pub/sub broker.
//!
//! - **Connections**: [`Connection`] owns a [`Transport`], a reassignable id,
//!   and a set of topic patterns
//! - **Registry**: [`ConnectionRegistry`] holds live connections for fan-out
//! - **Orchestrator**: [`Orchestrator`] handles inbound messages, publishes
//!   to the broker, listens for broker messages, and dispatches them locally
//! - **Tasks**: [`TaskGroup`] tracks every fire-and-forget dispatch so
//!   shutdown can drain it
//! - **HTTP**: [`RelayServer`] exposes `/ws`, `/health`, and `/metrics`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod connection;
mod dispatch;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod subscriptions;
pub mod tasks;
pub mod transport;
pub mod websocket;

pub use config::ServerConfig;
pub use connection::Connection;
pub use errors::{ConnectionError, ConnectionErrorKind, ServerError, report_error};
pub use orchestrator::Orchestrator;
pub use registry::ConnectionRegistry;
pub use server::RelayServer;
pub use shutdown::{DrainReport, ShutdownCoordinator};
pub use tasks::TaskGroup;
pub use transport::{ChannelTransport, Outbound, Transport, TransportError, close_code};
