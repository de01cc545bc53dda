//! # relay-broker
//!
//! Publish/subscribe backends that carry message envelopes between relay
//! processes.
//!
//! - [`Broker`]: the capability every backend implements
//! - [`MemoryBroker`]: in-process queue for single-node deployments and tests
//! - [`RedisBroker`]: Redis pub/sub for multi-process fan-out
//! - [`AnyBroker`] / [`create_broker`]: backend selection by URL scheme
//! - [`ExponentialBackoff`]: reconnect pacing for broker listeners

#![deny(unsafe_code)]

pub mod backoff;
pub mod errors;
pub mod factory;
pub mod memory;
pub mod redis_broker;
pub mod traits;

pub use backoff::{ExponentialBackoff, ReconnectConfig};
pub use errors::{BrokerError, Result};
pub use factory::{AnyBroker, BrokerKind, create_broker};
pub use memory::MemoryBroker;
pub use redis_broker::RedisBroker;
pub use traits::Broker;
