//! Backend selection by URL scheme.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use relay_core::Message;
use serde_json::Value;

use crate::errors::{BrokerError, Result};
use crate::memory::MemoryBroker;
use crate::redis_broker::RedisBroker;
use crate::traits::Broker;

/// Known broker backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerKind {
    /// In-process queue (`memory://`).
    Memory,
    /// Redis pub/sub (`redis://`, `rediss://`).
    Redis,
}

impl BrokerKind {
    /// Backend for the scheme of `url`.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split_once("://").map_or("", |(scheme, _)| scheme);
        scheme
            .parse()
            .map_err(|()| BrokerError::Config(format!("Unknown broker url: {url}")))
    }
}

impl FromStr for BrokerKind {
    type Err = ();

    fn from_str(scheme: &str) -> std::result::Result<Self, ()> {
        match scheme.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" | "rediss" => Ok(Self::Redis),
            _ => Err(()),
        }
    }
}

impl fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        })
    }
}

/// Any built-in broker, dispatching statically to the concrete backend.
#[derive(Debug)]
pub enum AnyBroker {
    /// In-process backend.
    Memory(MemoryBroker),
    /// Redis backend.
    Redis(RedisBroker),
}

impl AnyBroker {
    /// Which backend this is.
    pub fn kind(&self) -> BrokerKind {
        match self {
            Self::Memory(_) => BrokerKind::Memory,
            Self::Redis(_) => BrokerKind::Redis,
        }
    }
}

impl From<MemoryBroker> for AnyBroker {
    fn from(broker: MemoryBroker) -> Self {
        Self::Memory(broker)
    }
}

impl From<RedisBroker> for AnyBroker {
    fn from(broker: RedisBroker) -> Self {
        Self::Redis(broker)
    }
}

/// Build the broker named by `url`'s scheme.
///
/// Fails with [`BrokerError::Config`] for unknown schemes.
pub fn create_broker(url: &str) -> Result<AnyBroker> {
    match BrokerKind::from_url(url)? {
        BrokerKind::Memory => Ok(AnyBroker::Memory(MemoryBroker::new())),
        BrokerKind::Redis => Ok(AnyBroker::Redis(RedisBroker::new(url)?)),
    }
}

macro_rules! delegate {
    ($self:ident, $broker:ident => $call:expr) => {
        match $self {
            AnyBroker::Memory($broker) => $call,
            AnyBroker::Redis($broker) => $call,
        }
    };
}

#[async_trait]
impl Broker for AnyBroker {
    fn name(&self) -> &'static str {
        delegate!(self, b => b.name())
    }

    async fn connect(&self) -> Result<()> {
        delegate!(self, b => b.connect().await)
    }

    async fn disconnect(&self) -> Result<()> {
        delegate!(self, b => b.disconnect().await)
    }

    async fn subscribe(&self, channel: &str) -> Result<()> {
        delegate!(self, b => b.subscribe(channel).await)
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        delegate!(self, b => b.unsubscribe(channel).await)
    }

    async fn publish(&self, channel: &str, message: Value) -> Result<()> {
        delegate!(self, b => b.publish(channel, message).await)
    }

    async fn get_message(&self) -> Result<Option<Message>> {
        delegate!(self, b => b.get_message().await)
    }
}
