//! # relayd
//!
//! Relay server binary: loads settings, wires the broker, orchestrator, and
//! HTTP server together, and runs until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relay_broker::{AnyBroker, Broker, BrokerKind, MemoryBroker, RedisBroker, ReconnectConfig};
use relay_logging::{LoggingConfig, init_logging};
use relay_server::{Orchestrator, RelayServer, ServerConfig};
use relay_settings::{BrokerSettings, RelaySettings, ReconnectSettings};

/// How long to wait for the HTTP server to drain after shutdown.
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket pub/sub relay.
#[derive(Parser, Debug)]
#[command(name = "relayd", about = "WebSocket pub/sub relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Broker URL: `memory://` or `redis://host:port/db` (overrides settings).
    #[arg(long)]
    broker_url: Option<String>,

    /// Broker channel shared by all relay processes (overrides settings).
    #[arg(long)]
    channel: Option<String>,

    /// Settings file (default `~/.relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Command-line flags win over file and environment settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(url) = &self.broker_url {
            settings.broker.url.clone_from(url);
        }
        if let Some(channel) = &self.channel {
            settings.broker.channel.clone_from(channel);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

/// Build the broker named by the configured URL.
fn build_broker(settings: &BrokerSettings) -> Result<AnyBroker> {
    let broker = match BrokerKind::from_url(&settings.url)? {
        BrokerKind::Memory => MemoryBroker::new().into(),
        BrokerKind::Redis => RedisBroker::new(&settings.url)?
            .with_poll_interval(Duration::from_millis(settings.poll_interval_ms))
            .into(),
    };
    Ok(broker)
}

fn reconnect_config(settings: &ReconnectSettings) -> ReconnectConfig {
    ReconnectConfig {
        base_delay_ms: settings.base_delay_ms,
        max_delay_ms: settings.max_delay_ms,
        jitter_factor: settings.jitter_factor,
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(relay_settings::settings_path);
    let mut settings = relay_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    let logging = LoggingConfig::from_settings(&settings.logging).context("Invalid log level")?;
    init_logging(&logging).context("Failed to initialize logging")?;

    let metrics = relay_server::metrics::install_recorder()?;

    let broker = build_broker(&settings.broker).context("Failed to create broker")?;
    let orchestrator = Arc::new(
        Orchestrator::new(broker, settings.broker.channel.clone())
            .with_reconnect(reconnect_config(&settings.broker.reconnect)),
    );
    orchestrator
        .startup()
        .await
        .context("Failed to start broker listener")?;

    let config = ServerConfig::from_settings(&settings.server);
    let server = RelayServer::new(config, orchestrator.clone()).with_metrics(metrics);
    let addr = server.listen().await.context("Failed to bind server")?;

    tracing::info!(
        broker = orchestrator.broker().name(),
        channel = orchestrator.channel(),
        "relay listening on ws://{addr}/ws"
    );

    shutdown_signal().await?;

    tracing::info!("Shutting down...");
    orchestrator.shutdown().await;
    let report = server.shutdown().drain(Some(SERVER_DRAIN_TIMEOUT)).await;

    tracing::info!(
        completed = report.completed,
        aborted = report.aborted,
        "Shutdown complete"
    );
    Ok(())
}
