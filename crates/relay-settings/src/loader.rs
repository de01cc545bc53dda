//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `RELAY_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RelaySettings;

/// Resolve the default settings file (`~/.relay/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".relay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid final
/// configuration is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RelaySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `RELAY_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` instead of the process environment.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Invalid values are
/// logged and ignored.
pub fn apply_overrides_with<F>(settings: &mut RelaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──
    if let Some(v) = env.string("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("RELAY_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("RELAY_MAX_MESSAGE_SIZE", 1024, 64 * 1024 * 1024) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = env.usize("RELAY_SEND_QUEUE_CAPACITY", 1, 65_536) {
        settings.server.send_queue_capacity = v;
    }
    if let Some(v) = env.u64("RELAY_SEND_TIMEOUT_MS", 1, 600_000) {
        settings.server.send_timeout_ms = v;
    }
    if let Some(v) = env.u64("RELAY_HEARTBEAT_INTERVAL_MS", 1_000, 600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.bool("RELAY_REQUIRE_BEARER") {
        settings.server.require_bearer = v;
    }

    // ── Broker ──
    if let Some(v) = env.string("RELAY_BROKER_URL") {
        settings.broker.url = v;
    }
    if let Some(v) = env.string("RELAY_BROKER_CHANNEL") {
        settings.broker.channel = v;
    }
    if let Some(v) = env.u64("RELAY_BROKER_POLL_INTERVAL_MS", 10, 60_000) {
        settings.broker.poll_interval_ms = v;
    }
    if let Some(v) = env.u64("RELAY_RECONNECT_BASE_DELAY_MS", 1, 600_000) {
        settings.broker.reconnect.base_delay_ms = v;
    }
    if let Some(v) = env.u64("RELAY_RECONNECT_MAX_DELAY_MS", 1, 3_600_000) {
        settings.broker.reconnect.max_delay_ms = v;
    }

    // ── Logging ──
    if let Some(v) = env.string("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("RELAY_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as an integer within `min..=max`.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ──

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn ranged<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd,
    {
        let val = (self.lookup)(name)?;
        let result = parse_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.ranged(name, min, max)
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.ranged(name, min, max)
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.ranged(name, min, max)
    }
}
