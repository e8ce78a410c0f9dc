//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FirehoseSettings::default()`]
//! 2. If `~/.firehose/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use firehose_core::WildcardMode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::FirehoseSettings;

/// Resolve the path to the settings file (`~/.firehose/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".firehose").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<FirehoseSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid value is an error.
pub fn load_settings_from_path(path: &Path) -> Result<FirehoseSettings> {
    let mut settings = read_layers(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
fn read_layers(path: &Path) -> Result<FirehoseSettings> {
    let defaults = serde_json::to_value(FirehoseSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `FIREHOSE_*` environment overrides.
pub fn apply_env_overrides(settings: &mut FirehoseSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using `lookup` as the variable source.
///
/// Invalid values are ignored with a warning (falling back to file/default).
pub fn apply_overrides_from(
    settings: &mut FirehoseSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("FIREHOSE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("FIREHOSE_PORT") {
        match parse_u16_range(&v, 0, 65535) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "FIREHOSE_PORT", value = %v, "invalid u16 env var, ignoring"),
        }
    }
    if let Some(v) = read("FIREHOSE_UPGRADE_PATH") {
        settings.server.upgrade_path = v;
    }
    if let Some(v) = read("FIREHOSE_MAX_MESSAGE_SIZE") {
        match parse_usize_range(&v, 1, 1 << 30) {
            Some(n) => settings.server.max_message_size = n,
            None => warn!(key = "FIREHOSE_MAX_MESSAGE_SIZE", value = %v, "invalid usize env var, ignoring"),
        }
    }
    if let Some(v) = read("FIREHOSE_SEND_QUEUE") {
        match parse_usize_range(&v, 1, 1_000_000) {
            Some(n) => settings.server.send_queue_capacity = n,
            None => warn!(key = "FIREHOSE_SEND_QUEUE", value = %v, "invalid usize env var, ignoring"),
        }
    }
    if let Some(v) = read("FIREHOSE_WILDCARD_MODE") {
        match WildcardMode::parse(&v) {
            Some(mode) => settings.dispatch.wildcard_mode = mode,
            None => warn!(key = "FIREHOSE_WILDCARD_MODE", value = %v, "unknown wildcard mode, ignoring"),
        }
    }
    if let Some(v) = read("FIREHOSE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("FIREHOSE_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => warn!(key = "FIREHOSE_LOG_JSON", value = %v, "invalid boolean env var, ignoring"),
        }
    }
}

/// Reject settings the server cannot run with.
pub fn validate(settings: &FirehoseSettings) -> Result<()> {
    if !settings.server.upgrade_path.starts_with('/') {
        return Err(SettingsError::InvalidValue(format!(
            "upgradePath must start with '/': {}",
            settings.server.upgrade_path
        )));
    }
    if settings.server.max_message_size == 0 {
        return Err(SettingsError::InvalidValue(
            "maxMessageSize must be positive".into(),
        ));
    }
    if settings.server.send_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "sendQueueCapacity must be positive".into(),
        ));
    }
    Ok(())
}

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

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
