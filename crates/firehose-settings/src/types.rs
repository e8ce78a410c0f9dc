//! Settings type definitions.
//!
//! All types use camelCase on the wire and `#[serde(default)]`, so a partial
//! JSON file only needs the keys it overrides.

use firehose_core::WildcardMode;
use serde::{Deserialize, Serialize};

/// Root settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirehoseSettings {
    /// Listener and transport settings.
    pub server: ServerSettings,
    /// Event dispatch settings.
    pub dispatch: DispatchSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Listener and transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` auto-assigns).
    pub port: u16,
    /// Reserved upgrade path owned by the firehose protocol.
    pub upgrade_path: String,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before drops.
    pub send_queue_capacity: usize,
    /// Seconds to wait for tasks on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            upgrade_path: "/firehose".into(),
            max_message_size: 1024 * 1024,
            send_queue_capacity: 256,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Event dispatch settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// How `*` registrations and `close` events are matched.
    pub wildcard_mode: WildcardMode,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter (overridden by `RUST_LOG`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
