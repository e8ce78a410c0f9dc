//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the host server and the firehose transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Reserved upgrade path owned by the firehose protocol.
    pub upgrade_path: String,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before frames are dropped.
    pub send_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            upgrade_path: "/firehose".into(),
            max_message_size: 1024 * 1024, // 1 MB
            send_queue_capacity: 256,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
