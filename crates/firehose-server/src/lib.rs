//! # firehose-server
//!
//! Realtime event dispatch behind a shared upgrade endpoint.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `transport` | Capability trait over one live duplex transport, channel-backed impl |
//! | `connection` | `FirehoseClient`: remote address + `send(name, data)` |
//! | `pool` | Live connection registry and `FirehosePool` broadcast view |
//! | `dispatch` | `(event, target)` registration table and wildcard matching |
//! | `firehose` | Owns table + registry, runs per-connection lifecycle |
//! | `trigger` | Options, JSON schema, and operator-facing info |
//! | `socket` | Axum `WebSocket` ↔ transport adapter |
//! | `upgrade` | Shared upgrade listener list and the path multiplexer |
//! | `server` | Host HTTP server: health, metrics, upgrade diversion |
//! | `config` | Listener and transport settings for the host server |
//! | `health` | `/health` response body |
//! | `metrics` | Prometheus recorder and metric names |
//! | `shutdown` | Cancellation-token shutdown coordination |
//!
//! ## Data Flow
//!
//! host `upgrade` → `UpgradeMux` → (accept) `socket` → `Firehose` lifecycle →
//! `DispatchTable` → registered invokers.

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod firehose;
pub mod health;
pub mod metrics;
pub mod pool;
pub mod server;
pub mod shutdown;
pub mod socket;
pub mod transport;
pub mod trigger;
pub mod upgrade;

pub use config::ServerConfig;
pub use connection::FirehoseClient;
pub use dispatch::{DispatchTable, Invocation, Invoker};
pub use firehose::Firehose;
pub use pool::FirehosePool;
pub use server::HostServer;
pub use trigger::FirehoseOptions;
pub use upgrade::{UpgradeHandler, UpgradeListeners, UpgradeMux};
