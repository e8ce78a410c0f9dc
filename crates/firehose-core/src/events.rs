//! Lifecycle event names and the rule deciding which registrations a fired
//! event reaches.

use serde::{Deserialize, Serialize};

/// Fired once per accepted connection, before any client message.
pub const CONNECTION: &str = "connection";
/// Fired once when a connection's transport closes.
pub const CLOSE: &str = "close";
/// Registration event that subscribes to lifecycle events.
pub const WILDCARD: &str = "*";

/// Whether `event` is one of the synthetic lifecycle events.
pub fn is_lifecycle(event: &str) -> bool {
    event == CONNECTION || event == CLOSE
}

/// How a `"*"` registration (and `"close"`) is matched.
///
/// Both variants agree on exact matches and on `"*"` receiving `"connection"`.
/// They differ on `"close"`:
///
/// | registered | fired        | `LifecycleOnly` | `CloseToAll` |
/// |------------|--------------|-----------------|--------------|
/// | `*`        | `close`      | yes             | yes          |
/// | `chat`     | `close`      | no              | yes          |
/// | `*`        | `chat`       | no              | no           |
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WildcardMode {
    /// `*` matches `connection` and `close`; everything else needs an exact name.
    #[default]
    LifecycleOnly,
    /// Every registration receives `close`, whatever event it registered for.
    CloseToAll,
}

impl WildcardMode {
    /// Whether a registration for `registered` receives a fired `event`.
    pub fn matches(self, registered: &str, event: &str) -> bool {
        if registered == event {
            return true;
        }
        match self {
            Self::LifecycleOnly => registered == WILDCARD && is_lifecycle(event),
            Self::CloseToAll => (registered == WILDCARD && event == CONNECTION) || event == CLOSE,
        }
    }

    /// Parse the settings spelling (`lifecycleOnly` / `closeToAll`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "lifecycleOnly" | "lifecycle_only" => Some(Self::LifecycleOnly),
            "closeToAll" | "close_to_all" => Some(Self::CloseToAll),
            _ => None,
        }
    }
}
