//! Owner identity of a registration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The external handler that owns a registration: a function id plus the
/// name of the handler exported by that function.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Owning function id.
    pub id: String,
    /// Handler name within the function.
    pub handler: String,
}

impl Target {
    /// Build a target.
    pub fn new(id: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handler: handler.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.id, self.handler)
    }
}
