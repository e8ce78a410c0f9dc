//! Event registration table and dispatch.
//!
//! Entries are keyed by `(event, target)`. Registering an existing key
//! replaces the invoker in place (keeping its position); registering with no
//! invoker removes the entry. Dispatch walks entries in insertion order and
//! calls every invoker whose registered event matches the fired one under the
//! table's [`WildcardMode`].

use std::fmt;
use std::sync::Arc;

use firehose_core::{Target, WildcardMode};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, trace};

use crate::connection::FirehoseClient;
use crate::pool::FirehosePool;

/// Callback registered for an event.
///
/// Invoked synchronously on the connection's task; anything slow should be
/// spawned by the callback itself.
pub type Invoker = Arc<dyn Fn(Invocation) + Send + Sync>;

/// Arguments passed to an [`Invoker`].
#[derive(Clone)]
pub struct Invocation {
    /// Owner of the registration being invoked.
    pub target: Target,
    /// Connection the event belongs to.
    pub client: FirehoseClient,
    /// Pool of all open connections.
    pub pool: FirehosePool,
    /// Fired event name.
    pub event: String,
    /// Payload (`None` for lifecycle events and data-less envelopes).
    pub data: Option<Value>,
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("target", &self.target)
            .field("client", &self.client)
            .field("event", &self.event)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

struct Registration {
    event: String,
    target: Target,
    invoker: Invoker,
}

/// `(event, target)` → invoker table.
pub struct DispatchTable {
    entries: RwLock<Vec<Registration>>,
    mode: WildcardMode,
}

impl DispatchTable {
    /// Create an empty table.
    pub fn new(mode: WildcardMode) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            mode,
        }
    }

    /// Match rule in effect.
    pub fn mode(&self) -> WildcardMode {
        self.mode
    }

    /// Insert, replace, or (with `None`) remove the entry for `(event, target)`.
    pub fn register(&self, invoker: Option<Invoker>, target: Target, event: &str) {
        let mut entries = self.entries.write();
        let existing = entries
            .iter()
            .position(|r| r.event == event && r.target == target);

        match (invoker, existing) {
            (Some(invoker), Some(idx)) => {
                debug!(event, target = %target, "replacing registration");
                entries[idx].invoker = invoker;
            }
            (Some(invoker), None) => {
                debug!(event, target = %target, "adding registration");
                entries.push(Registration {
                    event: event.to_owned(),
                    target,
                    invoker,
                });
            }
            (None, Some(idx)) => {
                debug!(event, target = %target, "removing registration");
                let _ = entries.remove(idx);
            }
            (None, None) => {}
        }
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether `(event, target)` is registered.
    pub fn contains(&self, event: &str, target: &Target) -> bool {
        self.entries
            .read()
            .iter()
            .any(|r| r.event == event && &r.target == target)
    }

    /// Invoke every matching entry. Returns the number of invocations.
    ///
    /// Matching entries are collected under the read lock and invoked after
    /// it is released, so invokers may register or unregister freely.
    pub fn dispatch(
        &self,
        event: &str,
        client: &FirehoseClient,
        pool: &FirehosePool,
        data: Option<&Value>,
    ) -> usize {
        let matched: Vec<(Target, Invoker)> = self
            .entries
            .read()
            .iter()
            .filter(|r| self.mode.matches(&r.event, event))
            .map(|r| (r.target.clone(), Arc::clone(&r.invoker)))
            .collect();

        trace!(event, conn_id = client.id(), matched = matched.len(), "dispatching");
        let count = matched.len();
        for (target, invoker) in matched {
            invoker(Invocation {
                target,
                client: client.clone(),
                pool: pool.clone(),
                event: event.to_owned(),
                data: data.cloned(),
            });
        }
        count
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new(WildcardMode::default())
    }
}
