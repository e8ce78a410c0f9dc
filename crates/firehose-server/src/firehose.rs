//! The firehose: dispatch table plus connection registry, and the
//! per-connection lifecycle that feeds the table.
//!
//! Lifecycle of one connection:
//!
//! 1. tracked in the registry (visible to `pool.size()` and broadcast)
//! 2. `connection` dispatched
//! 3. every well-formed inbound envelope dispatched under its own name,
//!    except envelopes claiming a lifecycle name, which are dropped
//! 4. on end of stream: marked closed, untracked, then `close` dispatched

use std::sync::Arc;

use ::metrics::counter;
use firehose_core::events::is_lifecycle;
use firehose_core::{CLOSE, CONNECTION, Envelope, Target, WildcardMode};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, info};

use crate::connection::FirehoseClient;
use crate::dispatch::{DispatchTable, Invoker};
use crate::metrics::{
    FIREHOSE_CONNECTIONS_TOTAL, FIREHOSE_DISCONNECTIONS_TOTAL, FIREHOSE_DISPATCH_TOTAL,
    FIREHOSE_MESSAGES_DROPPED_TOTAL, FIREHOSE_MESSAGES_RECEIVED_TOTAL,
};
use crate::pool::{ConnectionRegistry, FirehosePool};
use crate::transport::Inbound;
use crate::trigger::FirehoseOptions;

/// Realtime event dispatcher.
pub struct Firehose {
    table: DispatchTable,
    registry: Arc<ConnectionRegistry>,
    pool: FirehosePool,
}

impl Firehose {
    /// Create a dispatcher using `mode` to match wildcard and lifecycle registrations.
    pub fn new(mode: WildcardMode) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let pool = FirehosePool::new(Arc::clone(&registry));
        Self {
            table: DispatchTable::new(mode),
            registry,
            pool,
        }
    }

    /// Broadcast view over the live connections.
    pub fn pool(&self) -> &FirehosePool {
        &self.pool
    }

    /// Live connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Registration table.
    pub fn registrations(&self) -> &DispatchTable {
        &self.table
    }

    /// Add, replace, or (with `None`) remove the callback for
    /// `(options.event, target)`.
    pub fn register(&self, invoker: Option<Invoker>, target: Target, options: &FirehoseOptions) {
        self.table.register(invoker, target, &options.event);
    }

    /// Dispatch `event` for `client`. Returns the number of invokers called.
    pub fn invoke(&self, event: &str, client: &FirehoseClient, data: Option<&Value>) -> usize {
        let n = self.table.dispatch(event, client, &self.pool, data);
        if n > 0 {
            counter!(FIREHOSE_DISPATCH_TOTAL).increment(n as u64);
        }
        n
    }

    /// Drive one accepted connection until its inbound stream ends.
    pub async fn run_connection<S>(&self, client: FirehoseClient, inbound: S)
    where
        S: Stream<Item = Inbound> + Send,
    {
        self.registry.add(client.clone());
        counter!(FIREHOSE_CONNECTIONS_TOTAL).increment(1);
        info!(
            conn_id = client.id(),
            remote = ?client.remote_address(),
            "firehose connection opened"
        );

        let _ = self.invoke(CONNECTION, &client, None);

        let mut inbound = std::pin::pin!(inbound);
        while let Some(frame) = inbound.next().await {
            let decoded = match &frame {
                Inbound::Text(text) => Envelope::decode(text),
                Inbound::Binary(bytes) => Envelope::decode_bytes(bytes),
            };
            match decoded {
                Ok(envelope) if is_lifecycle(&envelope.name) => {
                    counter!(FIREHOSE_MESSAGES_DROPPED_TOTAL).increment(1);
                    debug!(
                        conn_id = client.id(),
                        name = %envelope.name,
                        "dropping client frame with lifecycle name"
                    );
                }
                Ok(envelope) => {
                    counter!(FIREHOSE_MESSAGES_RECEIVED_TOTAL).increment(1);
                    let _ = self.invoke(&envelope.name, &client, envelope.data.as_ref());
                }
                Err(e) => {
                    counter!(FIREHOSE_MESSAGES_DROPPED_TOTAL).increment(1);
                    debug!(conn_id = client.id(), error = %e, "dropping malformed frame");
                }
            }
        }

        client.transport().mark_closed();
        let _ = self.registry.remove(client.id());
        counter!(FIREHOSE_DISCONNECTIONS_TOTAL).increment(1);
        info!(conn_id = client.id(), "firehose connection closed");

        let _ = self.invoke(CLOSE, &client, None);
    }
}

impl Default for Firehose {
    fn default() -> Self {
        Self::new(WildcardMode::default())
    }
}
