//! Live connection registry and the broadcast pool view over it.

use std::sync::Arc;

use ::metrics::{counter, gauge};
use dashmap::DashMap;
use firehose_core::Envelope;
use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::FirehoseClient;
use crate::metrics::{FIREHOSE_BROADCAST_TOTAL, FIREHOSE_CONNECTIONS_ACTIVE};

/// Connections accepted by the firehose and not yet closed, keyed by connection id.
#[derive(Default)]
pub struct ConnectionRegistry {
    clients: DashMap<Arc<str>, FirehoseClient>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection.
    #[allow(clippy::cast_precision_loss)]
    pub fn add(&self, client: FirehoseClient) {
        let _ = self.clients.insert(Arc::from(client.id()), client);
        gauge!(FIREHOSE_CONNECTIONS_ACTIVE).set(self.clients.len() as f64);
    }

    /// Stop tracking a connection. Returns whether it was tracked.
    #[allow(clippy::cast_precision_loss)]
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.clients.remove(id).is_some();
        gauge!(FIREHOSE_CONNECTIONS_ACTIVE).set(self.clients.len() as f64);
        removed
    }

    /// Number of tracked connections.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no connection is tracked.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Clone out the current set so sends happen without holding shard locks.
    pub fn snapshot(&self) -> Vec<FirehoseClient> {
        self.clients.iter().map(|entry| entry.value().clone()).collect()
    }
}

/// Read-through view of the live connections plus broadcast.
///
/// Cheap to clone; every clone observes the same registry.
#[derive(Clone)]
pub struct FirehosePool {
    registry: Arc<ConnectionRegistry>,
}

impl FirehosePool {
    /// View over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Number of open connections.
    pub fn size(&self) -> usize {
        self.registry.len()
    }

    /// Serialize `{name, data}` once and queue it on every open connection.
    ///
    /// Connections that are not open are skipped; a connection closing
    /// mid-iteration simply misses the frame. Returns the number of
    /// connections the frame was queued on.
    pub fn broadcast(&self, name: &str, data: Option<&Value>) -> usize {
        let frame = match Envelope::encode(name, data) {
            Ok(f) => Arc::new(f),
            Err(e) => {
                warn!(event = name, error = %e, "failed to serialize broadcast");
                return 0;
            }
        };
        let mut delivered = 0usize;
        let mut skipped = 0usize;
        for client in self.registry.snapshot() {
            if client.is_open() && client.send_raw(Arc::clone(&frame)) {
                delivered += 1;
            } else {
                skipped += 1;
            }
        }
        counter!(FIREHOSE_BROADCAST_TOTAL).increment(1);
        debug!(event = name, delivered, skipped, "broadcast event");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, Transport};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn make_client_with_rx(
        id: &str,
    ) -> (FirehoseClient, Arc<ChannelTransport>, mpsc::Receiver<Arc<String>>) {
        let (t, rx) = ChannelTransport::new(None, 32);
        let t = Arc::new(t);
        let client = FirehoseClient::with_id(id, t.clone());
        (client, t, rx)
    }

    fn make_pool() -> (Arc<ConnectionRegistry>, FirehosePool) {
        let registry = Arc::new(ConnectionRegistry::new());
        let pool = FirehosePool::new(Arc::clone(&registry));
        (registry, pool)
    }

    #[test]
    fn size_tracks_registry() {
        let (registry, pool) = make_pool();
        assert_eq!(pool.size(), 0);
        let (c1, _, _rx1) = make_client_with_rx("c1");
        let (c2, _, _rx2) = make_client_with_rx("c2");
        registry.add(c1);
        registry.add(c2);
        assert_eq!(pool.size(), 2);
        assert!(registry.remove("c1"));
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn remove_nonexistent_connection() {
        let (registry, pool) = make_pool();
        assert!(!registry.remove("no_such"));
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn snapshot_clones_tracked_clients() {
        let (registry, _pool) = make_pool();
        let (c1, _, _rx) = make_client_with_rx("c1");
        registry.add(c1);
        let ids: Vec<String> = registry.snapshot().iter().map(|c| c.id().to_owned()).collect();
        assert_eq!(ids, vec!["c1"]);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_open_connection() {
        let (registry, pool) = make_pool();
        let mut receivers = Vec::new();
        for i in 0..3 {
            let (c, _, rx) = make_client_with_rx(&format!("c{i}"));
            registry.add(c);
            receivers.push(rx);
        }

        let delivered = pool.broadcast("news", Some(&json!({"headline": "up"})));
        assert_eq!(delivered, 3);

        let mut frames = Vec::new();
        for rx in &mut receivers {
            frames.push(rx.recv().await.unwrap());
        }
        // serialized once, shared by every recipient
        assert!(frames.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        let parsed: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(parsed, json!({"name": "news", "data": {"headline": "up"}}));
    }

    #[tokio::test]
    async fn broadcast_skips_closed_connection() {
        let (registry, pool) = make_pool();
        let (open1, _, mut rx1) = make_client_with_rx("open1");
        let (closed, closed_t, mut rx_closed) = make_client_with_rx("closed");
        let (open2, _, mut rx2) = make_client_with_rx("open2");
        registry.add(open1);
        registry.add(closed);
        registry.add(open2);

        closed_t.mark_closed();
        let delivered = pool.broadcast("tick", None);

        assert_eq!(delivered, 2);
        assert_eq!(&*rx1.recv().await.unwrap(), r#"{"name":"tick"}"#);
        assert_eq!(&*rx2.recv().await.unwrap(), r#"{"name":"tick"}"#);
        assert!(rx_closed.try_recv().is_err());
    }

    #[test]
    fn broadcast_skips_dead_receiver() {
        let (registry, pool) = make_pool();
        let (gone, _, rx_gone) = make_client_with_rx("gone");
        let (alive, _, mut rx_alive) = make_client_with_rx("alive");
        registry.add(gone);
        registry.add(alive);
        drop(rx_gone);

        assert_eq!(pool.broadcast("tick", None), 1);
        assert!(rx_alive.try_recv().is_ok());
    }

    #[test]
    fn broadcast_to_empty_pool() {
        let (_registry, pool) = make_pool();
        assert_eq!(pool.broadcast("tick", None), 0);
    }

    #[test]
    fn pool_clones_share_registry() {
        let (registry, pool) = make_pool();
        let copy = pool.clone();
        let (c, _, _rx) = make_client_with_rx("c");
        registry.add(c);
        assert_eq!(copy.size(), 1);
    }

    #[test]
    fn add_same_id_overwrites() {
        let (registry, pool) = make_pool();
        let (a, _, _rx1) = make_client_with_rx("same");
        let (b, _, _rx2) = make_client_with_rx("same");
        registry.add(a);
        registry.add(b);
        assert_eq!(pool.size(), 1);
    }
}
