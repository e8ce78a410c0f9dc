//! Firehose client connection handle.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use firehose_core::Envelope;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::transport::Transport;

/// A connected firehose client.
///
/// Cheap to clone; clones share the transport. Handed to invokers by
/// reference to the dispatch, a clone is only needed to talk to the client
/// after the callback returns.
#[derive(Clone)]
pub struct FirehoseClient {
    id: Arc<str>,
    transport: Arc<dyn Transport>,
}

impl FirehoseClient {
    /// Wrap a transport with a fresh connection id.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_id(format!("conn_{}", Uuid::now_v7()), transport)
    }

    /// Wrap a transport with an explicit connection id.
    pub fn with_id(id: impl Into<Arc<str>>, transport: Arc<dyn Transport>) -> Self {
        Self {
            id: id.into(),
            transport,
        }
    }

    /// Connection id, unique per accepted connection.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Peer address as reported by the transport.
    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.transport.remote_address()
    }

    /// Whether the transport currently accepts frames.
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Serialize `{name, data}` and queue it.
    ///
    /// Fire-and-forget: returns `false` when the frame was not queued (closed
    /// transport, full queue, unserializable payload) without raising.
    pub fn send(&self, name: &str, data: Option<&Value>) -> bool {
        match Envelope::encode(name, data) {
            Ok(frame) => self.send_raw(Arc::new(frame)),
            Err(e) => {
                warn!(conn_id = %self.id, event = name, error = %e, "failed to serialize envelope");
                false
            }
        }
    }

    /// Queue an already-serialized frame.
    pub fn send_raw(&self, frame: Arc<String>) -> bool {
        if !self.transport.is_open() {
            return false;
        }
        self.transport.send_text(frame)
    }
}

impl fmt::Debug for FirehoseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirehoseClient")
            .field("id", &self.id)
            .field("remote", &self.remote_address())
            .field("state", &self.transport.ready_state())
            .finish()
    }
}
