//! Transport capability interface.
//!
//! A [`Transport`] is the outbound half of one live duplex connection: it
//! reports the peer address and ready state and accepts serialized frames.
//! The inbound half (messages, then close) is a stream of [`Inbound`] frames
//! consumed by [`Firehose::run_connection`](crate::firehose::Firehose::run_connection);
//! the end of that stream is the close.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use ::metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::metrics::FIREHOSE_SEND_DROPS_TOTAL;

/// Transport ready state, mirroring the WebSocket `readyState` values that matter here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    /// Frames are accepted.
    Open = 1,
    /// Close has started; frames are refused.
    Closing = 2,
    /// Transport is gone.
    Closed = 3,
}

impl ReadyState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// One inbound frame from a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Text frame.
    Text(String),
    /// Binary frame (decoded as UTF-8 JSON).
    Binary(Vec<u8>),
}

/// Outbound capability of a live connection.
pub trait Transport: Send + Sync {
    /// Peer address reported by the listener, if known.
    fn remote_address(&self) -> Option<SocketAddr>;

    /// Current ready state.
    fn ready_state(&self) -> ReadyState;

    /// Whether frames are currently accepted.
    fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Queue a serialized frame. Returns `false` if it was not queued.
    fn send_text(&self, frame: Arc<String>) -> bool;

    /// Move to [`ReadyState::Closed`]. Idempotent.
    fn mark_closed(&self);
}

/// Transport backed by a bounded `mpsc` channel drained by a socket writer task.
pub struct ChannelTransport {
    remote: Option<SocketAddr>,
    tx: mpsc::Sender<Arc<String>>,
    state: AtomicU8,
    dropped: AtomicU64,
}

impl ChannelTransport {
    /// Create an open transport and the receiver its writer task drains.
    pub fn new(
        remote: Option<SocketAddr>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let transport = Self {
            remote,
            tx,
            state: AtomicU8::new(ReadyState::Open as u8),
            dropped: AtomicU64::new(0),
        };
        (transport, rx)
    }

    /// Move to [`ReadyState::Closing`] unless already closed.
    pub fn begin_close(&self) {
        let _ = self.state.compare_exchange(
            ReadyState::Open as u8,
            ReadyState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Transport for ChannelTransport {
    fn remote_address(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn send_text(&self, frame: Arc<String>) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                counter!(FIREHOSE_SEND_DROPS_TOTAL).increment(1);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.mark_closed();
                false
            }
        }
    }

    fn mark_closed(&self) {
        self.state.store(ReadyState::Closed as u8, Ordering::Release);
    }
}
