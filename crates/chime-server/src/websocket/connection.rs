//! Admitted subscriber state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chime_core::{ChannelId, ConnectionId, UserId};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Transport accepted, credentials already validated.
    Admitted,
    /// Visible to broadcasts.
    Registered,
    /// One of the pumps decided to stop; no new enqueues are accepted.
    Draining,
    /// Transport and queue closed, removed from the registry. Terminal.
    Closed,
}

/// One admitted subscriber of one channel.
///
/// The channel is fixed for the connection's lifetime; subscribing elsewhere
/// means a new connection.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Authenticated owner.
    pub user_id: UserId,
    /// The only channel this connection receives events for.
    pub channel_id: ChannelId,
    /// When this connection was admitted.
    pub connected_at: Instant,
    state: Mutex<ConnectionState>,
    /// Cancelled when teardown begins; both pumps watch it.
    shutdown: CancellationToken,
    /// When the last inbound frame (data or pong) was read.
    last_seen: Mutex<Instant>,
    /// Payloads written to the transport.
    delivered: AtomicU64,
}

impl ClientConnection {
    /// Create a connection in the `Admitted` state with a fresh ID.
    pub fn new(user_id: UserId, channel_id: ChannelId) -> Self {
        Self::with_id(ConnectionId::new(), user_id, channel_id)
    }

    /// Create a connection with a caller-chosen ID.
    pub fn with_id(id: ConnectionId, user_id: UserId, channel_id: ChannelId) -> Self {
        let now = Instant::now();
        Self {
            id,
            user_id,
            channel_id,
            connected_at: now,
            state: Mutex::new(ConnectionState::Admitted),
            shutdown: CancellationToken::new(),
            last_seen: Mutex::new(now),
            delivered: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `next` if it is strictly later than the current state.
    ///
    /// Returns `false` (and leaves the state untouched) otherwise.
    pub fn advance(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if next > *state {
            *state = next;
            true
        } else {
            false
        }
    }

    /// Enter `Draining` and signal both pumps to stop.
    ///
    /// Returns `true` only for the call that started teardown.
    pub fn begin_draining(&self) -> bool {
        let started = self.advance(ConnectionState::Draining);
        self.shutdown.cancel();
        started
    }

    /// Mark the connection terminally closed.
    pub fn close(&self) {
        let _ = self.advance(ConnectionState::Closed);
        self.shutdown.cancel();
    }

    /// Whether teardown has begun.
    pub fn is_draining(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when teardown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Record inbound activity.
    pub fn mark_seen(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound frame (or admission).
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Count payloads written to the transport.
    pub fn record_delivered(&self, count: u64) {
        let _ = self.delivered.fetch_add(count, Ordering::Relaxed);
    }

    /// Total payloads written to the transport.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("channel_id", &self.channel_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
