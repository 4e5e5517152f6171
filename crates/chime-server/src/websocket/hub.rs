//! Hub coordinator.
//!
//! One task owns the [`ChannelRegistry`] and processes [`HubCommand`]s one at
//! a time, so a broadcast always sees a consistent member set and evictions
//! never race with the iteration that triggered them. Everything else talks to
//! it through a cloneable [`HubHandle`].
//!
//! Fan-out never blocks: each member gets a `try_send`, and a member whose
//! queue is full is evicted instead of stalling the rest of the channel.

use std::sync::Arc;

use chime_core::{ChannelId, ConnectionId};
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Payload;
use super::connection::{ClientConnection, ConnectionState};
use super::registry::{ChannelRegistry, Member};
use crate::errors::HubError;
use crate::metrics::{
    HUB_BROADCASTS_TOTAL, HUB_CHANNELS_ACTIVE, HUB_DELIVERIES_TOTAL, HUB_EVICTIONS_TOTAL,
    WS_CONNECTIONS_ACTIVE,
};

/// Why a member was removed by the hub rather than by its own session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictionReason {
    /// Outbound queue was full at enqueue time.
    SlowConsumer,
    /// Outbound queue was already closed by its writer.
    Disconnected,
    /// Removed on request via [`HubHandle::close_connection`].
    ClosedByServer,
}

impl EvictionReason {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SlowConsumer => "slow_consumer",
            Self::Disconnected => "disconnected",
            Self::ClosedByServer => "closed_by_server",
        }
    }
}

/// Outcome of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Members whose queue accepted the payload.
    pub delivered: usize,
    /// Members evicted because their queue was full or closed.
    pub evicted: usize,
}

/// Point-in-time registry counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Registered connections across all channels.
    pub connections: usize,
    /// Channels with at least one member.
    pub channels: usize,
}

/// Control messages processed by the hub task.
pub enum HubCommand {
    /// Add a member; acknowledged once it is visible to broadcasts.
    Register {
        /// Connection plus its queue producer.
        member: Member,
        /// Acknowledgement.
        ack: oneshot::Sender<()>,
    },
    /// Remove a connection, closing its queue. Replies whether it was present.
    Unregister {
        /// Connection to remove.
        connection_id: ConnectionId,
        /// Whether anything was removed.
        reply: oneshot::Sender<bool>,
    },
    /// Remove a connection and signal its pumps to stop.
    Close {
        /// Connection to close.
        connection_id: ConnectionId,
        /// Whether anything was removed.
        reply: oneshot::Sender<bool>,
    },
    /// Fan a payload out to every member of a channel.
    Broadcast {
        /// Target channel.
        channel_id: ChannelId,
        /// Serialized envelope.
        payload: Payload,
        /// Fan-out outcome.
        reply: oneshot::Sender<BroadcastReport>,
    },
    /// Member count of one channel.
    ChannelConnectionCount {
        /// Channel to count.
        channel_id: ChannelId,
        /// Count.
        reply: oneshot::Sender<usize>,
    },
    /// Registry-wide counters.
    Stats {
        /// Counters.
        reply: oneshot::Sender<HubStats>,
    },
}

/// The coordinator task state.
pub struct Hub {
    registry: ChannelRegistry,
    commands: mpsc::Receiver<HubCommand>,
    shutdown: CancellationToken,
}

impl Hub {
    /// Create a hub and its handle. Nothing runs until [`Hub::run`] is polled.
    pub fn new(command_buffer: usize, shutdown: CancellationToken) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(command_buffer.max(1));
        let hub = Self {
            registry: ChannelRegistry::new(),
            commands: rx,
            shutdown,
        };
        (hub, HubHandle { commands: tx })
    }

    /// Create a hub and spawn it on the current runtime.
    pub fn spawn(command_buffer: usize, shutdown: CancellationToken) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(command_buffer, shutdown);
        let task = tokio::spawn(hub.run());
        (handle, task)
    }

    /// Process commands until shutdown or until every handle is dropped.
    ///
    /// On exit every remaining member is closed.
    pub async fn run(mut self) {
        info!("hub coordinator started");
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }
        let remaining = self.registry.drain_all();
        for member in &remaining {
            let _ = member.connection.begin_draining();
        }
        self.publish_gauges();
        info!(closed = remaining.len(), "hub coordinator stopped");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { member, ack } => {
                self.register(member);
                let _ = ack.send(());
            }
            HubCommand::Unregister {
                connection_id,
                reply,
            } => {
                let removed = self.unregister(&connection_id);
                let _ = reply.send(removed);
            }
            HubCommand::Close {
                connection_id,
                reply,
            } => {
                let closed = self.evict(&connection_id, EvictionReason::ClosedByServer);
                let _ = reply.send(closed);
            }
            HubCommand::Broadcast {
                channel_id,
                payload,
                reply,
            } => {
                let report = self.broadcast(&channel_id, &payload);
                let _ = reply.send(report);
            }
            HubCommand::ChannelConnectionCount { channel_id, reply } => {
                let _ = reply.send(self.registry.channel_len(&channel_id));
            }
            HubCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn register(&mut self, member: Member) {
        let conn = Arc::clone(&member.connection);
        if conn.is_draining() {
            debug!(conn_id = %conn.id, "skipping register of draining connection");
            return;
        }
        let _ = conn.advance(ConnectionState::Registered);
        if self.registry.insert(member).is_some() {
            warn!(conn_id = %conn.id, "connection registered twice, replaced stale queue");
        }
        debug!(
            conn_id = %conn.id,
            user_id = %conn.user_id,
            channel_id = %conn.channel_id,
            members = self.registry.channel_len(&conn.channel_id),
            "connection registered"
        );
        self.publish_gauges();
    }

    fn unregister(&mut self, connection_id: &ConnectionId) -> bool {
        let Some(member) = self.registry.remove(connection_id) else {
            return false;
        };
        debug!(
            conn_id = %connection_id,
            channel_id = %member.connection.channel_id,
            "connection unregistered"
        );
        // Dropping the member drops the only queue producer.
        drop(member);
        self.publish_gauges();
        true
    }

    fn broadcast(&mut self, channel_id: &ChannelId, payload: &Payload) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut evictions = Vec::new();

        for member in self.registry.members(channel_id) {
            if member.connection.is_draining() {
                continue;
            }
            match member.queue.try_send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    evictions.push((member.connection.id.clone(), EvictionReason::SlowConsumer));
                }
                Err(TrySendError::Closed(_)) => {
                    evictions.push((member.connection.id.clone(), EvictionReason::Disconnected));
                }
            }
        }

        // Applied after iteration so the member set is never mutated mid-walk.
        for (conn_id, reason) in evictions {
            if self.evict(&conn_id, reason) {
                report.evicted += 1;
            }
        }

        metrics::counter!(HUB_BROADCASTS_TOTAL).increment(1);
        metrics::counter!(HUB_DELIVERIES_TOTAL).increment(report.delivered as u64);
        debug!(
            channel_id = %channel_id,
            delivered = report.delivered,
            evicted = report.evicted,
            bytes = payload.as_str().len(),
            "broadcast"
        );
        report
    }

    fn evict(&mut self, connection_id: &ConnectionId, reason: EvictionReason) -> bool {
        let Some(member) = self.registry.remove(connection_id) else {
            return false;
        };
        let conn = &member.connection;
        let _ = conn.begin_draining();
        warn!(
            conn_id = %conn.id,
            user_id = %conn.user_id,
            channel_id = %conn.channel_id,
            reason = reason.as_str(),
            "connection evicted"
        );
        metrics::counter!(HUB_EVICTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        drop(member);
        self.publish_gauges();
        true
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connections: self.registry.total_len(),
            channels: self.registry.channel_count(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn publish_gauges(&self) {
        metrics::gauge!(WS_CONNECTIONS_ACTIVE).set(self.registry.total_len() as f64);
        metrics::gauge!(HUB_CHANNELS_ACTIVE).set(self.registry.channel_count() as f64);
    }
}

/// Cloneable client of the hub task.
///
/// Every method waits for the hub to process the command. Sends block while
/// the control channel is full rather than dropping the command.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, HubError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Register a connection under its channel.
    ///
    /// `queue` must be the only producer for the connection's outbound queue.
    /// Once this returns, the connection receives subsequent broadcasts.
    pub async fn register(
        &self,
        connection: Arc<ClientConnection>,
        queue: mpsc::Sender<Payload>,
    ) -> Result<(), HubError> {
        let member = Member::new(connection, queue);
        self.request(|ack| HubCommand::Register { member, ack })
            .await
    }

    /// Remove a connection and close its queue.
    ///
    /// Returns `false` if it was not registered. Safe to call repeatedly.
    pub async fn unregister(&self, connection_id: &ConnectionId) -> Result<bool, HubError> {
        let connection_id = connection_id.clone();
        self.request(|reply| HubCommand::Unregister {
            connection_id,
            reply,
        })
        .await
    }

    /// Remove a connection and tell its pumps to stop.
    pub async fn close_connection(&self, connection_id: &ConnectionId) -> Result<bool, HubError> {
        let connection_id = connection_id.clone();
        self.request(|reply| HubCommand::Close {
            connection_id,
            reply,
        })
        .await
    }

    /// Enqueue `payload` to every member of `channel_id` without blocking on any of them.
    pub async fn broadcast(
        &self,
        channel_id: &ChannelId,
        payload: Payload,
    ) -> Result<BroadcastReport, HubError> {
        let channel_id = channel_id.clone();
        self.request(|reply| HubCommand::Broadcast {
            channel_id,
            payload,
            reply,
        })
        .await
    }

    /// Number of connections subscribed to `channel_id`.
    pub async fn channel_connection_count(&self, channel_id: &ChannelId) -> Result<usize, HubError> {
        let channel_id = channel_id.clone();
        self.request(|reply| HubCommand::ChannelConnectionCount { channel_id, reply })
            .await
    }

    /// Number of registered connections across all channels.
    pub async fn total_connection_count(&self) -> Result<usize, HubError> {
        Ok(self.stats().await?.connections)
    }

    /// Number of channels with at least one member.
    pub async fn channel_count(&self) -> Result<usize, HubError> {
        Ok(self.stats().await?.channels)
    }

    /// Registry-wide counters.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.request(|reply| HubCommand::Stats { reply }).await
    }

    /// Whether the hub task has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}
