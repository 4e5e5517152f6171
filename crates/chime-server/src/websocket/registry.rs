//! Channel membership bookkeeping.
//!
//! Owned by the hub task and never shared. A channel entry exists only while
//! it has at least one member; removing the last member removes the entry in
//! the same call.

use std::collections::HashMap;
use std::sync::Arc;

use chime_core::{ChannelId, ConnectionId};
use tokio::sync::mpsc;

use super::Payload;
use super::connection::ClientConnection;

/// A registered connection together with the producer side of its queue.
///
/// The registry holds the only `Sender`, so dropping a `Member` is what
/// closes the connection's outbound queue.
pub struct Member {
    /// The subscriber.
    pub connection: Arc<ClientConnection>,
    /// Producer side of the bounded outbound queue.
    pub queue: mpsc::Sender<Payload>,
}

impl Member {
    /// Pair a connection with its queue.
    pub fn new(connection: Arc<ClientConnection>, queue: mpsc::Sender<Payload>) -> Self {
        Self { connection, queue }
    }
}

/// Channel ID → members, plus a reverse index from connection to channel.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<ChannelId, HashMap<ConnectionId, Member>>,
    index: HashMap<ConnectionId, ChannelId>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `member` to its connection's channel, creating the entry if absent.
    ///
    /// Returns the member previously registered under the same connection ID,
    /// if any. Dropping it closes the stale queue.
    pub fn insert(&mut self, member: Member) -> Option<Member> {
        let conn_id = member.connection.id.clone();
        let channel_id = member.connection.channel_id.clone();
        let previous = self.remove(&conn_id);
        let _ = self.index.insert(conn_id.clone(), channel_id.clone());
        let _ = self
            .channels
            .entry(channel_id)
            .or_default()
            .insert(conn_id, member);
        previous
    }

    /// Remove a connection from whatever channel it belongs to.
    ///
    /// Returns `None` if it was not registered.
    pub fn remove(&mut self, conn_id: &ConnectionId) -> Option<Member> {
        let channel_id = self.index.remove(conn_id)?;
        let members = self.channels.get_mut(&channel_id)?;
        let member = members.remove(conn_id);
        if members.is_empty() {
            let _ = self.channels.remove(&channel_id);
        }
        member
    }

    /// Members of a channel, in no particular order.
    pub fn members(&self, channel_id: &ChannelId) -> impl Iterator<Item = &Member> {
        self.channels
            .get(channel_id)
            .into_iter()
            .flat_map(HashMap::values)
    }

    /// Whether the connection is currently registered.
    pub fn contains(&self, conn_id: &ConnectionId) -> bool {
        self.index.contains_key(conn_id)
    }

    /// Whether the channel has an entry (and therefore at least one member).
    pub fn contains_channel(&self, channel_id: &ChannelId) -> bool {
        self.channels.contains_key(channel_id)
    }

    /// Number of members in one channel.
    pub fn channel_len(&self, channel_id: &ChannelId) -> usize {
        self.channels.get(channel_id).map_or(0, HashMap::len)
    }

    /// Number of registered connections across all channels.
    pub fn total_len(&self) -> usize {
        self.index.len()
    }

    /// Number of channels with at least one member.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Remove every member, leaving the registry empty.
    pub fn drain_all(&mut self) -> Vec<Member> {
        self.index.clear();
        self.channels
            .drain()
            .flat_map(|(_, members)| members.into_values())
            .collect()
    }
}
