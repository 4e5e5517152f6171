//! Notification façade used by message handlers after a durable write.

use chime_core::{ChannelId, ChannelMessage, MessageId};
use tracing::{debug, instrument};

use super::envelope::Envelope;
use super::hub::{BroadcastReport, HubHandle};
use crate::errors::BroadcastError;

/// Builds envelopes and hands them to the hub.
///
/// Per-subscriber delivery failures are not errors; they show up as
/// evictions in the returned [`BroadcastReport`].
#[derive(Clone, Debug)]
pub struct Broadcaster {
    hub: HubHandle,
}

impl Broadcaster {
    /// Wrap a hub handle.
    pub fn new(hub: HubHandle) -> Self {
        Self { hub }
    }

    /// Notify subscribers of `channel_id` that a message was posted.
    pub async fn notify_created(
        &self,
        channel_id: &ChannelId,
        message: ChannelMessage,
    ) -> Result<BroadcastReport, BroadcastError> {
        self.publish(channel_id, &Envelope::created(message)).await
    }

    /// Notify subscribers of `channel_id` that a message was edited.
    pub async fn notify_updated(
        &self,
        channel_id: &ChannelId,
        message: ChannelMessage,
    ) -> Result<BroadcastReport, BroadcastError> {
        self.publish(channel_id, &Envelope::updated(message)).await
    }

    /// Notify subscribers of `channel_id` that a message was deleted.
    pub async fn notify_deleted(
        &self,
        channel_id: &ChannelId,
        message_id: MessageId,
    ) -> Result<BroadcastReport, BroadcastError> {
        self.publish(channel_id, &Envelope::deleted(message_id)).await
    }

    /// Encode `envelope` once and fan it out.
    ///
    /// Nothing is enqueued if encoding fails.
    #[instrument(skip_all, fields(channel_id = %channel_id, kind = envelope.kind()))]
    pub async fn publish(
        &self,
        channel_id: &ChannelId,
        envelope: &Envelope,
    ) -> Result<BroadcastReport, BroadcastError> {
        let payload = envelope.encode()?;
        let report = self.hub.broadcast(channel_id, payload).await?;
        debug!(delivered = report.delivered, evicted = report.evicted, "notification published");
        Ok(report)
    }

    /// The underlying hub handle.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }
}
