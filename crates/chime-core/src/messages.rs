//! Chat message records as persisted by the system of record.
//!
//! The hub never inspects these beyond serializing them into an envelope;
//! they are defined here so the broadcast payload stays strongly typed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, MessageId, UserId};

/// A message posted to a channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    /// Message ID.
    pub id: MessageId,
    /// Channel the message was posted to.
    pub channel_id: ChannelId,
    /// Author.
    pub user_id: UserId,
    /// Author display name, when the caller joined it in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Message body.
    pub content: String,
    /// When the message was first posted.
    pub timestamp: DateTime<Utc>,
    /// Whether the message has been edited since posting.
    #[serde(default)]
    pub is_edited: bool,
    /// Soft-delete marker.
    #[serde(default)]
    pub is_deleted: bool,
    /// Time of the most recent edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    /// Attachment IDs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl ChannelMessage {
    /// Build a freshly posted message.
    pub fn new(
        id: impl Into<MessageId>,
        channel_id: impl Into<ChannelId>,
        user_id: impl Into<UserId>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            username: None,
            content: content.into(),
            timestamp: Utc::now(),
            is_edited: false,
            is_deleted: false,
            edited_at: None,
            attachments: Vec::new(),
        }
    }

    /// Return an edited copy carrying the new body and edit time.
    #[must_use]
    pub fn edited(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self.is_edited = true;
        self.edited_at = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let msg = ChannelMessage::new("m1", "general", "u1", "hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["id"], "m1");
        assert_eq!(json["channelId"], "general");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["content"], "hello");
        assert_eq!(json["isEdited"], false);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn optional_fields_omitted_when_empty() {
        let msg = ChannelMessage::new("m1", "general", "u1", "hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("editedAt").is_none());
        assert!(json.get("attachments").is_none());
        assert!(json.get("username").is_none());
    }

    #[test]
    fn edited_sets_flag_and_time() {
        let msg = ChannelMessage::new("m1", "general", "u1", "hello").edited("bye");
        assert_eq!(msg.content, "bye");
        assert!(msg.is_edited);
        assert!(msg.edited_at.is_some());
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json["editedAt"].is_string());
    }

    #[test]
    fn deserializes_without_optional_fields() {
        let json = r#"{"id":"m2","channelId":"c","userId":"u","content":"x","timestamp":"2026-01-01T00:00:00Z"}"#;
        let msg: ChannelMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id.as_str(), "m2");
        assert!(!msg.is_deleted);
        assert!(msg.attachments.is_empty());
    }
}
