//! Wire envelope for channel notifications.
//!
//! ```json
//! {"type":"message","message":{...},"timestamp":"2026-01-01T00:00:00Z"}
//! {"type":"message_update","message":{...},"timestamp":"..."}
//! {"type":"message_delete","messageId":"m1","timestamp":"..."}
//! ```
//!
//! `timestamp` is the event time, taken when the envelope is built.

use chime_core::{ChannelMessage, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Payload;

/// One notification, tagged by kind. Never mixes `message` and `messageId`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// A message was posted.
    Message {
        /// The posted message.
        message: ChannelMessage,
        /// Event time.
        timestamp: DateTime<Utc>,
    },
    /// A message was edited.
    MessageUpdate {
        /// The message after the edit.
        message: ChannelMessage,
        /// Event time.
        timestamp: DateTime<Utc>,
    },
    /// A message was deleted.
    MessageDelete {
        /// ID of the deleted message.
        #[serde(rename = "messageId")]
        message_id: MessageId,
        /// Event time.
        timestamp: DateTime<Utc>,
    },
}

impl Envelope {
    /// Envelope for a newly posted message.
    pub fn created(message: ChannelMessage) -> Self {
        Self::Message {
            message,
            timestamp: Utc::now(),
        }
    }

    /// Envelope for an edited message.
    pub fn updated(message: ChannelMessage) -> Self {
        Self::MessageUpdate {
            message,
            timestamp: Utc::now(),
        }
    }

    /// Envelope for a deleted message.
    pub fn deleted(message_id: MessageId) -> Self {
        Self::MessageDelete {
            message_id,
            timestamp: Utc::now(),
        }
    }

    /// Wire value of the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::MessageUpdate { .. } => "message_update",
            Self::MessageDelete { .. } => "message_delete",
        }
    }

    /// Event time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Message { timestamp, .. }
            | Self::MessageUpdate { timestamp, .. }
            | Self::MessageDelete { timestamp, .. } => *timestamp,
        }
    }

    /// Serialize once into a payload that can be shared by every recipient.
    pub fn encode(&self) -> Result<Payload, serde_json::Error> {
        serde_json::to_string(self).map(Payload::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn decode(envelope: &Envelope) -> Value {
        serde_json::from_str(envelope.encode().unwrap().as_str()).unwrap()
    }

    #[test]
    fn created_wire_shape() {
        let msg = ChannelMessage::new("m1", "general", "u1", "hello");
        let json = decode(&Envelope::created(msg));
        assert_eq!(json["type"], "message");
        assert_eq!(json["message"]["id"], "m1");
        assert_eq!(json["message"]["content"], "hello");
        assert_eq!(json["message"]["channelId"], "general");
        assert!(json["timestamp"].is_string());
        assert!(json.get("messageId").is_none());
    }

    #[test]
    fn updated_wire_shape() {
        let msg = ChannelMessage::new("m1", "general", "u1", "hello").edited("hello!");
        let json = decode(&Envelope::updated(msg));
        assert_eq!(json["type"], "message_update");
        assert_eq!(json["message"]["content"], "hello!");
        assert_eq!(json["message"]["isEdited"], true);
        assert!(json.get("messageId").is_none());
    }

    #[test]
    fn deleted_carries_only_id() {
        let json = decode(&Envelope::deleted(MessageId::from("m1")));
        assert_eq!(json["type"], "message_delete");
        assert_eq!(json["messageId"], "m1");
        assert!(json.get("message").is_none());
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn kind_matches_type_field() {
        let msg = ChannelMessage::new("m1", "general", "u1", "hello");
        for envelope in [
            Envelope::created(msg.clone()),
            Envelope::updated(msg),
            Envelope::deleted(MessageId::from("m1")),
        ] {
            assert_eq!(decode(&envelope)["type"], envelope.kind());
        }
    }

    #[test]
    fn timestamp_is_event_time() {
        let before = Utc::now();
        let envelope = Envelope::deleted(MessageId::from("m1"));
        let after = Utc::now();
        assert!(envelope.timestamp() >= before && envelope.timestamp() <= after);

        let parsed: DateTime<Utc> = decode(&envelope)["timestamp"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(parsed, envelope.timestamp());
    }

    #[test]
    fn decodes_what_it_encodes() {
        let envelope = Envelope::updated(ChannelMessage::new("m2", "random", "u2", "edit"));
        let payload = envelope.encode().unwrap();
        let back: Envelope = serde_json::from_str(payload.as_str()).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn encoding_is_deterministic() {
        let envelope = Envelope::created(ChannelMessage::new("m1", "general", "u1", "hi"));
        assert_eq!(envelope.encode().unwrap(), envelope.encode().unwrap());
    }
}
