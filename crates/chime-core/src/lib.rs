//! # chime-core
//!
//! Shared vocabulary for the chime real-time hub.
//!
//! - **Branded IDs**: `ConnectionId`, `ChannelId`, `UserId`, `MessageId` as newtypes for type safety
//! - **Messages**: `ChannelMessage`, the persisted chat message carried by broadcast envelopes
//! - **Logging**: `tracing` subscriber initialisation shared by binaries and tests

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod messages;

pub use ids::{ChannelId, ConnectionId, MessageId, UserId};
pub use messages::ChannelMessage;
