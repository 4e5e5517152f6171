//! # chime-server
//!
//! Real-time fan-out hub for chat channels.
//!
//! - `WebSocket` gateway: admission seam, upgrade, per-connection read/write pumps
//! - Hub coordinator: single task owning channel membership, reached only by message passing
//! - Broadcaster: encodes message created/updated/deleted envelopes and hands them to the hub
//! - Slow consumers are evicted instead of stalling a broadcast
//! - HTTP endpoints: health check, Prometheus metrics
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod admission;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use admission::{Admission, ChannelAccess, JwtAdmission, OpenChannelAccess};
pub use config::{ConnectionConfig, ServerConfig};
pub use errors::{AdmissionError, BroadcastError, HubError};
pub use server::ChimeServer;
pub use websocket::broadcaster::Broadcaster;
pub use websocket::envelope::Envelope;
pub use websocket::hub::{BroadcastReport, Hub, HubHandle, HubStats};
