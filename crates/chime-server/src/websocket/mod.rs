//! Channel registry, hub coordinator, connection pumps, and broadcasting.

pub mod broadcaster;
pub mod connection;
pub mod envelope;
pub mod hub;
pub mod registry;
pub mod session;

/// One serialized envelope, shared read-only by every queue it is pushed to.
pub type Payload = axum::extract::ws::Utf8Bytes;
