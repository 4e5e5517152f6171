//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

use crate::websocket::hub::HubStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the hub answers, `"degraded"` once it has stopped.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered connections.
    pub connections: usize,
    /// Channels with at least one member.
    pub channels: usize,
}

/// Build a health response from hub counters. `None` means the hub is gone.
pub fn health_check(start_time: Instant, stats: Option<HubStats>) -> HealthResponse {
    let status = if stats.is_some() { "ok" } else { "degraded" };
    let stats = stats.unwrap_or_default();
    HealthResponse {
        status,
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.connections,
        channels: stats.channels,
    }
}
