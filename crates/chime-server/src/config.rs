//! Server and connection configuration.

use std::time::Duration;

use chime_settings::ChimeSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the chime server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Capacity of the hub's control channel.
    pub hub_command_buffer: usize,
    /// Per-connection policy.
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            hub_command_buffer: 1024,
            connection: ConnectionConfig::default(),
        }
    }
}

impl From<&ChimeSettings> for ServerConfig {
    fn from(settings: &ChimeSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            hub_command_buffer: settings.server.hub_command_buffer,
            connection: ConnectionConfig {
                write_wait: settings.connection.write_wait(),
                ping_period: settings.connection.ping_period(),
                pong_wait: settings.connection.pong_wait(),
                max_message_size: settings.connection.max_message_size,
                send_buffer: settings.connection.send_buffer,
            },
        }
    }
}

/// Liveness and back-pressure policy applied to every connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Deadline for one write (payload batch, ping, or close frame).
    pub write_wait: Duration,
    /// Interval between server pings.
    pub ping_period: Duration,
    /// Close the connection if nothing is read for this long.
    pub pong_wait: Duration,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Outbound queue capacity, in messages.
    pub send_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            write_wait: Duration::from_secs(10),
            ping_period: Duration::from_secs(60),
            pong_wait: Duration::from_secs(70),
            max_message_size: 512 * 1024,
            send_buffer: 256,
        }
    }
}
