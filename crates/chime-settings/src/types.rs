//! Settings types.
//!
//! Every struct is `#[serde(default)]` so a partial settings file only needs
//! the keys it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChimeSettings {
    /// Network and coordinator settings.
    pub server: ServerSettings,
    /// Per-connection timing and buffering policy.
    pub connection: ConnectionSettings,
    /// Admission (token validation) settings.
    pub auth: AuthSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl ChimeSettings {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let c = &self.connection;
        if c.pong_wait_ms <= c.ping_period_ms {
            return Err(SettingsError::InvalidValue(format!(
                "connection.pongWaitMs ({}) must exceed connection.pingPeriodMs ({})",
                c.pong_wait_ms, c.ping_period_ms
            )));
        }
        if c.send_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.sendBuffer must be at least 1".into(),
            ));
        }
        if c.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.maxMessageSize must be at least 1".into(),
            ));
        }
        if c.ping_period_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.pingPeriodMs must be at least 1".into(),
            ));
        }
        if c.write_wait_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.writeWaitMs must be at least 1".into(),
            ));
        }
        if self.server.hub_command_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "server.hubCommandBuffer must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP / WebSocket port.
    pub port: u16,
    /// Capacity of the hub's control channel.
    pub hub_command_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            hub_command_buffer: 1024,
        }
    }
}

/// Connection liveness and back-pressure policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Deadline for a single write (payload batch or ping) in milliseconds.
    pub write_wait_ms: u64,
    /// Interval between server pings in milliseconds.
    pub ping_period_ms: u64,
    /// Read-liveness deadline in milliseconds. Must exceed `ping_period_ms`.
    pub pong_wait_ms: u64,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
    /// Outbound queue capacity (messages).
    pub send_buffer: usize,
}

impl ConnectionSettings {
    /// Write deadline as a `Duration`.
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    /// Ping interval as a `Duration`.
    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms)
    }

    /// Read deadline as a `Duration`.
    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            write_wait_ms: 10_000,
            ping_period_ms: 60_000,
            pong_wait_ms: 70_000,
            max_message_size: 512 * 1024,
            send_buffer: 256,
        }
    }
}

/// Token validation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HMAC secret for HS256 tokens. Empty rejects every token.
    pub jwt_secret: String,
    /// Claim holding the user ID.
    pub user_claim: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            user_claim: "userID".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (`RUST_LOG` takes precedence).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
