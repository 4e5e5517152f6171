//! # chime-gateway
//!
//! Chime server binary: loads settings, initialises logging and metrics,
//! starts the hub and HTTP/WebSocket listener, and shuts down on `ctrl-c`.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chime_core::logging::{LogFormat, init_subscriber};
use chime_server::{ChimeServer, JwtAdmission, OpenChannelAccess, ServerConfig};
use chime_settings::ChimeSettings;
use clap::Parser;
use tracing::{info, warn};

/// Chime real-time fan-out server.
#[derive(Parser, Debug)]
#[command(name = "chime-gateway", about = "Chime real-time fan-out server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `$CHIME_HOME/settings.json` or `~/.chime/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(chime_settings::settings_path)
    }

    /// Apply flag overrides on top of file and environment settings.
    fn apply(&self, settings: &mut ChimeSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli.settings_path();
    let mut settings = chime_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    cli.apply(&mut settings);

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);
    info!(path = %settings_path.display(), "settings loaded");

    if settings.auth.jwt_secret.is_empty() {
        warn!("auth.jwtSecret is empty, every connection will be rejected");
    }

    let metrics = chime_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let admission = JwtAdmission::from_settings(&settings.auth, Arc::new(OpenChannelAccess));
    let server = ChimeServer::new(
        ServerConfig::from(&settings),
        Arc::new(admission),
        Some(metrics),
    );

    let addr = server
        .listen()
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                settings.server.host, settings.server.port
            )
        })?;
    info!(%addr, "chime gateway ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("shutdown requested");
    server.shutdown().shutdown_and_wait(None).await;
    info!("shutdown complete");
    Ok(())
}
