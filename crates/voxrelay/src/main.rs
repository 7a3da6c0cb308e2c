//! # voxrelay
//!
//! Relay binary: loads settings, starts logging and metrics, serves the
//! WebSocket relay, and shuts down gracefully on SIGINT or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use voxrelay_core::logging::{self, LogFormat};
use voxrelay_server::config::ServerConfig;
use voxrelay_server::server::RelayServer;
use voxrelay_server::upstream::RealtimeConnector;
use voxrelay_settings::RelaySettings;

/// Realtime voice WebSocket relay.
#[derive(Parser, Debug)]
#[command(name = "voxrelay", about = "Realtime voice WebSocket relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Upstream realtime model identifier.
    #[arg(long)]
    model: Option<String>,

    /// Path to the settings file (default `~/.voxrelay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// CLI flags are the highest-priority settings layer.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref model) = self.model {
            settings.upstream.model.clone_from(model);
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

fn load(cli: &Cli) -> Result<RelaySettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(voxrelay_settings::settings_path);
    let mut settings = voxrelay_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    logging::init_subscriber(&settings.logging.level, format);

    let metrics_handle = voxrelay_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let connector = Arc::new(RealtimeConnector::new(&settings.upstream));
    tracing::info!(upstream = %connector.endpoint(), "upstream configured");

    let server = RelayServer::new(ServerConfig::from_settings(&settings), connector, metrics_handle);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("voxrelay listening on ws://{addr}/ws");

    shutdown_signal().await?;

    tracing::info!("Shutting down...");
    server.shutdown_gracefully(handle).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
