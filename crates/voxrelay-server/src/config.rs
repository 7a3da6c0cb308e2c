//! Server configuration.

use std::time::Duration;

use voxrelay_settings::{AdmissionSettings, RelaySettings};

use crate::registry::DEFAULT_MAX_SESSIONS_PER_ORIGIN;
use crate::session::SessionConfig;

/// Configuration for the relay server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max downstream WebSocket message size in bytes.
    pub max_message_size: usize,
    /// How long shutdown waits for sessions to close.
    pub shutdown_timeout: Duration,
    /// Concurrent sessions per origin before the oldest is evicted.
    pub max_sessions_per_origin: usize,
    /// Per-session queue and reconnect settings.
    pub session: SessionConfig,
    /// Origin allow-list.
    pub admission: AdmissionSettings,
}

impl ServerConfig {
    /// Derive server configuration from loaded settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_message_size: settings.server.max_message_size,
            shutdown_timeout: Duration::from_secs(settings.server.shutdown_timeout_secs),
            max_sessions_per_origin: settings.session.max_sessions_per_origin,
            session: SessionConfig {
                pending_queue_capacity: settings.session.pending_queue_capacity,
                reconnect: settings.session.reconnect.clone(),
            },
            admission: settings.admission.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            shutdown_timeout: Duration::from_secs(10),
            max_sessions_per_origin: DEFAULT_MAX_SESSIONS_PER_ORIGIN,
            session: SessionConfig::default(),
            admission: AdmissionSettings::default(),
        }
    }
}
