//! Server, upstream, admission, session, and logging settings.

use std::fmt;

use serde::{Deserialize, Serialize};
use voxrelay_core::retry::ReconnectPolicy;

/// Listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port (`0` auto-assigns).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Seconds to wait for in-flight handlers on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_message_size: 16 * 1024 * 1024,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Realtime API connection settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamSettings {
    /// Base WebSocket URL; the model is appended as `?model=`.
    pub url: String,
    /// Realtime model identifier.
    pub model: String,
    /// Bearer credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Value of the `OpenAI-Beta` protocol-version header.
    pub beta_header: String,
    /// Dial timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl UpstreamSettings {
    /// The API key, if set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// Full dial URL including the model query parameter.
    pub fn endpoint(&self) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{sep}model={}", self.url, self.model)
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            url: "wss://api.openai.com/v1/realtime".to_string(),
            model: "gpt-4o-realtime-preview-2024-12-17".to_string(),
            api_key: None,
            beta_header: "realtime=v1".to_string(),
            connect_timeout_ms: 10_000,
        }
    }
}

impl fmt::Debug for UpstreamSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamSettings")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("beta_header", &self.beta_header)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

/// Origin allow-list for inbound handshakes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdmissionSettings {
    /// Browser-extension scheme prefixes that are always accepted.
    pub extension_prefixes: Vec<String>,
    /// Hostnames treated as local development.
    pub local_hosts: Vec<String>,
    /// Application domains accepted by substring match.
    pub allowed_domains: Vec<String>,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            extension_prefixes: vec![
                "chrome-extension://".to_string(),
                "moz-extension://".to_string(),
            ],
            local_hosts: vec![
                "localhost".to_string(),
                "127.0.0.1".to_string(),
                "[::1]".to_string(),
            ],
            allowed_domains: Vec::new(),
        }
    }
}

/// Per-session limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Concurrent sessions per origin before the oldest is evicted.
    pub max_sessions_per_origin: usize,
    /// Control frames buffered while upstream is not open.
    pub pending_queue_capacity: usize,
    /// Upstream reconnection policy.
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions_per_origin: 3,
            pending_queue_capacity: 50,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
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
