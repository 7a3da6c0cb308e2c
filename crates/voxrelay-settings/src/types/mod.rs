//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may set any subset of fields; everything missing keeps its compiled
//! default.

mod sections;

pub use sections::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the relay.
///
/// # JSON Format
///
/// ```json
/// {
///   "server": { "port": 8080 },
///   "upstream": { "model": "gpt-4o-realtime-preview-2024-12-17" },
///   "admission": { "allowedDomains": ["example.com"] }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Realtime API connection settings.
    pub upstream: UpstreamSettings,
    /// Origin allow-list.
    pub admission: AdmissionSettings,
    /// Per-session limits and reconnection policy.
    pub session: SessionSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Check the settings are usable for serving.
    ///
    /// A missing API key is the one startup-fatal condition.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.api_key().is_none() {
            return Err(SettingsError::MissingCredential);
        }
        if self.upstream.model.trim().is_empty() {
            return Err(SettingsError::InvalidValue("upstream.model must not be empty".into()));
        }
        if self.session.max_sessions_per_origin == 0 {
            return Err(SettingsError::InvalidValue(
                "session.maxSessionsPerOrigin must be at least 1".into(),
            ));
        }
        if self.session.pending_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "session.pendingQueueCapacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
