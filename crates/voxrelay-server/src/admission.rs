//! Origin admission filter.
//!
//! Evaluated against the `Origin` header before the WebSocket upgrade
//! completes. A rejected handshake never sees a frame.

use voxrelay_core::errors::AdmissionError;
use voxrelay_settings::AdmissionSettings;

/// Allow-list predicate over declared origins.
#[derive(Clone, Debug)]
pub struct OriginFilter {
    extension_prefixes: Vec<String>,
    local_hosts: Vec<String>,
    allowed_domains: Vec<String>,
}

impl OriginFilter {
    /// Build a filter from admission settings.
    pub fn new(settings: &AdmissionSettings) -> Self {
        Self {
            extension_prefixes: settings.extension_prefixes.clone(),
            local_hosts: settings
                .local_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            allowed_domains: settings
                .allowed_domains
                .iter()
                .filter(|d| !d.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// Accept or reject a handshake.
    ///
    /// Accepted when the origin is absent, starts with an extension scheme
    /// prefix, names a local host, or contains an allowed domain.
    pub fn check(&self, origin: Option<&str>) -> Result<(), AdmissionError> {
        let Some(origin) = origin else {
            return Ok(());
        };
        if self.is_allowed(origin) {
            Ok(())
        } else {
            Err(AdmissionError::OriginRejected {
                origin: origin.to_string(),
            })
        }
    }

    fn is_allowed(&self, origin: &str) -> bool {
        if self
            .extension_prefixes
            .iter()
            .any(|p| origin.starts_with(p.as_str()))
        {
            return true;
        }
        if let Some(host) = origin_host(origin) {
            let host = host.to_ascii_lowercase();
            if self.local_hosts.iter().any(|h| *h == host) {
                return true;
            }
        }
        self.allowed_domains
            .iter()
            .any(|d| origin.contains(d.as_str()))
    }
}

impl Default for OriginFilter {
    fn default() -> Self {
        Self::new(&AdmissionSettings::default())
    }
}

/// Host part of a serialized origin (`scheme://host[:port]`).
///
/// Bracketed IPv6 literals keep their brackets.
fn origin_host(origin: &str) -> Option<&str> {
    let (_, rest) = origin.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host = if authority.starts_with('[') {
        let end = authority.find(']')?;
        &authority[..=end]
    } else {
        authority.split(':').next().unwrap_or(authority)
    };
    (!host.is_empty()).then_some(host)
}
