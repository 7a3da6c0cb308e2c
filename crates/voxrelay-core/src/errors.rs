//! Error hierarchy for the relay.
//!
//! - [`AdmissionError`]: handshake refused before any frame is exchanged
//! - [`UpstreamError`]: dialing or talking to the realtime API failed
//!
//! Neither is fatal to the process. Admission errors become an HTTP status on
//! the upgrade request; upstream errors are reported to the affected client as
//! an `error` notification and then drive the reconnection policy through the
//! close event that follows.

use thiserror::Error;

/// Inbound handshake refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The declared `Origin` is not on the allow-list.
    #[error("origin not allowed: {origin}")]
    OriginRejected {
        /// The rejected origin.
        origin: String,
    },
}

/// Failure on the upstream realtime connection.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The handshake request could not be built (bad URL or header value).
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    /// The connection could not be established.
    #[error("failed to connect to upstream: {0}")]
    Connect(String),

    /// The connection failed after it was established.
    #[error("upstream transport error: {0}")]
    Transport(String),
}

impl UpstreamError {
    /// Short summary for the client `error` notification.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "Invalid upstream configuration",
            Self::Connect(_) => "Failed to connect to voice service",
            Self::Transport(_) => "Voice service connection error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_rejected_display() {
        let err = AdmissionError::OriginRejected {
            origin: "https://evil.example".into(),
        };
        assert_eq!(err.to_string(), "origin not allowed: https://evil.example");
    }

    #[test]
    fn upstream_display() {
        let err = UpstreamError::Connect("refused".into());
        assert_eq!(err.to_string(), "failed to connect to upstream: refused");
    }

    #[test]
    fn summaries_are_distinct() {
        let a = UpstreamError::InvalidRequest(String::new()).summary();
        let b = UpstreamError::Connect(String::new()).summary();
        let c = UpstreamError::Transport(String::new()).summary();
        assert_ne!(a, b);
        assert_ne!(b, c);
    }
}
