//! Wire vocabulary shared by the downstream and upstream protocols.
//!
//! Downstream (client ⇄ relay) frames are JSON objects tagged by `type`. The
//! relay itself only originates the [`ClientEvent`] notifications below; all
//! other downstream traffic is upstream frames forwarded verbatim.

use serde::{Deserialize, Serialize};

/// Downstream request to establish the upstream connection.
pub const KIND_CONNECT: &str = "connect";
/// Downstream liveness probe, answered locally.
pub const KIND_PING: &str = "ping";
/// Audio chunk appended to the upstream input buffer.
pub const KIND_AUDIO_APPEND: &str = "input_audio_buffer.append";

/// Upstream confirmation that the realtime session is initialized.
pub const KIND_SESSION_CREATED: &str = "session.created";
/// Upstream acknowledgement of a session configuration change.
pub const KIND_SESSION_UPDATED: &str = "session.updated";
/// Upstream-declared error.
pub const KIND_ERROR: &str = "error";
/// Nested `error.type` marking a server-side outage.
pub const ERROR_SUBTYPE_SERVER: &str = "server_error";

/// Status values carried by `connection_status` notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Upstream transport opened.
    Connected,
    /// Upstream transport closed; a retry may follow.
    Disconnected,
    /// This session was evicted by a newer one from the same origin.
    Replaced,
    /// Automatic reconnection gave up.
    Failed,
}

/// Notification originated by the relay and sent to a downstream client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Sent once after the downstream handshake is accepted.
    Welcome {
        /// Human-readable greeting.
        message: String,
        /// Session identity assigned by the relay.
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// Upstream lifecycle change.
    ConnectionStatus {
        /// New status.
        status: ConnectionStatus,
        /// Human-readable explanation.
        message: String,
    },
    /// Transport or protocol error surfaced to the client.
    Error {
        /// Short error summary.
        error: String,
        /// Underlying cause.
        details: String,
    },
    /// Reply to a downstream `ping`.
    Pong,
}

impl ClientEvent {
    /// Build a `welcome` notification.
    pub fn welcome(client_id: impl Into<String>) -> Self {
        Self::Welcome {
            message: "Connected to voice relay".into(),
            client_id: client_id.into(),
        }
    }

    /// Build a `connection_status` notification.
    pub fn status(status: ConnectionStatus, message: impl Into<String>) -> Self {
        Self::ConnectionStatus {
            status,
            message: message.into(),
        }
    }

    /// Build an `error` notification.
    pub fn error(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            details: details.into(),
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize client event");
            String::new()
        })
    }
}
