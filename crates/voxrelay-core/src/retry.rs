//! Upstream reconnection policy.
//!
//! Pure decision logic, no timers: the session driver owns the actual
//! `tokio::time::Sleep`. Given the close code of the upstream socket, the
//! number of attempts already made, and the last upstream-declared failure,
//! [`ReconnectPolicy::decide`] says whether to redial and after how long.
//!
//! Two delay curves:
//! - server outage (`error.type == "server_error"`): linear, `step * attempt`
//! - anything else: exponential, `base * 2^(attempt - 1)`

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default maximum reconnect attempts per disconnect streak.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default base delay for exponential backoff in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default cap for exponential backoff in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default linear step after a server outage in milliseconds.
pub const DEFAULT_SERVER_ERROR_STEP_MS: u64 = 10_000;
/// Default cap for the server-outage curve in milliseconds.
pub const DEFAULT_SERVER_ERROR_MAX_DELAY_MS: u64 = 60_000;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (server shutdown).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// No status code present in the close frame.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Internal server error.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Classification of the last upstream-declared error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// No error since the last successful open.
    #[default]
    None,
    /// Upstream reported `server_error`.
    ServerError,
    /// Upstream reported any other error.
    Other,
}

impl FailureKind {
    /// Classify an upstream `error.type` subtype.
    pub fn from_subtype(subtype: Option<&str>) -> Self {
        if subtype == Some(crate::protocol::ERROR_SUBTYPE_SERVER) {
            Self::ServerError
        } else {
            Self::Other
        }
    }
}

/// Reconnection parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    /// Maximum attempts before giving up (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Exponential backoff cap in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Linear step after a server outage in ms (default: 10000).
    #[serde(default = "default_server_error_step_ms")]
    pub server_error_step_ms: u64,
    /// Server-outage delay cap in ms (default: 60000).
    #[serde(default = "default_server_error_max_delay_ms")]
    pub server_error_max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_server_error_step_ms() -> u64 {
    DEFAULT_SERVER_ERROR_STEP_MS
}
fn default_server_error_max_delay_ms() -> u64 {
    DEFAULT_SERVER_ERROR_MAX_DELAY_MS
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            server_error_step_ms: DEFAULT_SERVER_ERROR_STEP_MS,
            server_error_max_delay_ms: DEFAULT_SERVER_ERROR_MAX_DELAY_MS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of evaluating an upstream close.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Redial after `delay`. `attempt` is the incremented counter.
    Retry {
        /// 1-based attempt number.
        attempt: u32,
        /// Time to wait before dialing.
        delay: Duration,
    },
    /// Stop retrying automatically.
    GiveUp(GiveUpReason),
}

/// Why automatic reconnection stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The last upstream error was a server outage.
    ServerOutage,
    /// The retry budget is spent.
    AttemptsExhausted {
        /// Attempts made.
        attempts: u32,
    },
    /// The close code is not one we retry on.
    AbnormalClose {
        /// Close code received.
        code: u16,
    },
}

impl GiveUpReason {
    /// Text sent to the client with the terminal `failed` status.
    pub fn message(&self) -> String {
        match self {
            Self::ServerOutage => {
                "The voice service is experiencing a server-side outage. Please try again later."
                    .to_string()
            }
            Self::AttemptsExhausted { attempts } => {
                format!("Failed to reconnect after {attempts} attempts")
            }
            Self::AbnormalClose { code } => {
                format!("Connection to the voice service closed unexpectedly (code: {code})")
            }
        }
    }
}

impl ReconnectPolicy {
    /// Whether a close code is eligible for automatic retry.
    pub fn is_retryable_close(code: u16) -> bool {
        code == CLOSE_NORMAL || code == CLOSE_NO_STATUS
    }

    /// Delay before the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32, failure: FailureKind) -> Duration {
        let attempt = attempt.max(1);
        let ms = match failure {
            FailureKind::ServerError => self
                .server_error_step_ms
                .saturating_mul(u64::from(attempt))
                .min(self.server_error_max_delay_ms),
            FailureKind::None | FailureKind::Other => self
                .base_delay_ms
                .saturating_mul(1u64 << (attempt - 1).min(31))
                .min(self.max_delay_ms),
        };
        Duration::from_millis(ms)
    }

    /// Evaluate an upstream close.
    pub fn decide(&self, close_code: u16, attempts: u32, failure: FailureKind) -> ReconnectDecision {
        if Self::is_retryable_close(close_code) && attempts < self.max_attempts {
            let attempt = attempts + 1;
            return ReconnectDecision::Retry {
                attempt,
                delay: self.delay_for(attempt, failure),
            };
        }
        let reason = if failure == FailureKind::ServerError {
            GiveUpReason::ServerOutage
        } else if Self::is_retryable_close(close_code) {
            GiveUpReason::AttemptsExhausted { attempts }
        } else {
            GiveUpReason::AbnormalClose { code: close_code }
        };
        ReconnectDecision::GiveUp(reason)
    }
}
