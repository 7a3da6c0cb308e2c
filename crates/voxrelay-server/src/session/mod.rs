//! Client sessions.
//!
//! A session is split in two:
//! - [`ClientSession`]: a synchronous state machine. Every input (downstream
//!   frame, upstream event, timer, command) returns a list of [`Effect`]s.
//! - [`run_session`]: the async driver that owns the channels, the upstream
//!   link, and the reconnect timer, and executes effects in order.

mod driver;
mod state;

pub use driver::{SessionIo, run_session};
pub use state::{ClientSession, LinkState};

use std::time::Duration;

use voxrelay_core::frame::Frame;
use voxrelay_core::protocol::ClientEvent;
use voxrelay_core::retry::ReconnectPolicy;

/// Default bound on control frames buffered while upstream is not open.
pub const DEFAULT_PENDING_QUEUE_CAPACITY: usize = 50;

/// Out-of-band instruction to a running session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    /// Evicted by a newer session from the same origin.
    Replace,
    /// The server is shutting down.
    Shutdown,
}

/// Message for the downstream socket writer.
#[derive(Clone, Debug, PartialEq)]
pub enum Downstream {
    /// Forward a frame verbatim.
    Frame(Frame),
    /// Send a relay-originated notification.
    Event(ClientEvent),
    /// Send a close frame and stop writing.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Action requested by the state machine.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Write to the downstream socket.
    SendDownstream(Downstream),
    /// Write a frame to the current upstream link.
    SendUpstream(Frame),
    /// Open a new upstream link, superseding any previous one.
    Dial,
    /// Arm the reconnect timer.
    ScheduleReconnect(Duration),
    /// Disarm the reconnect timer.
    CancelReconnect,
    /// Drop the current upstream link (and any dial in flight).
    CloseUpstream,
}

/// Per-session limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Control frames buffered while upstream is not open.
    pub pending_queue_capacity: usize,
    /// Upstream reconnection policy.
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pending_queue_capacity: DEFAULT_PENDING_QUEUE_CAPACITY,
            reconnect: ReconnectPolicy::default(),
        }
    }
}
