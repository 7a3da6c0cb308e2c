//! Client session state machine.
//!
//! Owns the link state, the pending control queue, and the reconnect
//! bookkeeping for one downstream client. No I/O happens here: each handler
//! mutates state and returns the effects the driver must perform, in order.

use std::collections::VecDeque;

use metrics::counter;
use tracing::{debug, info, trace, warn};
use voxrelay_core::errors::UpstreamError;
use voxrelay_core::frame::Frame;
use voxrelay_core::ids::SessionId;
use voxrelay_core::protocol::{
    ClientEvent, ConnectionStatus, KIND_CONNECT, KIND_ERROR, KIND_PING, KIND_SESSION_CREATED,
};
use voxrelay_core::retry::{
    CLOSE_ABNORMAL, CLOSE_GOING_AWAY, CLOSE_NORMAL, FailureKind, ReconnectDecision,
};

use super::{Downstream, Effect, SessionConfig};
use crate::metrics::FRAMES_DROPPED_TOTAL;

/// Upstream link lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// No link and no retry pending.
    Disconnected,
    /// Dial in flight.
    Connecting,
    /// Transport open, session not yet confirmed.
    Connected,
    /// Transport open and `session.created` received.
    Ready,
    /// Waiting for the reconnect timer.
    Reconnecting {
        /// Attempt the timer will start.
        attempt: u32,
    },
    /// Automatic reconnection gave up. A `connect` frame starts over.
    Failed,
}

impl LinkState {
    /// Upstream transport is open.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Connected | Self::Ready)
    }

    /// Upstream session is confirmed.
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

/// State for one downstream client.
#[derive(Debug)]
pub struct ClientSession {
    id: SessionId,
    origin: String,
    config: SessionConfig,
    state: LinkState,
    pending: VecDeque<Frame>,
    attempts: u32,
    last_failure: FailureKind,
    overflow_warned: bool,
    closed: bool,
}

impl ClientSession {
    /// Create a session with no upstream link.
    pub fn new(id: SessionId, origin: impl Into<String>, config: SessionConfig) -> Self {
        let pending = VecDeque::with_capacity(config.pending_queue_capacity);
        Self {
            id,
            origin: origin.into(),
            config,
            state: LinkState::Disconnected,
            pending,
            attempts: 0,
            last_failure: FailureKind::None,
            overflow_warned: false,
            closed: false,
        }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Registry origin key.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Control frames waiting for the link to open.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Reconnect attempts in the current streak.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Classification of the last upstream error.
    pub fn last_failure(&self) -> FailureKind {
        self.last_failure
    }

    /// Whether the session has finished and the driver should exit.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ── Downstream ──────────────────────────────────────────────────────

    /// A frame arrived from the client.
    pub fn on_downstream(&mut self, frame: Frame) -> Vec<Effect> {
        if self.closed {
            return Vec::new();
        }
        match frame.kind() {
            Some(KIND_PING) => vec![Effect::SendDownstream(Downstream::Event(ClientEvent::Pong))],
            Some(KIND_CONNECT) => self.request_connect(),
            _ => self.route_to_upstream(frame),
        }
    }

    /// The client socket closed.
    pub fn on_downstream_closed(&mut self) -> Vec<Effect> {
        debug!("downstream closed");
        self.finish(Vec::new())
    }

    fn request_connect(&mut self) -> Vec<Effect> {
        match self.state {
            LinkState::Disconnected => {}
            LinkState::Failed => {
                self.attempts = 0;
                self.last_failure = FailureKind::None;
            }
            state => {
                debug!(?state, "connect ignored, link already active");
                return Vec::new();
            }
        }
        info!("upstream connect requested");
        self.state = LinkState::Connecting;
        vec![Effect::Dial]
    }

    fn route_to_upstream(&mut self, frame: Frame) -> Vec<Effect> {
        if self.state.is_open() {
            if frame.is_audio() && !self.state.is_ready() {
                trace!(len = frame.len(), "audio before session ready, dropped");
                counter!(FRAMES_DROPPED_TOTAL, "reason" => "not_ready").increment(1);
                return Vec::new();
            }
            return vec![Effect::SendUpstream(frame)];
        }

        if frame.is_audio() {
            trace!(len = frame.len(), "audio while upstream closed, dropped");
            counter!(FRAMES_DROPPED_TOTAL, "reason" => "not_connected").increment(1);
            return Vec::new();
        }

        if self.pending.len() < self.config.pending_queue_capacity {
            self.pending.push_back(frame);
        } else {
            counter!(FRAMES_DROPPED_TOTAL, "reason" => "queue_full").increment(1);
            if !self.overflow_warned {
                self.overflow_warned = true;
                warn!(
                    capacity = self.config.pending_queue_capacity,
                    "pending queue full, dropping control frames until upstream opens"
                );
            }
        }
        Vec::new()
    }

    // ── Upstream ────────────────────────────────────────────────────────

    /// The dial succeeded and the transport is open.
    pub fn on_upstream_open(&mut self) -> Vec<Effect> {
        if self.closed {
            return vec![Effect::CloseUpstream];
        }
        info!(flushed = self.pending.len(), "upstream open");
        self.state = LinkState::Connected;
        self.attempts = 0;
        self.last_failure = FailureKind::None;
        self.overflow_warned = false;

        let mut effects = Vec::with_capacity(self.pending.len() + 2);
        effects.push(Effect::CancelReconnect);
        effects.extend(self.pending.drain(..).map(Effect::SendUpstream));
        effects.push(status(ConnectionStatus::Connected, "Connected to voice service"));
        effects
    }

    /// The dial failed before the transport opened.
    ///
    /// Treated like a transport error followed by an abnormal close.
    pub fn on_dial_failed(&mut self, err: &UpstreamError) -> Vec<Effect> {
        let mut effects = self.on_upstream_error(err);
        effects.extend(self.on_upstream_closed(CLOSE_ABNORMAL, &err.to_string()));
        effects
    }

    /// A frame arrived from upstream.
    pub fn on_upstream_frame(&mut self, frame: Frame) -> Vec<Effect> {
        if self.closed {
            return Vec::new();
        }
        let mut protocol_error = None;
        match &frame {
            Frame::Control(c) if c.kind() == KIND_SESSION_CREATED => {
                if self.state == LinkState::Connected {
                    info!("upstream session ready");
                    self.state = LinkState::Ready;
                }
            }
            Frame::Control(c) if c.kind() == KIND_ERROR => {
                let subtype = c.error_subtype();
                self.last_failure = FailureKind::from_subtype(subtype);
                warn!(subtype = subtype.unwrap_or("unknown"), "upstream reported error");
            }
            Frame::Malformed(text) => {
                warn!(len = text.len(), "malformed upstream message");
                protocol_error = Some(ClientEvent::error(
                    "Malformed message from voice service",
                    "upstream sent text that is not valid JSON",
                ));
            }
            _ => {}
        }

        let mut effects = vec![Effect::SendDownstream(Downstream::Frame(frame))];
        if let Some(event) = protocol_error {
            effects.push(Effect::SendDownstream(Downstream::Event(event)));
        }
        effects
    }

    /// A transport error on the upstream link.
    pub fn on_upstream_error(&mut self, err: &UpstreamError) -> Vec<Effect> {
        if self.closed {
            return Vec::new();
        }
        warn!(error = %err, "upstream error");
        vec![Effect::SendDownstream(Downstream::Event(ClientEvent::error(
            err.summary(),
            err.to_string(),
        )))]
    }

    /// The upstream link closed.
    pub fn on_upstream_closed(&mut self, code: u16, reason: &str) -> Vec<Effect> {
        if self.closed {
            return Vec::new();
        }
        if !matches!(
            self.state,
            LinkState::Connecting | LinkState::Connected | LinkState::Ready
        ) {
            debug!(code, state = ?self.state, "close for inactive link ignored");
            return Vec::new();
        }

        info!(code, reason, "upstream closed");
        self.state = LinkState::Disconnected;
        self.pending.clear();
        self.overflow_warned = false;

        let mut effects = vec![status(
            ConnectionStatus::Disconnected,
            format!("Disconnected from voice service (code: {code})"),
        )];

        match self
            .config
            .reconnect
            .decide(code, self.attempts, self.last_failure)
        {
            ReconnectDecision::Retry { attempt, delay } => {
                info!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "scheduling upstream reconnect"
                );
                self.attempts = attempt;
                self.state = LinkState::Reconnecting { attempt };
                effects.push(Effect::ScheduleReconnect(delay));
            }
            ReconnectDecision::GiveUp(why) => {
                warn!(code, attempts = self.attempts, ?why, "giving up on upstream");
                self.state = LinkState::Failed;
                effects.push(status(ConnectionStatus::Failed, why.message()));
            }
        }
        effects
    }

    /// The reconnect timer fired.
    pub fn on_reconnect_timer(&mut self) -> Vec<Effect> {
        match self.state {
            LinkState::Reconnecting { attempt } if !self.closed => {
                info!(attempt, "reconnecting upstream");
                self.state = LinkState::Connecting;
                vec![Effect::Dial]
            }
            _ => Vec::new(),
        }
    }

    // ── Commands ────────────────────────────────────────────────────────

    /// Evicted by a newer session from the same origin.
    pub fn on_replaced(&mut self) -> Vec<Effect> {
        self.finish(vec![
            status(
                ConnectionStatus::Replaced,
                "Replaced by a newer connection from the same origin",
            ),
            Effect::SendDownstream(Downstream::Close {
                code: CLOSE_NORMAL,
                reason: "replaced".into(),
            }),
        ])
    }

    /// The server is shutting down.
    pub fn on_shutdown(&mut self) -> Vec<Effect> {
        self.finish(vec![Effect::SendDownstream(Downstream::Close {
            code: CLOSE_GOING_AWAY,
            reason: "server shutting down".into(),
        })])
    }

    fn finish(&mut self, tail: Vec<Effect>) -> Vec<Effect> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        self.state = LinkState::Disconnected;
        self.pending.clear();

        let mut effects = vec![Effect::CancelReconnect, Effect::CloseUpstream];
        effects.extend(tail);
        effects
    }
}

fn status(status: ConnectionStatus, message: impl Into<String>) -> Effect {
    Effect::SendDownstream(Downstream::Event(ClientEvent::status(status, message)))
}
