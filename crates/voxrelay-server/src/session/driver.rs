//! Async driver for one client session.
//!
//! One task per downstream client. The task owns the [`ClientSession`], the
//! current upstream link, at most one dial in flight, and the reconnect
//! timer. It waits on all of them with `select!`, feeds whichever fires into
//! the state machine, and executes the returned effects before waiting again.
//!
//! Every dial bumps a generation counter. Events and dial results are tagged
//! with the generation that produced them and anything from a superseded
//! link is ignored.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, instrument};
use voxrelay_core::errors::UpstreamError;
use voxrelay_core::frame::Frame;
use voxrelay_core::retry::CLOSE_ABNORMAL;

use super::{ClientSession, Downstream, Effect, SessionCommand};
use crate::metrics::{UPSTREAM_CONNECTS_TOTAL, UPSTREAM_RECONNECTS_TOTAL};
use crate::upstream::{UpstreamConnector, UpstreamEvent, UpstreamLink};

/// Channels connecting a session to its downstream socket and the registry.
#[derive(Debug)]
pub struct SessionIo {
    /// Frames read from the client. Closing this ends the session.
    pub inbound: mpsc::Receiver<Frame>,
    /// Messages for the client socket writer.
    pub outbound: mpsc::Sender<Downstream>,
    /// Commands from the registry and shutdown path.
    pub commands: mpsc::Receiver<SessionCommand>,
}

type DialFuture = Pin<Box<dyn Future<Output = Result<UpstreamLink, UpstreamError>> + Send>>;

struct PendingDial {
    generation: u64,
    future: DialFuture,
}

struct ActiveLink {
    generation: u64,
    link: UpstreamLink,
}

enum Input {
    Downstream(Option<Frame>),
    Command(SessionCommand),
    Upstream(u64, Option<UpstreamEvent>),
    Dialed(u64, Result<UpstreamLink, UpstreamError>),
    Timer,
}

/// Run a session until the client leaves, it is replaced, or the server
/// shuts down.
#[instrument(skip_all, fields(session_id = %session.id(), origin = %session.origin()))]
pub async fn run_session(
    mut session: ClientSession,
    connector: Arc<dyn UpstreamConnector>,
    mut io: SessionIo,
) {
    let mut generation: u64 = 0;
    let mut link: Option<ActiveLink> = None;
    let mut dial: Option<PendingDial> = None;
    let timer = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(timer);
    let mut timer_armed = false;

    while !session.is_closed() {
        let input = tokio::select! {
            frame = io.inbound.recv() => Input::Downstream(frame),
            Some(command) = io.commands.recv() => Input::Command(command),
            (tag, event) = next_event(&mut link) => Input::Upstream(tag, event),
            (tag, result) = next_dial(&mut dial) => Input::Dialed(tag, result),
            () = &mut timer, if timer_armed => Input::Timer,
        };

        let effects = match input {
            Input::Downstream(Some(frame)) => session.on_downstream(frame),
            Input::Downstream(None) => session.on_downstream_closed(),
            Input::Command(SessionCommand::Replace) => session.on_replaced(),
            Input::Command(SessionCommand::Shutdown) => session.on_shutdown(),
            Input::Upstream(tag, _) if tag != generation => Vec::new(),
            Input::Upstream(_, Some(UpstreamEvent::Frame(frame))) => {
                session.on_upstream_frame(frame)
            }
            Input::Upstream(_, Some(UpstreamEvent::Error(err))) => session.on_upstream_error(&err),
            Input::Upstream(_, Some(UpstreamEvent::Closed { code, reason })) => {
                link = None;
                session.on_upstream_closed(code, &reason)
            }
            Input::Upstream(_, None) => {
                link = None;
                session.on_upstream_closed(CLOSE_ABNORMAL, "upstream link ended")
            }
            Input::Dialed(tag, result) => {
                dial = None;
                if tag == generation {
                    match result {
                        Ok(opened) => {
                            counter!(UPSTREAM_CONNECTS_TOTAL).increment(1);
                            link = Some(ActiveLink {
                                generation: tag,
                                link: opened,
                            });
                            session.on_upstream_open()
                        }
                        Err(err) => session.on_dial_failed(&err),
                    }
                } else {
                    debug!(tag, generation, "stale dial result ignored");
                    Vec::new()
                }
            }
            Input::Timer => {
                timer_armed = false;
                session.on_reconnect_timer()
            }
        };

        for effect in effects {
            match effect {
                Effect::SendDownstream(message) => {
                    if io.outbound.send(message).await.is_err() {
                        debug!("downstream writer gone");
                    }
                }
                Effect::SendUpstream(frame) => match &link {
                    Some(active) => {
                        if active.link.sink.send(frame).await.is_err() {
                            debug!("upstream writer gone, frame dropped");
                        }
                    }
                    None => debug!("no upstream link, frame dropped"),
                },
                Effect::Dial => {
                    generation += 1;
                    link = None;
                    let connector = Arc::clone(&connector);
                    dial = Some(PendingDial {
                        generation,
                        future: Box::pin(async move { connector.connect().await }),
                    });
                }
                Effect::ScheduleReconnect(delay) => {
                    counter!(UPSTREAM_RECONNECTS_TOTAL).increment(1);
                    timer.as_mut().reset(Instant::now() + delay);
                    timer_armed = true;
                }
                Effect::CancelReconnect => timer_armed = false,
                Effect::CloseUpstream => {
                    generation += 1;
                    link = None;
                    dial = None;
                }
            }
        }
    }
    debug!("session ended");
}

async fn next_event(link: &mut Option<ActiveLink>) -> (u64, Option<UpstreamEvent>) {
    match link {
        Some(active) => (active.generation, active.link.events.recv().await),
        None => std::future::pending().await,
    }
}

async fn next_dial(dial: &mut Option<PendingDial>) -> (u64, Result<UpstreamLink, UpstreamError>) {
    match dial {
        Some(pending) => (pending.generation, (&mut pending.future).await),
        None => std::future::pending().await,
    }
}
