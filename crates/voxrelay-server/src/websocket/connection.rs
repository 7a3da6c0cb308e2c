//! Downstream socket lifecycle: register, pump frames, run the session,
//! unregister.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::{debug, info};
use voxrelay_core::frame::Frame;
use voxrelay_core::ids::SessionId;
use voxrelay_core::protocol::ClientEvent;

use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_TOTAL};
use crate::registry::SessionHandle;
use crate::server::AppState;
use crate::session::{ClientSession, Downstream, SessionCommand, SessionIo, run_session};

/// Frames buffered from the client socket before the session reads them.
const INBOUND_CAPACITY: usize = 256;
/// Messages buffered for the client socket writer.
const OUTBOUND_CAPACITY: usize = 256;
/// Commands buffered per session (replace + shutdown fit with room to spare).
const COMMAND_CAPACITY: usize = 4;
/// How long to let the writer flush after the session ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run one downstream connection to completion.
///
/// 1. Registers with the origin registry (may evict the oldest session)
/// 2. Sends `welcome`
/// 3. Pumps client frames into the session and session output to the client
/// 4. Unregisters on exit
pub async fn run_connection(socket: WebSocket, origin: String, state: AppState) {
    let id = SessionId::new();
    let commands = register_session(&state, &origin, &id);

    counter!(SESSIONS_TOTAL).increment(1);
    gauge!(SESSIONS_ACTIVE).increment(1.0);
    info!(session_id = %id, origin, "client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (inbound_tx, inbound) = mpsc::channel::<Frame>(INBOUND_CAPACITY);
    let (outbound, mut outbound_rx) = mpsc::channel::<Downstream>(OUTBOUND_CAPACITY);

    if outbound
        .send(Downstream::Event(ClientEvent::welcome(id.as_str())))
        .await
        .is_err()
    {
        debug!("writer gone before welcome");
    }

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let (message, last) = match message {
                Downstream::Frame(frame) => (frame_message(frame), false),
                Downstream::Event(event) => (Message::Text(event.to_json().into()), false),
                Downstream::Close { code, reason } => (
                    Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })),
                    true,
                ),
            };
            if ws_tx.send(message).await.is_err() || last {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let reader = tokio::spawn(async move {
        while let Some(Ok(message)) = ws_rx.next().await {
            let frame = match message {
                Message::Text(text) => Frame::from_text(text.as_str()),
                Message::Binary(data) => Frame::Binary(data),
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            if inbound_tx.send(frame).await.is_err() {
                break;
            }
        }
    });

    let session = ClientSession::new(id.clone(), origin.as_str(), state.session_config.clone());
    let io = SessionIo {
        inbound,
        outbound,
        commands,
    };
    run_session(session, Arc::clone(&state.connector), io).await;

    reader.abort();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        debug!(session_id = %id, "downstream writer did not drain in time");
    }

    let _ = state.registry.unregister(&origin, &id);
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
    info!(session_id = %id, origin, "client disconnected");
}

/// Register a session and return its command receiver.
///
/// The shutdown sweep may already have run while the upgrade was in flight,
/// so a session registered after cancellation is told to shut down here.
fn register_session(
    state: &AppState,
    origin: &str,
    id: &SessionId,
) -> mpsc::Receiver<SessionCommand> {
    let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
    let evicted = state
        .registry
        .register(origin, SessionHandle::new(id.clone(), command_tx.clone()));
    if !evicted.is_empty() {
        debug!(session_id = %id, evicted = evicted.len(), "older sessions evicted");
    }

    if state.shutdown.is_shutting_down() {
        debug!(session_id = %id, "registered during shutdown");
        let _ = command_tx.try_send(SessionCommand::Shutdown);
    }
    commands
}

fn frame_message(frame: Frame) -> Message {
    match frame {
        Frame::Binary(data) => Message::Binary(data),
        Frame::Control(control) => Message::Text(control.into_raw().into()),
        Frame::Malformed(text) => Message::Text(text.into()),
    }
}
