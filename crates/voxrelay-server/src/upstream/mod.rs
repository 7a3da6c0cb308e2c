//! Upstream realtime connection.
//!
//! A connector dials the realtime API and hands back an [`UpstreamLink`]: a
//! frame sink and an event stream backed by background reader/writer tasks.
//! Dropping the sink closes the socket. The session driver never sees the
//! socket type, which keeps it testable with in-memory links.

mod realtime;

pub use realtime::{RealtimeConnector, spawn_link};

use async_trait::async_trait;
use tokio::sync::mpsc;
use voxrelay_core::errors::UpstreamError;
use voxrelay_core::frame::Frame;

/// Default capacity of the link's frame and event channels.
pub const LINK_CHANNEL_CAPACITY: usize = 256;

/// Something that happened on an open upstream socket.
#[derive(Debug)]
pub enum UpstreamEvent {
    /// A data frame, already classified.
    Frame(Frame),
    /// A transport error. Close handling follows as a separate event.
    Error(UpstreamError),
    /// The socket closed.
    Closed {
        /// Close code, `1005` if the close frame carried none, `1006` if
        /// the connection dropped without one.
        code: u16,
        /// Close reason text.
        reason: String,
    },
}

/// Session-side handle to an open upstream socket.
#[derive(Debug)]
pub struct UpstreamLink {
    /// Frames to write upstream, in order.
    pub sink: mpsc::Sender<Frame>,
    /// Events read from upstream, in order.
    pub events: mpsc::Receiver<UpstreamEvent>,
}

/// Socket-side ends of an [`UpstreamLink`].
#[derive(Debug)]
pub struct LinkEnd {
    /// Frames the session wants written.
    pub outgoing: mpsc::Receiver<Frame>,
    /// Where to report socket events.
    pub events: mpsc::Sender<UpstreamEvent>,
}

/// Create a connected link/end pair.
pub fn link_pair(capacity: usize) -> (UpstreamLink, LinkEnd) {
    let (sink, outgoing) = mpsc::channel(capacity);
    let (events_tx, events) = mpsc::channel(capacity);
    (
        UpstreamLink { sink, events },
        LinkEnd {
            outgoing,
            events: events_tx,
        },
    )
}

/// Opens upstream links.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Dial upstream. Resolves once the transport is open.
    async fn connect(&self) -> Result<UpstreamLink, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn link_pair_carries_frames_and_events() {
        let (mut link, mut end) = link_pair(4);
        link.sink.send(Frame::from_text(r#"{"type":"x"}"#)).await.unwrap();
        assert_eq!(end.outgoing.recv().await.unwrap().kind(), Some("x"));

        end.events
            .send(UpstreamEvent::Closed {
                code: 1000,
                reason: String::new(),
            })
            .await
            .unwrap();
        assert!(matches!(
            link.events.recv().await,
            Some(UpstreamEvent::Closed { code: 1000, .. })
        ));
    }

    #[tokio::test]
    async fn dropping_sink_is_observable() {
        let (link, mut end) = link_pair(4);
        drop(link);
        assert!(end.outgoing.recv().await.is_none());
        assert!(end.events.is_closed());
    }
}
