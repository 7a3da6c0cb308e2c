//! Realtime API connector over `tokio-tungstenite`.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};
use voxrelay_core::errors::UpstreamError;
use voxrelay_core::frame::Frame;
use voxrelay_core::retry::{CLOSE_ABNORMAL, CLOSE_NO_STATUS};
use voxrelay_settings::UpstreamSettings;

use super::{LINK_CHANNEL_CAPACITY, LinkEnd, UpstreamConnector, UpstreamEvent, UpstreamLink, link_pair};

/// Header carrying the realtime protocol version.
const BETA_HEADER: &str = "OpenAI-Beta";

/// Dials the realtime API with bearer auth and the protocol-version header.
#[derive(Clone)]
pub struct RealtimeConnector {
    endpoint: String,
    api_key: String,
    beta_header: String,
    connect_timeout: Duration,
}

impl RealtimeConnector {
    /// Build a connector from upstream settings.
    ///
    /// A missing key yields a connector whose dials fail with
    /// [`UpstreamError::InvalidRequest`]; startup validation normally
    /// rejects that configuration first.
    pub fn new(settings: &UpstreamSettings) -> Self {
        Self {
            endpoint: settings.endpoint(),
            api_key: settings.api_key().unwrap_or_default().to_string(),
            beta_header: settings.beta_header.clone(),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
        }
    }

    /// The full dial URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the handshake request with auth headers.
    pub fn request(&self) -> Result<Request, UpstreamError> {
        if self.api_key.is_empty() {
            return Err(UpstreamError::InvalidRequest("no API key configured".into()));
        }
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| UpstreamError::InvalidRequest(format!("authorization header: {e}")))?;
        let beta = HeaderValue::from_str(&self.beta_header)
            .map_err(|e| UpstreamError::InvalidRequest(format!("{BETA_HEADER} header: {e}")))?;

        let headers = request.headers_mut();
        let _ = headers.insert(AUTHORIZATION, bearer);
        let _ = headers.insert(BETA_HEADER, beta);
        Ok(request)
    }
}

impl std::fmt::Debug for RealtimeConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConnector")
            .field("endpoint", &self.endpoint)
            .field("beta_header", &self.beta_header)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl UpstreamConnector for RealtimeConnector {
    async fn connect(&self) -> Result<UpstreamLink, UpstreamError> {
        let request = self.request()?;
        debug!(endpoint = %self.endpoint, "dialing upstream");

        let (ws, response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                UpstreamError::Connect(format!(
                    "timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;

        info!(status = %response.status(), "upstream connected");
        Ok(spawn_link(ws))
    }
}

/// Drive an open WebSocket with reader and writer tasks.
///
/// The returned link's sink feeds the writer; dropping it sends a normal
/// close. The reader classifies every data message into a [`Frame`] and ends
/// with exactly one [`UpstreamEvent::Closed`].
pub fn spawn_link<S>(ws: WebSocketStream<S>) -> UpstreamLink
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (link, LinkEnd { outgoing, events }) = link_pair(LINK_CHANNEL_CAPACITY);
    let (ws_tx, ws_rx) = ws.split();
    drop(tokio::spawn(write_loop(ws_tx, outgoing)));
    drop(tokio::spawn(read_loop(ws_rx, events)));
    link
}

async fn write_loop<S>(
    mut ws_tx: futures::stream::SplitSink<WebSocketStream<S>, Message>,
    mut outgoing: tokio::sync::mpsc::Receiver<Frame>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(frame) = outgoing.recv().await {
        let message = match frame {
            Frame::Binary(data) => Message::Binary(data),
            Frame::Control(control) => Message::Text(control.into_raw().into()),
            Frame::Malformed(text) => Message::Text(text.into()),
        };
        if let Err(e) = ws_tx.send(message).await {
            debug!(error = %e, "upstream write failed");
            return;
        }
    }

    let close = CloseFrame {
        code: CloseCode::Normal,
        reason: "client session ended".into(),
    };
    let _ = ws_tx.send(Message::Close(Some(close))).await;
    let _ = ws_tx.close().await;
}

async fn read_loop<S>(
    mut ws_rx: futures::stream::SplitStream<WebSocketStream<S>>,
    events: tokio::sync::mpsc::Sender<UpstreamEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let closed = loop {
        let event = match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => UpstreamEvent::Frame(Frame::from_text(text.as_str())),
            Some(Ok(Message::Binary(data))) => UpstreamEvent::Frame(Frame::Binary(data)),
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(f) => UpstreamEvent::Closed {
                        code: u16::from(f.code),
                        reason: f.reason.as_str().to_string(),
                    },
                    None => UpstreamEvent::Closed {
                        code: CLOSE_NO_STATUS,
                        reason: String::new(),
                    },
                };
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
            Some(Err(e)) => {
                warn!(error = %e, "upstream transport error");
                if events
                    .send(UpstreamEvent::Error(UpstreamError::Transport(e.to_string())))
                    .await
                    .is_err()
                {
                    return;
                }
                break UpstreamEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: e.to_string(),
                };
            }
            None => {
                break UpstreamEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: "connection dropped".into(),
                };
            }
        };
        if events.send(event).await.is_err() {
            // Session moved on; nobody is listening.
            return;
        }
    };
    let _ = events.send(closed).await;
}
