//! End-to-end tests: real relay, real WebSocket clients, fake realtime API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{accept_hdr_async, connect_async};

use voxrelay_server::config::ServerConfig;
use voxrelay_server::server::RelayServer;
use voxrelay_server::upstream::RealtimeConnector;
use voxrelay_settings::UpstreamSettings;

const TIMEOUT: Duration = Duration::from_secs(5);
const LOCAL_ORIGIN: &str = "http://localhost:5173";

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// ── Fake realtime API ──

/// Handshake details seen by the fake upstream.
#[derive(Debug)]
struct Handshake {
    uri: String,
    authorization: Option<String>,
    beta: Option<String>,
}

struct FakeUpstream {
    addr: SocketAddr,
    /// Text of every data frame received, in order. Binary frames are
    /// rendered as `<binary N>`.
    received: mpsc::UnboundedReceiver<String>,
    handshakes: mpsc::UnboundedReceiver<Handshake>,
}

impl FakeUpstream {
    /// Accepts any number of connections. Each one is greeted with
    /// `session.created` and then records what it receives.
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frames_tx, received) = mpsc::unbounded_channel();
        let (handshake_tx, handshakes) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let frames_tx = frames_tx.clone();
                let handshake_tx = handshake_tx.clone();
                tokio::spawn(async move {
                    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        let header = |name: &str| {
                            req.headers()
                                .get(name)
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string)
                        };
                        let _ = handshake_tx.send(Handshake {
                            uri: req.uri().to_string(),
                            authorization: header("authorization"),
                            beta: header("openai-beta"),
                        });
                        Ok(resp)
                    };
                    let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
                        return;
                    };
                    let created = json!({"type": "session.created", "session": {"id": "sess_1"}});
                    if ws.send(Message::Text(created.to_string().into())).await.is_err() {
                        return;
                    }
                    while let Some(Ok(msg)) = ws.next().await {
                        let recorded = match msg {
                            Message::Text(t) => t.as_str().to_string(),
                            Message::Binary(b) => format!("<binary {}>", b.len()),
                            Message::Close(_) => break,
                            _ => continue,
                        };
                        let _ = frames_tx.send(recorded);
                    }
                });
            }
        });

        Self {
            addr,
            received,
            handshakes,
        }
    }

    fn settings(&self) -> UpstreamSettings {
        UpstreamSettings {
            url: format!("ws://{}/v1/realtime", self.addr),
            model: "test-realtime-model".into(),
            api_key: Some("sk-test".into()),
            ..UpstreamSettings::default()
        }
    }

    async fn next_frame(&mut self) -> String {
        timeout(TIMEOUT, self.received.recv())
            .await
            .expect("timed out waiting for upstream frame")
            .expect("fake upstream stopped")
    }
}

// ── Relay harness ──

struct Relay {
    addr: SocketAddr,
    server: Arc<RelayServer>,
    handle: Option<JoinHandle<()>>,
}

impl Relay {
    async fn boot(upstream: &FakeUpstream) -> Self {
        let connector = Arc::new(RealtimeConnector::new(&upstream.settings()));
        let metrics = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let server = Arc::new(RelayServer::new(ServerConfig::default(), connector, metrics));
        let (addr, handle) = server.listen().await.unwrap();
        Self {
            addr,
            server,
            handle: Some(handle),
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    async fn client(&self, origin: &str) -> WsStream {
        let mut req = self.ws_url().into_client_request().unwrap();
        let _ = req
            .headers_mut()
            .insert("origin", HeaderValue::from_str(origin).unwrap());
        let (ws, _) = connect_async(req).await.unwrap();
        ws
    }

    /// Connect and consume the welcome frame.
    async fn welcomed_client(&self, origin: &str) -> (WsStream, String) {
        let mut ws = self.client(origin).await;
        let welcome = next_json(&mut ws).await;
        assert_eq!(welcome["type"], "welcome");
        let id = welcome["clientId"].as_str().unwrap().to_string();
        (ws, id)
    }

    async fn health(&self) -> Value {
        reqwest::get(format!("http://{}/health", self.addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

async fn next_message(ws: &mut WsStream) -> Message {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("websocket error");
        if !matches!(msg, Message::Ping(_) | Message::Pong(_)) {
            return msg;
        }
    }
}

async fn next_json(ws: &mut WsStream) -> Value {
    match next_message(ws).await {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn send_json(ws: &mut WsStream, value: &Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Send `connect` and wait until the upstream session is ready.
async fn connect_upstream(ws: &mut WsStream) {
    send_json(ws, &json!({"type": "connect"})).await;
    let status = next_json(ws).await;
    assert_eq!(status["type"], "connection_status");
    assert_eq!(status["status"], "connected");
    let created = next_json(ws).await;
    assert_eq!(created["type"], "session.created");
}

// ── Tests ──

#[tokio::test]
async fn welcome_sent_on_accept() {
    let upstream = FakeUpstream::spawn().await;
    let relay = Relay::boot(&upstream).await;

    let (_ws, id) = relay.welcomed_client(LOCAL_ORIGIN).await;
    assert!(id.starts_with("client_"));
}

#[tokio::test]
async fn extension_and_missing_origins_accepted() {
    let upstream = FakeUpstream::spawn().await;
    let relay = Relay::boot(&upstream).await;

    let _ = relay
        .welcomed_client("chrome-extension://abcdefghijklmnop")
        .await;

    let (mut ws, _) = connect_async(relay.ws_url()).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "welcome");
}

#[tokio::test]
async fn rejected_origin_gets_403_and_no_frames() {
    let upstream = FakeUpstream::spawn().await;
    let relay = Relay::boot(&upstream).await;

    let mut req = relay.ws_url().into_client_request().unwrap();
    let _ = req
        .headers_mut()
        .insert("origin", HeaderValue::from_static("https://evil.example"));
    let err = connect_async(req).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(resp) => assert_eq!(resp.status(), 403),
        other => panic!("expected HTTP 403, got {other:?}"),
    }
    assert_eq!(relay.health().await["sessions"], 0);
}

#[tokio::test]
async fn ping_answered_locally_and_never_forwarded() {
    let mut upstream = FakeUpstream::spawn().await;
    let relay = Relay::boot(&upstream).await;
    let (mut ws, _) = relay.welcomed_client(LOCAL_ORIGIN).await;

    connect_upstream(&mut ws).await;
    send_json(&mut ws, &json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut ws).await, json!({"type": "pong"}));

    send_json(&mut ws, &json!({"type": "session.update", "session": {}})).await;
    let first: Value = serde_json::from_str(&upstream.next_frame().await).unwrap();
    assert_eq!(first["type"], "session.update");
}

#[tokio::test]
async fn handshake_carries_credentials_and_model() {
    let mut upstream = FakeUpstream::spawn().await;
    let relay = Relay::boot(&upstream).await;
    let (mut ws, _) = relay.welcomed_client(LOCAL_ORIGIN).await;

    connect_upstream(&mut ws).await;
    let handshake = timeout(TIMEOUT, upstream.handshakes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handshake.authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(handshake.beta.as_deref(), Some("realtime=v1"));
    assert!(handshake.uri.contains("model=test-realtime-model"), "{handshake:?}");
}

#[tokio::test]
async fn queued_control_flushed_then_audio_forwarded_verbatim() {
    let mut upstream = FakeUpstream::spawn().await;
    let relay = Relay::boot(&upstream).await;
    let (mut ws, _) = relay.welcomed_client(LOCAL_ORIGIN).await;

    // Before connect: control is queued, audio is dropped.
    let queued = r#"{"type":"session.update","session":{"voice":"alloy"}}"#;
    ws.send(Message::Text(queued.into())).await.unwrap();
    send_json(&mut ws, &json!({"type": "input_audio_buffer.append", "audio": "early"})).await;

    connect_upstream(&mut ws).await;
    assert_eq!(upstream.next_frame().await, queued);

    let audio = r#"{"type":"input_audio_buffer.append","audio":"UklGRg=="}"#;
    ws.send(Message::Text(audio.into())).await.unwrap();
    assert_eq!(upstream.next_frame().await, audio);

    ws.send(Message::Binary(vec![0u8; 320].into())).await.unwrap();
    assert_eq!(upstream.next_frame().await, "<binary 320>");
}

#[tokio::test]
async fn fourth_session_from_origin_evicts_oldest() {
    let upstream = FakeUpstream::spawn().await;
    let relay = Relay::boot(&upstream).await;

    let (mut first, _) = relay.welcomed_client(LOCAL_ORIGIN).await;
    let (mut second, _) = relay.welcomed_client(LOCAL_ORIGIN).await;
    let (_third, _) = relay.welcomed_client(LOCAL_ORIGIN).await;
    let (_fourth, _) = relay.welcomed_client(LOCAL_ORIGIN).await;

    let replaced = next_json(&mut first).await;
    assert_eq!(replaced["type"], "connection_status");
    assert_eq!(replaced["status"], "replaced");

    match next_message(&mut first).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("expected close frame, got {other:?}"),
    }

    send_json(&mut second, &json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut second).await["type"], "pong");

    let (_extension, _) = relay.welcomed_client("chrome-extension://other").await;

    let mut sessions = Value::Null;
    for _ in 0..50 {
        let health = relay.health().await;
        sessions = health["sessions"].clone();
        if sessions == 4 {
            assert_eq!(health["origins"], 2);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(sessions, 4);
}

#[tokio::test]
async fn health_and_metrics_endpoints() {
    let upstream = FakeUpstream::spawn().await;
    let relay = Relay::boot(&upstream).await;

    let health = relay.health().await;
    assert_eq!(health["status"], "ok");
    assert!(health["uptime_secs"].is_number());

    let resp = reqwest::get(format!("http://{}/metrics", relay.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn shutdown_closes_sessions_going_away() {
    let upstream = FakeUpstream::spawn().await;
    let mut relay = Relay::boot(&upstream).await;
    let (mut ws, _) = relay.welcomed_client(LOCAL_ORIGIN).await;

    let handle = relay.handle.take().unwrap();
    let server = Arc::clone(&relay.server);
    let shutdown = tokio::spawn(async move { server.shutdown_gracefully(handle).await });

    match next_message(&mut ws).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Away),
        other => panic!("expected close frame, got {other:?}"),
    }
    drop(ws);
    timeout(TIMEOUT, shutdown).await.unwrap().unwrap();
    assert_eq!(relay.server.shutdown().active_sessions(), 0);
}
