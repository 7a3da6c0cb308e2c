//! `GET /ws` upgrade handler with origin admission.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::header::ORIGIN;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{debug, warn};

use super::connection::run_connection;
use crate::metrics::ADMISSION_REJECTED_TOTAL;
use crate::registry::UNKNOWN_ORIGIN;
use crate::server::AppState;

/// Check the `Origin` header, then upgrade.
///
/// Rejected origins get `403` and the upgrade never happens. A plain GET
/// without upgrade headers from an accepted origin gets axum's upgrade
/// rejection.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = headers
        .get(ORIGIN)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

    if let Err(err) = state.filter.check(origin.as_deref()) {
        warn!(error = %err, "handshake rejected");
        counter!(ADMISSION_REJECTED_TOTAL).increment(1);
        return (StatusCode::FORBIDDEN, err.to_string()).into_response();
    }

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server shutting down").into_response();
    }

    let origin = origin.unwrap_or_else(|| UNKNOWN_ORIGIN.to_string());
    debug!(origin, "upgrading connection");
    let tracker = state.shutdown.tracker();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| tracker.track_future(run_connection(socket, origin, state)))
}
