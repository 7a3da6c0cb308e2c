//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Downstream sessions accepted (counter).
pub const SESSIONS_TOTAL: &str = "relay_sessions_total";
/// Live downstream sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "relay_sessions_active";
/// Handshakes refused by the origin filter (counter).
pub const ADMISSION_REJECTED_TOTAL: &str = "relay_admission_rejected_total";
/// Sessions evicted by the per-origin cap (counter).
pub const SESSIONS_REPLACED_TOTAL: &str = "relay_sessions_replaced_total";
/// Upstream links opened (counter).
pub const UPSTREAM_CONNECTS_TOTAL: &str = "relay_upstream_connects_total";
/// Upstream reconnects scheduled (counter).
pub const UPSTREAM_RECONNECTS_TOTAL: &str = "relay_upstream_reconnects_total";
/// Downstream frames dropped (counter, labels: reason).
pub const FRAMES_DROPPED_TOTAL: &str = "relay_frames_dropped_total";
