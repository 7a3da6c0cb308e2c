//! # voxrelay-server
//!
//! Axum WebSocket relay between downstream clients and the realtime voice API.
//!
//! - Origin admission on the upgrade request, `403` on rejection
//! - Origin registry with a per-origin cap and oldest-first eviction
//! - One session task per client: lazy upstream dial, readiness-gated audio,
//!   bounded control queue, reconnect with backoff
//! - `/health` and Prometheus `/metrics`
//! - Graceful shutdown via `CancellationToken` and a session `TaskTracker`

#![deny(unsafe_code)]

pub mod admission;
pub mod config;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod upstream;
pub mod websocket;
