//! # voxrelay-core
//!
//! Shared vocabulary for the voxrelay WebSocket relay.
//!
//! - **Frames**: [`frame::Frame`] tags every WebSocket message once at the socket boundary
//! - **Protocol**: [`protocol::ClientEvent`] notifications sent to downstream clients
//! - **Reconnection**: [`retry::ReconnectPolicy`] decides whether and when to redial upstream
//! - **Errors**: admission and upstream error hierarchies via `thiserror`
//! - **Logging**: `tracing` subscriber setup and an in-memory capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod frame;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod retry;
