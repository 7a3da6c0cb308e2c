//! Downstream WebSocket gateway.
//!
//! - [`handler`]: origin admission and upgrade
//! - [`connection`]: per-socket reader/writer pumps around a session task

pub mod connection;
pub mod handler;
