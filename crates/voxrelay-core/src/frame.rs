//! Tagged WebSocket frames.
//!
//! Frames are classified once, where they come off a socket, and consumed
//! everywhere else without re-parsing. The verbatim text is kept so that
//! forwarding never re-serializes a payload.

use bytes::Bytes;
use serde_json::Value;

use crate::protocol::{KIND_AUDIO_APPEND, KIND_ERROR};

/// A single WebSocket data message.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Binary payload (raw audio).
    Binary(Bytes),
    /// Text that parsed as JSON.
    Control(ControlFrame),
    /// Text that is not valid JSON.
    Malformed(String),
}

impl Frame {
    /// Classify a text message.
    pub fn from_text(text: impl Into<String>) -> Self {
        let raw = text.into();
        match serde_json::from_str::<Value>(&raw) {
            Ok(body) => Self::Control(ControlFrame::new(raw, body)),
            Err(_) => Self::Malformed(raw),
        }
    }

    /// Wrap a binary message.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// Whether this frame carries audio.
    ///
    /// Binary frames and `input_audio_buffer.append` are audio. Text that is
    /// not JSON is treated like binary.
    pub fn is_audio(&self) -> bool {
        match self {
            Self::Binary(_) | Self::Malformed(_) => true,
            Self::Control(c) => c.kind() == KIND_AUDIO_APPEND,
        }
    }

    /// Control kind, if this is a control frame.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Control(c) => Some(c.kind()),
            _ => None,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Binary(b) => b.len(),
            Self::Control(c) => c.raw().len(),
            Self::Malformed(s) => s.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A JSON text frame with its `type` tag extracted.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlFrame {
    kind: String,
    raw: String,
    body: Value,
}

impl ControlFrame {
    fn new(raw: String, body: Value) -> Self {
        let kind = body
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self { kind, raw, body }
    }

    /// The `type` field, or empty when absent.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The verbatim text received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Nested `error.type` of an upstream `error` frame.
    pub fn error_subtype(&self) -> Option<&str> {
        if self.kind != KIND_ERROR {
            return None;
        }
        self.body
            .get("error")
            .and_then(|e| e.get("type"))
            .and_then(Value::as_str)
    }

    /// Consume and return the verbatim text.
    pub fn into_raw(self) -> String {
        self.raw
    }
}
