//! Session identifiers.
//!
//! Every accepted downstream connection gets an opaque [`SessionId`]. It is
//! sent to the client in the `welcome` frame and used as the identity key in
//! the origin registry.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identity of one client session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new random ID (`client_` + UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("client_{}", Uuid::now_v7().simple()))
    }

    /// Create from an existing string value.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn new_id_has_client_prefix() {
        let id = SessionId::new();
        assert!(id.as_str().starts_with("client_"));
        assert_eq!(id.as_str().len(), "client_".len() + 32);
    }

    #[test]
    fn serializes_transparently() {
        let id = SessionId::from_string("client_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""client_abc""#);
    }

    #[test]
    fn display_matches_inner() {
        let id = SessionId::from_string("client_xyz");
        assert_eq!(id.to_string(), "client_xyz");
    }
}
