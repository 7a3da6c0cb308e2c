//! Live sessions grouped by origin, with a per-origin concurrency cap.
//!
//! Each origin keeps its sessions oldest-first. Registering a session into a
//! full group evicts from the front: the evicted session is told to close
//! itself through its command channel, so the registry never touches a
//! socket directly.

use std::collections::{HashMap, VecDeque};

use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};
use voxrelay_core::ids::SessionId;

use crate::metrics::SESSIONS_REPLACED_TOTAL;
use crate::session::SessionCommand;

/// Registry key used when a handshake carries no `Origin` header.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Default per-origin session cap.
pub const DEFAULT_MAX_SESSIONS_PER_ORIGIN: usize = 3;

/// Registry entry for one live session.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Create a handle from a session id and its command sender.
    pub fn new(id: SessionId, commands: mpsc::Sender<SessionCommand>) -> Self {
        Self { id, commands }
    }

    /// The session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Deliver a command without waiting.
    ///
    /// Returns `false` if the session has already exited or its command
    /// queue is full.
    pub fn notify(&self, command: SessionCommand) -> bool {
        self.commands.try_send(command).is_ok()
    }
}

/// Origin → sessions map, owned by the server and shared with handlers.
pub struct OriginRegistry {
    max_per_origin: usize,
    groups: Mutex<HashMap<String, VecDeque<SessionHandle>>>,
}

impl OriginRegistry {
    /// Create an empty registry with the given per-origin cap (minimum 1).
    pub fn new(max_per_origin: usize) -> Self {
        Self {
            max_per_origin: max_per_origin.max(1),
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Add a session to its origin group, evicting the oldest while full.
    ///
    /// Returns the ids of evicted sessions, oldest first.
    pub fn register(&self, origin: &str, handle: SessionHandle) -> Vec<SessionId> {
        let mut evicted = Vec::new();
        let mut groups = self.groups.lock();
        let group = groups.entry(origin.to_string()).or_default();

        while group.len() >= self.max_per_origin {
            let Some(oldest) = group.pop_front() else {
                break;
            };
            if !oldest.notify(SessionCommand::Replace) {
                debug!(session_id = %oldest.id(), "evicted session already gone");
            }
            info!(origin, session_id = %oldest.id(), "session replaced by newer connection");
            counter!(SESSIONS_REPLACED_TOTAL).increment(1);
            evicted.push(oldest.id);
        }

        group.push_back(handle);
        evicted
    }

    /// Remove a session by identity. Empty groups are deleted.
    ///
    /// Returns `false` if the session was not registered (e.g. already
    /// evicted).
    pub fn unregister(&self, origin: &str, id: &SessionId) -> bool {
        let mut groups = self.groups.lock();
        let Some(group) = groups.get_mut(origin) else {
            return false;
        };
        let before = group.len();
        group.retain(|h| h.id() != id);
        let removed = group.len() != before;
        if group.is_empty() {
            let _ = groups.remove(origin);
        }
        removed
    }

    /// Tell every live session to close for shutdown.
    ///
    /// Returns the number of sessions notified.
    pub fn shutdown_all(&self) -> usize {
        let groups = self.groups.lock();
        groups
            .values()
            .flatten()
            .filter(|h| h.notify(SessionCommand::Shutdown))
            .count()
    }

    /// Number of live sessions across all origins.
    pub fn session_count(&self) -> usize {
        self.groups.lock().values().map(VecDeque::len).sum()
    }

    /// Number of origins with at least one live session.
    pub fn origin_count(&self) -> usize {
        self.groups.lock().len()
    }

    /// Session ids for one origin, oldest first.
    pub fn sessions_for(&self, origin: &str) -> Vec<SessionId> {
        self.groups
            .lock()
            .get(origin)
            .map(|g| g.iter().map(|h| h.id().clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for OriginRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS_PER_ORIGIN)
    }
}
