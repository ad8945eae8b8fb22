//! Process-wide table of live streaming sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

/// Opaque per-session identity, unique for the lifetime of the process.
pub type SessionId = u64;

/// Frame counters for one session, updated by the session and read by
/// introspection endpoints.
#[derive(Debug, Default)]
pub struct SessionStats {
    received: AtomicU64,
    analyzed: AtomicU64,
    rejected: AtomicU64,
}

impl SessionStats {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analyzed(&self) {
        self.analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.received.load(Ordering::Relaxed),
            frames_analyzed: self.analyzed.load(Ordering::Relaxed),
            frames_rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub frames_analyzed: u64,
    pub frames_rejected: u64,
}

impl std::ops::Add for StatsSnapshot {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            frames_received: self.frames_received + other.frames_received,
            frames_analyzed: self.frames_analyzed + other.frames_analyzed,
            frames_rejected: self.frames_rejected + other.frames_rejected,
        }
    }
}

/// Sessions currently between acceptance and teardown.
///
/// Used for introspection only; sessions never coordinate through it. Entries
/// are inserted by [`SessionRegistry::register`] and removed when the returned
/// [`RegistryEntry`] drops, so every entry is removed exactly once.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<SessionStats>>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session and return the guard that owns its entry.
    pub fn register(self: &Arc<Self>) -> RegistryEntry {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let stats = Arc::new(SessionStats::default());
        let previous = self.sessions.lock().insert(id, stats.clone());
        debug_assert!(previous.is_none(), "session id reused");
        RegistryEntry {
            registry: Arc::clone(self),
            id,
            stats,
        }
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().contains_key(&id)
    }

    /// Frame counters summed over active sessions.
    pub fn totals(&self) -> StatsSnapshot {
        self.sessions
            .lock()
            .values()
            .map(|stats| stats.snapshot())
            .fold(StatsSnapshot::default(), |acc, s| acc + s)
    }

    fn remove(&self, id: SessionId) -> bool {
        self.sessions.lock().remove(&id).is_some()
    }
}

/// Ownership of one registry entry; dropping it removes the entry.
#[derive(Debug)]
pub struct RegistryEntry {
    registry: Arc<SessionRegistry>,
    id: SessionId,
    stats: Arc<SessionStats>,
}

impl RegistryEntry {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
}

impl Drop for RegistryEntry {
    fn drop(&mut self) {
        if !self.registry.remove(self.id) {
            log::error!("Session {} was already missing from the registry", self.id);
        }
    }
}
