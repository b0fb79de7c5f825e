//! Session registry (C3): a map of `sessionId -> transport`, owning both
//! the connection metadata and (generically) whatever handle the
//! networking layer uses to reach that socket.
//!
//! Kept generic over the transport handle type so this crate stays
//! network-free; `collector-transport` instantiates it with its own
//! per-connection sender handle.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queryable, transport-free snapshot of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub session_id: String,
    pub app_name: String,
    pub connected_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub is_connected: bool,
}

struct SessionRecord<T> {
    info: SessionInfo,
    transport: Option<T>,
}

/// Mutex-protected `sessionId -> transport` map. Re-registering an
/// existing id replaces the transport and bumps `last_seen_at` but
/// leaves `connected_at` and prior history untouched.
pub struct SessionRegistry<T> {
    inner: Mutex<HashMap<String, SessionRecord<T>>>,
}

impl<T: Clone> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> SessionRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a session, replacing any existing transport for this id.
    /// `app_name` is only taken on first registration; a reconnect keeps
    /// whatever the session originally announced.
    pub fn register(&self, session_id: &str, app_name: &str, transport: T) {
        let now = Utc::now();
        let mut guard = self.inner.lock().expect("session registry mutex poisoned");
        match guard.get_mut(session_id) {
            Some(record) => {
                record.info.last_seen_at = now;
                record.info.is_connected = true;
                record.transport = Some(transport);
            }
            None => {
                guard.insert(
                    session_id.to_string(),
                    SessionRecord {
                        info: SessionInfo {
                            session_id: session_id.to_string(),
                            app_name: app_name.to_string(),
                            connected_at: now,
                            last_seen_at: now,
                            is_connected: true,
                        },
                        transport: Some(transport),
                    },
                );
            }
        }
    }

    /// Marks a session disconnected and drops its transport handle.
    /// History (the session's events in the store) is untouched; only
    /// the registry entry changes.
    pub fn unregister(&self, session_id: &str) {
        let mut guard = self.inner.lock().expect("session registry mutex poisoned");
        if let Some(record) = guard.get_mut(session_id) {
            record.info.is_connected = false;
            record.transport = None;
        }
    }

    /// Returns the live transport handle, or `None` if the session is
    /// unknown or currently disconnected.
    pub fn lookup(&self, session_id: &str) -> Option<T> {
        let guard = self.inner.lock().expect("session registry mutex poisoned");
        guard
            .get(session_id)
            .filter(|r| r.info.is_connected)
            .and_then(|r| r.transport.clone())
    }

    pub fn touch(&self, session_id: &str) {
        let mut guard = self.inner.lock().expect("session registry mutex poisoned");
        if let Some(record) = guard.get_mut(session_id) {
            record.info.last_seen_at = Utc::now();
        }
    }

    /// The session with the earliest `connected_at`, if any are registered.
    pub fn first_connected(&self) -> Option<SessionInfo> {
        let guard = self.inner.lock().expect("session registry mutex poisoned");
        guard
            .values()
            .map(|r| r.info.clone())
            .min_by_key(|info| info.connected_at)
    }

    pub fn all(&self) -> Vec<SessionInfo> {
        let guard = self.inner.lock().expect("session registry mutex poisoned");
        guard.values().map(|r| r.info.clone()).collect()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionInfo> {
        let guard = self.inner.lock().expect("session registry mutex poisoned");
        guard.get(session_id).map(|r| r.info.clone())
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock().expect("session registry mutex poisoned");
        guard.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup_returns_transport() {
        let registry: SessionRegistry<u32> = SessionRegistry::new();
        registry.register("s1", "app", 42);
        assert_eq!(registry.lookup("s1"), Some(42));
    }

    #[test]
    fn reconnect_preserves_connected_at_and_replaces_transport() {
        // Reconnect preserves history / identity, only the transport swaps.
        let registry: SessionRegistry<u32> = SessionRegistry::new();
        registry.register("s1", "app", 1);
        let first = registry.get("s1").unwrap();
        registry.unregister("s1");
        assert!(!registry.get("s1").unwrap().is_connected);

        registry.register("s1", "app", 2);
        let second = registry.get("s1").unwrap();
        assert_eq!(first.connected_at, second.connected_at);
        assert!(second.is_connected);
        assert_eq!(registry.lookup("s1"), Some(2));
    }

    #[test]
    fn unregister_unknown_session_is_a_noop() {
        let registry: SessionRegistry<u32> = SessionRegistry::new();
        registry.unregister("ghost");
        assert!(registry.get("ghost").is_none());
    }

    #[test]
    fn first_connected_picks_earliest() {
        let registry: SessionRegistry<u32> = SessionRegistry::new();
        registry.register("a", "app", 1);
        std::thread::sleep(std::time::Duration::from_millis(2));
        registry.register("b", "app", 2);
        assert_eq!(registry.first_connected().unwrap().session_id, "a");
    }
}
