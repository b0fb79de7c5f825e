//! Command/reply correlation (C5): dispatches an outbound command to a
//! session's socket and resolves a waiter when the matching
//! `command_reply` arrives, times out, or the session disconnects.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use collector_core::{CollectorError, Event, EventStore};
use collector_core::event::{DomSnapshotBody, EventHeader, ReconBody};

use crate::broadcast::Broadcaster;
use crate::protocol::OutboundFrame;
use crate::registry::Registry;

/// What a resolved command produced, short of an outright
/// `CollectorError`. A reply carrying an `error` string is still a
/// successful round trip; the SDK just declined the command.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Reply(Value),
    RemoteError(String),
}

pub type CommandResult = Result<CommandOutcome, CollectorError>;

struct PendingEntry {
    session_id: String,
    command: String,
    sender: oneshot::Sender<CommandResult>,
}

/// Drops a still-pending table entry if the owning future is cancelled
/// before a reply, timeout, or disconnect resolves it, otherwise a
/// cancelled `send_command` call would leak its row forever.
struct PendingGuard<'a> {
    router: &'a CommandRouter,
    request_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.router.pending.lock().unwrap().remove(&self.request_id);
    }
}

pub struct CommandRouter {
    registry: Arc<Registry>,
    store: Arc<EventStore>,
    broadcaster: Arc<Broadcaster>,
    pending: Mutex<HashMap<String, PendingEntry>>,
}

impl CommandRouter {
    pub fn new(registry: Arc<Registry>, store: Arc<EventStore>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            registry,
            store,
            broadcaster,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Sends `command` to `session_id` and waits up to `timeout` for a
    /// matching `command_reply`. Fails fast with `NoSession` if the
    /// session has no connected transport.
    pub async fn send_command(
        &self,
        session_id: &str,
        command: &str,
        request_id: &str,
        params: Value,
        timeout: Duration,
    ) -> CommandResult {
        let transport = self.registry.lookup(session_id).ok_or(CollectorError::NoSession)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap();
            pending.insert(
                request_id.to_string(),
                PendingEntry {
                    session_id: session_id.to_string(),
                    command: command.to_string(),
                    sender: tx,
                },
            );
        }
        let _guard = PendingGuard {
            router: self,
            request_id: request_id.to_string(),
        };

        transport.send(OutboundFrame::command(command, request_id, params));

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(CollectorError::Disconnected),
            Err(_) => Err(CollectorError::Timeout),
        }
    }

    /// Resolves the waiter for `request_id`, if one is still pending.
    /// A reply for an unknown or already-resolved id (late after a
    /// timeout, or a duplicate) is discarded silently: "resolve exactly
    /// once" (spec.md §5).
    pub fn resolve(&self, request_id: &str, data: Option<Value>, error: Option<String>) {
        let entry = self.pending.lock().unwrap().remove(request_id);
        let Some(entry) = entry else {
            tracing::debug!(request_id, "discarding reply for unknown or already-resolved command");
            return;
        };

        let outcome = match error {
            Some(message) => Ok(CommandOutcome::RemoteError(message)),
            None => {
                let data = data.unwrap_or(Value::Null);
                self.store_snapshot_reply(&entry.session_id, &entry.command, &data);
                Ok(CommandOutcome::Reply(data))
            }
        };
        let _ = entry.sender.send(outcome);
    }

    /// Snapshot-shaped commands (`capture_dom_snapshot`, `recon_*`) store
    /// their reply as an event in addition to resolving the waiter
    /// (spec.md §5); callers querying session history see the snapshot
    /// without having to also hold onto the command's return value.
    fn store_snapshot_reply(&self, session_id: &str, command: &str, data: &Value) {
        let header = EventHeader {
            event_id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        let event = if command == "capture_dom_snapshot" {
            serde_json::from_value::<DomSnapshotBody>(data.clone())
                .ok()
                .map(|body| Event::DomSnapshot { header, body })
        } else if command.starts_with("recon_") {
            Some(Event::Recon {
                header,
                body: ReconBody {
                    category: command.to_string(),
                    payload: data.clone(),
                },
            })
        } else {
            None
        };

        if let Some(event) = event {
            if self.store.add(event.clone()).is_ok() {
                self.broadcaster.publish(event);
            }
        }
    }

    /// Resolves every pending waiter for `session_id` with
    /// `Disconnected`. Called once a connection's reader loop exits.
    pub fn disconnect_session(&self, session_id: &str) {
        let mut pending = self.pending.lock().unwrap();
        let ids: Vec<String> = pending
            .iter()
            .filter(|(_, entry)| entry.session_id == session_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            if let Some(entry) = pending.remove(&id) {
                let _ = entry.sender.send(Err(CollectorError::Disconnected));
            }
        }
    }

    /// Resolves every still-pending waiter with `Shutdown`. Called once
    /// during graceful server shutdown.
    pub fn shutdown_all(&self) {
        let mut pending = self.pending.lock().unwrap();
        for (_, entry) in pending.drain() {
            let _ = entry.sender.send(Err(CollectorError::Shutdown));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector_core::config::CollectorConfig;
    use collector_core::store::StoreCapacities;

    fn router_with_session() -> (Arc<CommandRouter>, Arc<Registry>, crate::registry::SessionTransport) {
        let registry = Arc::new(Registry::new());
        let store = Arc::new(EventStore::new(StoreCapacities::default()));
        let broadcaster = Arc::new(Broadcaster::new(CollectorConfig::default().broadcast_queue_cap));
        let queue = crate::registry::OutboundQueue::new(256);
        let transport = crate::registry::SessionTransport::new(queue);
        registry.register("s1", "demo", transport.clone());
        (
            Arc::new(CommandRouter::new(registry.clone(), store, broadcaster)),
            registry,
            transport,
        )
    }

    #[tokio::test]
    async fn send_command_fails_fast_for_unknown_session() {
        let (router, _registry, _transport) = router_with_session();
        let result = router
            .send_command("ghost", "capture_dom_snapshot", "r1", serde_json::json!({}), Duration::from_millis(50))
            .await;
        assert_eq!(result.unwrap_err(), CollectorError::NoSession);
    }

    #[tokio::test]
    async fn send_command_times_out_without_reply() {
        // S2.
        let (router, _registry, _transport) = router_with_session();
        let result = router
            .send_command("s1", "capture_dom_snapshot", "r1", serde_json::json!({}), Duration::from_millis(50))
            .await;
        assert_eq!(result.unwrap_err(), CollectorError::Timeout);
        assert_eq!(router.pending_count(), 0);
    }

    #[tokio::test]
    async fn reply_resolves_waiter_and_stores_dom_snapshot() {
        // S3.
        let (router, _registry, _transport) = router_with_session();
        let send = router.send_command(
            "s1",
            "capture_dom_snapshot",
            "r1",
            serde_json::json!({}),
            Duration::from_secs(5),
        );

        let data = serde_json::json!({
            "url": "https://example.com",
            "html": "<html></html>",
            "viewport": {"width": 1024, "height": 768},
            "scrollPosition": {"x": 0.0, "y": 0.0},
            "elementCount": 42,
            "truncated": false,
        });
        router.resolve("r1", Some(data), None);

        let outcome = send.await.unwrap();
        assert!(matches!(outcome, CommandOutcome::Reply(_)));
        assert_eq!(router.store.event_count(), 1);
    }

    #[tokio::test]
    async fn late_reply_after_timeout_is_discarded() {
        let (router, _registry, _transport) = router_with_session();
        let result = router
            .send_command("s1", "capture_dom_snapshot", "r1", serde_json::json!({}), Duration::from_millis(20))
            .await;
        assert_eq!(result.unwrap_err(), CollectorError::Timeout);
        // Arrives after the waiter already gave up; must not panic or resurrect it.
        router.resolve("r1", Some(serde_json::json!({"late": true})), None);
        assert_eq!(router.pending_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_resolves_only_that_sessions_waiters() {
        let registry = Arc::new(Registry::new());
        let store = Arc::new(EventStore::new(StoreCapacities::default()));
        let broadcaster = Arc::new(Broadcaster::new(CollectorConfig::default().broadcast_queue_cap));
        let q1 = crate::registry::OutboundQueue::new(256);
        let q2 = crate::registry::OutboundQueue::new(256);
        registry.register("s1", "demo", crate::registry::SessionTransport::new(q1));
        registry.register("s2", "demo", crate::registry::SessionTransport::new(q2));
        let router = Arc::new(CommandRouter::new(registry, store, broadcaster));

        let router_a = router.clone();
        let a = tokio::spawn(async move {
            router_a
                .send_command("s1", "capture_dom_snapshot", "r1", serde_json::json!({}), Duration::from_secs(5))
                .await
        });
        let router_b = router.clone();
        let b = tokio::spawn(async move {
            router_b
                .send_command("s2", "capture_dom_snapshot", "r2", serde_json::json!({}), Duration::from_secs(5))
                .await
        });
        // Give both tasks a chance to reach their suspension point and
        // register in the pending table before we act on them.
        tokio::time::sleep(Duration::from_millis(20)).await;

        router.disconnect_session("s1");
        let a = a.await.unwrap();
        assert_eq!(a.unwrap_err(), CollectorError::Disconnected);
        assert_eq!(router.pending_count(), 1);
        router.shutdown_all();
        let b = b.await.unwrap();
        assert_eq!(b.unwrap_err(), CollectorError::Shutdown);
    }
}
