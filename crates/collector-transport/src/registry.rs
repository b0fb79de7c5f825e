//! The per-connection handle plumbed into
//! `collector_core::SessionRegistry<SessionTransport>`, plus the bounded
//! outbound queue (§5) it wraps.
//!
//! One `OutboundQueue` is created per accepted `/sdk` socket and handed
//! to the writer task spawned in [`crate::connection`]. `SessionTransport`
//! is just a cheap `Clone` handle onto it, so the registry and the
//! command router can each hold their own copy without caring about the
//! connection's internals.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use collector_core::SessionRegistry;

use crate::protocol::OutboundFrame;

/// Bounded queue feeding one connection's writer task. Overflow evicts
/// the oldest *non-command* frame (spec.md §5); a command frame is
/// never dropped, since doing so would strand a pending reply waiter
/// that can now only ever time out.
pub struct OutboundQueue {
    items: Mutex<VecDeque<OutboundFrame>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
            closed: AtomicBool::new(false),
        })
    }

    pub fn push(&self, frame: OutboundFrame) {
        let mut guard = self.items.lock().unwrap();
        if !frame.is_command() && guard.len() >= self.capacity {
            if let Some(pos) = guard.iter().position(|f| !f.is_command()) {
                guard.remove(pos);
                tracing::warn!("outbound queue full, dropped oldest non-command frame");
            }
        }
        guard.push_back(frame);
        drop(guard);
        self.notify.notify_one();
    }

    /// Waits for the next frame, or `None` once the queue is closed and
    /// drained.
    pub async fn pop(&self) -> Option<OutboundFrame> {
        loop {
            {
                let mut guard = self.items.lock().unwrap();
                if let Some(frame) = guard.pop_front() {
                    return Some(frame);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// Cheap, cloneable handle onto one connection's outbound queue. This is
/// the `T` instantiating `collector_core::SessionRegistry<T>` in this
/// crate.
#[derive(Clone)]
pub struct SessionTransport {
    queue: Arc<OutboundQueue>,
}

impl SessionTransport {
    pub fn new(queue: Arc<OutboundQueue>) -> Self {
        Self { queue }
    }

    pub fn send(&self, frame: OutboundFrame) {
        self.queue.push(frame);
    }
}

pub type Registry = SessionRegistry<SessionTransport>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn command(id: &str) -> OutboundFrame {
        OutboundFrame::command("capture_dom_snapshot", id, json!({}))
    }

    #[tokio::test]
    async fn pop_returns_frames_in_push_order() {
        let queue = OutboundQueue::new(4);
        queue.push(command("r1"));
        queue.push(command("r2"));
        let OutboundFrame::Command(first) = queue.pop().await.unwrap() else {
            panic!("expected a command frame");
        };
        let OutboundFrame::Command(second) = queue.pop().await.unwrap() else {
            panic!("expected a command frame");
        };
        assert_eq!(first.request_id, "r1");
        assert_eq!(second.request_id, "r2");
    }

    #[tokio::test]
    async fn close_unblocks_pop_with_none() {
        let queue = OutboundQueue::new(4);
        queue.close();
        assert!(queue.pop().await.is_none());
    }

    #[test]
    fn commands_are_never_evicted_on_overflow() {
        let queue = OutboundQueue::new(2);
        queue.push(command("r1"));
        queue.push(command("r2"));
        queue.push(command("r3"));
        let guard = queue.items.lock().unwrap();
        assert_eq!(guard.len(), 3);
    }
}
