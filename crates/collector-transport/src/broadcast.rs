//! Broadcast fan-out for `/events` subscribers (§4.4): every stored event
//! is republished here, with no history replay for new subscribers.
//! Slow subscribers are dropped rather than allowed to apply
//! backpressure to the rest of the system; `tokio::sync::broadcast`'s
//! `Lagged` error is exactly that signal, surfaced to the caller driving
//! each subscriber's socket.

use tokio::sync::broadcast;

use collector_core::Event;

pub struct Broadcaster {
    tx: broadcast::Sender<Event>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// No-op if there are currently no subscribers; a send with no
    /// receivers is not an error here, unlike a typical mpsc channel.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector_core::testing::fixtures::console_event;

    #[tokio::test]
    async fn subscriber_receives_events_published_after_it_subscribes() {
        let broadcaster = Broadcaster::new(8);
        let mut rx = broadcaster.subscribe();
        broadcaster.publish(console_event("s1", "e1", 1, "hi"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_id(), "e1");
    }

    #[tokio::test]
    async fn lagging_subscriber_observes_overflow() {
        let broadcaster = Broadcaster::new(2);
        let mut rx = broadcaster.subscribe();
        for i in 0..5 {
            broadcaster.publish(console_event("s1", &format!("e{i}"), i, "hi"));
        }
        let err = rx.recv().await.unwrap_err();
        assert!(matches!(err, broadcast::error::RecvError::Lagged(_)));
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let broadcaster = Broadcaster::new(4);
        broadcaster.publish(console_event("s1", "e1", 1, "hi"));
    }
}
