//! Per-session ordered event delivery.
//!
//! Producers publish without blocking into an unbounded queue. A consumer
//! waits for the next event with a timeout so the HTTP relay can interleave
//! keep-alives. Only one consumer drains a queue at a time; a second one
//! waits for the first to release it.

mod event;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub use event::{CONNECTED, KEEP_ALIVE, StreamEvent};

struct Channel {
    tx: UnboundedSender<StreamEvent>,
    rx: tokio::sync::Mutex<UnboundedReceiver<StreamEvent>>,
    last_active: Mutex<Instant>,
}

impl Channel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            last_active: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }
}

/// Registry of per-session event queues.
#[derive(Default)]
pub struct StreamHub {
    channels: RwLock<HashMap<String, Arc<Channel>>>,
}

impl StreamHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the queue for `session_id` if it does not exist yet.
    pub fn create(&self, session_id: &str) {
        self.channel(session_id);
    }

    fn channel(&self, session_id: &str) -> Arc<Channel> {
        if let Some(channel) = self.channels.read().get(session_id) {
            return Arc::clone(channel);
        }
        let mut channels = self.channels.write();
        Arc::clone(
            channels
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Channel::new())),
        )
    }

    /// Append an event. Never blocks.
    pub fn publish(&self, session_id: &str, event: StreamEvent) {
        let channel = self.channel(session_id);
        channel.touch();
        tracing::trace!(session_id = %session_id, event = event.name(), "publish");
        // The receiver lives inside the channel, so the send cannot fail.
        let _ = channel.tx.send(event);
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `None` on timeout; the caller emits a keep-alive and retries.
    pub async fn consume(&self, session_id: &str, timeout: Duration) -> Option<StreamEvent> {
        let channel = self.channel(session_id);
        let deadline = tokio::time::Instant::now() + timeout;

        let mut rx = tokio::time::timeout_at(deadline, channel.rx.lock())
            .await
            .ok()?;
        let event = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .ok()
            .flatten();
        channel.touch();
        event
    }

    /// Drop the queue for `session_id` along with any undelivered events.
    pub fn remove(&self, session_id: &str) -> bool {
        self.channels.write().remove(session_id).is_some()
    }

    /// Drop queues untouched for longer than `ttl` that have no attached consumer.
    pub fn sweep_idle(&self, ttl: Duration) -> Vec<String> {
        let mut channels = self.channels.write();
        let stale: Vec<String> = channels
            .iter()
            .filter(|(_, c)| c.last_active.lock().elapsed() > ttl && c.rx.try_lock().is_ok())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            channels.remove(id);
        }
        if !stale.is_empty() {
            tracing::debug!(count = stale.len(), "dropped idle event queues");
        }
        stale
    }

    /// Whether a queue exists for `session_id`.
    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.channels.read().contains_key(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> StreamEvent {
        StreamEvent::Chunk {
            chunk: text.to_string(),
        }
    }

    #[tokio::test]
    async fn delivers_in_publication_order() {
        let hub = StreamHub::new();
        hub.publish("s1", chunk("a"));
        hub.publish("s1", chunk("b"));
        hub.publish("s1", StreamEvent::Complete { content: None });

        let timeout = Duration::from_millis(50);
        assert_eq!(hub.consume("s1", timeout).await, Some(chunk("a")));
        assert_eq!(hub.consume("s1", timeout).await, Some(chunk("b")));
        assert_eq!(
            hub.consume("s1", timeout).await,
            Some(StreamEvent::Complete { content: None })
        );
        assert_eq!(hub.consume("s1", timeout).await, None);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let hub = StreamHub::new();
        hub.publish("s1", chunk("one"));
        hub.create("s2");

        assert_eq!(hub.consume("s2", Duration::from_millis(20)).await, None);
        assert_eq!(
            hub.consume("s1", Duration::from_millis(20)).await,
            Some(chunk("one"))
        );
    }

    #[tokio::test]
    async fn consumer_wakes_on_publish() {
        let hub = Arc::new(StreamHub::new());
        hub.create("s1");

        let consumer = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.consume("s1", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        hub.publish("s1", chunk("late"));

        assert_eq!(consumer.await.unwrap(), Some(chunk("late")));
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let hub = StreamHub::new();
        hub.publish("s1", chunk("kept"));
        hub.create("s1");

        assert_eq!(
            hub.consume("s1", Duration::from_millis(20)).await,
            Some(chunk("kept"))
        );
    }

    #[tokio::test]
    async fn sweep_drops_only_idle_queues() {
        let hub = StreamHub::new();
        hub.create("old");
        tokio::time::sleep(Duration::from_millis(30)).await;
        hub.create("fresh");
        hub.publish("fresh", chunk("x"));

        let removed = hub.sweep_idle(Duration::from_millis(20));
        assert_eq!(removed, vec!["old".to_string()]);
        assert!(!hub.contains("old"));
        assert!(hub.contains("fresh"));
    }
}
