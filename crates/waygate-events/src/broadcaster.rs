//! In-memory pub/sub keyed by conversation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{trace, warn};
use uuid::Uuid;
use waygate_core::id::ConversationKey;

use crate::event::LedgerEvent;

/// Default per-subscriber buffer capacity.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<Arc<LedgerEvent>>,
}

struct Inner {
    topics: RwLock<HashMap<ConversationKey, Vec<Subscriber>>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Inner {
    fn remove(&self, key: &ConversationKey, id: Uuid) {
        if let Ok(mut topics) = self.topics.write() {
            if let Some(subs) = topics.get_mut(key) {
                subs.retain(|s| s.id != id);
                if subs.is_empty() {
                    topics.remove(key);
                }
            }
        }
    }
}

/// Per-conversation fan-out of ledger events to live subscribers.
///
/// Publishing never blocks: a subscriber whose buffer is full loses the
/// event (with a warning), and the ledger remains the authoritative
/// record for catch-up reads. Cloning shares the underlying topic map.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    /// Create a broadcaster with the default subscriber capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Create a broadcaster with a specific per-subscriber capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to a conversation's live events.
    ///
    /// Dropping the returned [`Subscription`] unsubscribes and closes the
    /// channel exactly once. Subscribing after [`close`](Self::close)
    /// yields a subscription whose channel is already closed.
    #[must_use]
    pub fn subscribe(&self, key: &ConversationKey) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = Uuid::new_v4();

        if self.inner.closed.load(Ordering::SeqCst) {
            // tx dropped here: the subscription observes a closed channel.
            return Subscription {
                key: key.clone(),
                id,
                rx,
                inner: Arc::clone(&self.inner),
            };
        }

        if let Ok(mut topics) = self.inner.topics.write() {
            topics
                .entry(key.clone())
                .or_default()
                .push(Subscriber { id, tx });
        }
        trace!(conversation = %key, subscriber = %id, "Subscriber added");

        Subscription {
            key: key.clone(),
            id,
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Publish an event to every live subscriber of its conversation.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: LedgerEvent) -> usize {
        let event = Arc::new(event);
        self.publish_arc(&event)
    }

    /// Publish an already-shared event.
    pub fn publish_arc(&self, event: &Arc<LedgerEvent>) -> usize {
        if self.inner.closed.load(Ordering::SeqCst) {
            return 0;
        }

        let mut delivered: usize = 0;
        let mut dead: Vec<Uuid> = Vec::new();

        if let Ok(topics) = self.inner.topics.read() {
            let Some(subs) = topics.get(&event.conversation_key) else {
                trace!(conversation = %event.conversation_key, "No subscribers for event");
                return 0;
            };
            for sub in subs {
                match sub.tx.try_send(Arc::clone(event)) {
                    Ok(()) => delivered = delivered.saturating_add(1),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            conversation = %event.conversation_key,
                            subscriber = %sub.id,
                            event = %event.id,
                            "Subscriber buffer full, event dropped"
                        );
                    },
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dead.push(sub.id);
                    },
                }
            }
        }

        for id in dead {
            self.inner.remove(&event.conversation_key, id);
        }
        delivered
    }

    /// Number of live subscribers across all conversations.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .topics
            .read()
            .map(|topics| topics.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Shut the broadcaster down, closing every subscriber channel
    /// exactly once. Subsequent publishes are no-ops.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut topics) = self.inner.topics.write() {
            // Dropping the senders closes each subscriber channel.
            topics.clear();
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// A live subscription to one conversation.
pub struct Subscription {
    key: ConversationKey,
    id: Uuid,
    rx: mpsc::Receiver<Arc<LedgerEvent>>,
    inner: Arc<Inner>,
}

impl Subscription {
    /// Receive the next event.
    ///
    /// Returns `None` once the subscription is cancelled or the
    /// broadcaster shuts down.
    pub async fn recv(&mut self) -> Option<Arc<LedgerEvent>> {
        self.rx.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<LedgerEvent>> {
        self.rx.try_recv().ok()
    }

    /// The conversation this subscription watches.
    #[must_use]
    pub fn conversation_key(&self) -> &ConversationKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.remove(&self.key, self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("conversation", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Direction;

    fn event(key: &str, text: &str) -> LedgerEvent {
        LedgerEvent::message(
            ConversationKey::from(key),
            Direction::OutboundFromAgent,
            "agent",
            text,
        )
    }

    #[tokio::test]
    async fn fast_subscriber_receives_everything_in_order() {
        let bus = Broadcaster::new();
        let mut sub = bus.subscribe(&ConversationKey::from("c1"));

        for i in 0..10 {
            assert_eq!(bus.publish(event("c1", &format!("m{i}"))), 1);
        }
        for i in 0..10 {
            let ev = sub.recv().await.unwrap();
            assert_eq!(ev.text.as_deref(), Some(format!("m{i}").as_str()));
        }
    }

    #[tokio::test]
    async fn events_are_scoped_to_their_conversation() {
        let bus = Broadcaster::new();
        let mut sub_a = bus.subscribe(&ConversationKey::from("a"));
        let _sub_b = bus.subscribe(&ConversationKey::from("b"));

        assert_eq!(bus.publish(event("a", "hello")), 1);
        let ev = sub_a.recv().await.unwrap();
        assert_eq!(ev.conversation_key, ConversationKey::from("a"));
    }

    #[tokio::test]
    async fn slow_subscriber_never_stalls_the_publisher() {
        let bus = Broadcaster::with_capacity(2);
        let mut sub = bus.subscribe(&ConversationKey::from("c1"));

        // Publish well past the buffer; publish must return immediately.
        for i in 0..50 {
            bus.publish(event("c1", &format!("m{i}")));
        }

        // Only the buffered prefix is observable.
        assert_eq!(sub.recv().await.unwrap().text.as_deref(), Some("m0"));
        assert_eq!(sub.recv().await.unwrap().text.as_deref(), Some("m1"));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropping_a_subscription_unsubscribes() {
        let bus = Broadcaster::new();
        let sub = bus.subscribe(&ConversationKey::from("c1"));
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(event("c1", "m")), 0);
    }

    #[tokio::test]
    async fn close_ends_every_subscription() {
        let bus = Broadcaster::new();
        let mut sub1 = bus.subscribe(&ConversationKey::from("c1"));
        let mut sub2 = bus.subscribe(&ConversationKey::from("c2"));

        bus.close();
        bus.close(); // idempotent

        assert!(sub1.recv().await.is_none());
        assert!(sub2.recv().await.is_none());
        assert_eq!(bus.publish(event("c1", "m")), 0);
    }

    #[tokio::test]
    async fn subscribe_after_close_is_already_closed() {
        let bus = Broadcaster::new();
        bus.close();
        let mut sub = bus.subscribe(&ConversationKey::from("c1"));
        assert!(sub.recv().await.is_none());
    }
}
