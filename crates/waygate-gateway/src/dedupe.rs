//! Idempotent-send cache.
//!
//! Clients that reconnect mid-send retry with the same dedupe key. The
//! cache maps that key to the original send's outcome for a short TTL:
//! a retry gets the original thread id and a channel that replays every
//! event already pumped, then tails the remainder if the send is still
//! in flight — without a second delivery to the agent and without a
//! second inbound ledger event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use waygate_core::id::{ConversationKey, RequestId, ThreadId};
use waygate_events::LedgerEvent;

struct EntryState {
    buffer: Vec<Arc<LedgerEvent>>,
    listeners: Vec<mpsc::Sender<Arc<LedgerEvent>>>,
    done: bool,
}

/// The cached outcome of one deduplicated send.
pub struct DedupeEntry {
    thread_id: ThreadId,
    conversation_key: ConversationKey,
    request_id: RequestId,
    created_at: Instant,
    state: Mutex<EntryState>,
}

impl DedupeEntry {
    /// Create an entry for an in-flight send.
    #[must_use]
    pub fn new(
        thread_id: ThreadId,
        conversation_key: ConversationKey,
        request_id: RequestId,
    ) -> Self {
        Self {
            thread_id,
            conversation_key,
            request_id,
            created_at: Instant::now(),
            state: Mutex::new(EntryState {
                buffer: Vec::new(),
                listeners: Vec::new(),
                done: false,
            }),
        }
    }

    /// The thread the original send resolved to.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// The conversation the original send journals under.
    #[must_use]
    pub fn conversation_key(&self) -> &ConversationKey {
        &self.conversation_key
    }

    /// The request id minted for the original send.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Record one pumped event: buffer it for future retries and fan it
    /// to current ones.
    pub fn record(&self, event: &Arc<LedgerEvent>) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.buffer.push(Arc::clone(event));
        state.listeners.retain(|tx| match tx.try_send(Arc::clone(event)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(ev)) => {
                warn!(event = %ev.id, "Dedupe retry listener lagging, event dropped");
                true
            },
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Mark the send finished; listeners' channels close once drained.
    pub fn finish(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.done = true;
            state.listeners.clear();
        }
    }

    /// Whether the original send has finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.lock().map_or(true, |s| s.done)
    }

    /// Open a retry channel: replays the buffer, then tails live events
    /// until the send finishes.
    #[must_use]
    pub fn attach_listener(&self, tail_capacity: usize) -> mpsc::Receiver<Arc<LedgerEvent>> {
        let Ok(mut state) = self.state.lock() else {
            let (_tx, rx) = mpsc::channel(1);
            return rx;
        };
        // Size the buffer replay in, so try_send cannot fail here.
        let capacity = state.buffer.len().saturating_add(tail_capacity).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        for event in &state.buffer {
            let _ = tx.try_send(Arc::clone(event));
        }
        if !state.done {
            state.listeners.push(tx);
        }
        rx
    }
}

impl std::fmt::Debug for DedupeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupeEntry")
            .field("thread_id", &self.thread_id)
            .field("request_id", &self.request_id)
            .field("done", &self.is_done())
            .finish()
    }
}

/// Short-TTL map from client dedupe key to send outcome.
pub struct DedupeCache {
    entries: RwLock<HashMap<String, Arc<DedupeEntry>>>,
    ttl: Duration,
}

impl DedupeCache {
    /// Create a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// The cached entry for a key, if it has not expired.
    pub async fn get(&self, key: &str) -> Option<Arc<DedupeEntry>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| e.created_at.elapsed() < self.ttl)
            .cloned()
    }

    /// Cache the outcome of a fresh send.
    pub async fn insert(&self, key: impl Into<String>, entry: Arc<DedupeEntry>) {
        self.entries.write().await.insert(key.into(), entry);
    }

    /// Drop expired entries.
    pub async fn sweep(&self) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.created_at.elapsed() < self.ttl);
        let dropped = before.saturating_sub(entries.len());
        if dropped > 0 {
            debug!(dropped, "Dedupe sweep");
        }
    }

    /// Number of cached entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Start the periodic sweeper.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                cache.sweep().await;
            }
        })
    }
}

impl std::fmt::Debug for DedupeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupeCache").field("ttl", &self.ttl).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waygate_events::Direction;

    fn event(text: &str) -> Arc<LedgerEvent> {
        Arc::new(LedgerEvent::message(
            ConversationKey::from("c1"),
            Direction::OutboundFromAgent,
            "agent",
            text,
        ))
    }

    fn entry() -> Arc<DedupeEntry> {
        Arc::new(DedupeEntry::new(
            ThreadId::new(),
            ConversationKey::from("c1"),
            RequestId::new(),
        ))
    }

    #[tokio::test]
    async fn completed_send_replays_fully() {
        let entry = entry();
        entry.record(&event("hello"));
        entry.record(&event("done"));
        entry.finish();

        let mut rx = entry.attach_listener(8);
        assert_eq!(rx.recv().await.unwrap().text.as_deref(), Some("hello"));
        assert_eq!(rx.recv().await.unwrap().text.as_deref(), Some("done"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn inflight_send_replays_then_tails() {
        let entry = entry();
        entry.record(&event("first"));

        let mut rx = entry.attach_listener(8);
        assert_eq!(rx.recv().await.unwrap().text.as_deref(), Some("first"));

        entry.record(&event("second"));
        assert_eq!(rx.recv().await.unwrap().text.as_deref(), Some("second"));

        entry.finish();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_invisible_and_swept() {
        let cache = DedupeCache::new(Duration::from_secs(60));
        cache.insert("k", entry()).await;
        assert!(cache.get("k").await.is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.len().await, 1);

        cache.sweep().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_keys_miss() {
        let cache = DedupeCache::new(Duration::from_secs(60));
        assert!(cache.get("nope").await.is_none());
    }
}
