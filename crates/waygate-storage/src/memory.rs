//! In-memory `Store` backend.
//!
//! Used by the test suites and embedded/dev deployments. Honours every
//! sentinel-error contract of the trait; the pagination cursor is a
//! decimal offset into the conversation's append order.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use waygate_core::id::{ConversationKey, EventId, PrincipalId, ThreadId};
use waygate_events::LedgerEvent;

use crate::error::{StorageError, StorageResult};
use crate::store::{
    BulletinPost, ChannelBinding, EventPage, MailMessage, Note, Store, Thread, TodoItem,
};

#[derive(Default)]
struct MemoryInner {
    events_by_key: HashMap<ConversationKey, Vec<LedgerEvent>>,
    event_index: HashMap<EventId, (ConversationKey, usize)>,
    threads: HashMap<ThreadId, Thread>,
    threads_by_external: HashMap<(String, String), ThreadId>,
    bindings: HashMap<(String, String), ChannelBinding>,
    agent_state: HashMap<PrincipalId, Value>,
    todos: Vec<TodoItem>,
    notes: HashMap<(PrincipalId, String), Note>,
    bulletins: Vec<BulletinPost>,
    mail: Vec<MailMessage>,
}

/// In-memory [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of ledger events across all conversations.
    pub async fn event_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.events_by_key.values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

fn parse_cursor(cursor: Option<&str>) -> StorageResult<usize> {
    match cursor {
        None => Ok(0),
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| StorageError::InvalidCursor(raw.to_string())),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_event(&self, event: &LedgerEvent) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let entries = inner
            .events_by_key
            .entry(event.conversation_key.clone())
            .or_default();
        let idx = entries.len();
        entries.push(event.clone());
        inner
            .event_index
            .insert(event.id, (event.conversation_key.clone(), idx));
        Ok(())
    }

    async fn get_event(&self, id: EventId) -> StorageResult<LedgerEvent> {
        let inner = self.inner.read().await;
        let (key, idx) = inner
            .event_index
            .get(&id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        inner
            .events_by_key
            .get(key)
            .and_then(|events| events.get(*idx))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn get_events(
        &self,
        key: &ConversationKey,
        cursor: Option<&str>,
        limit: usize,
    ) -> StorageResult<EventPage> {
        let offset = parse_cursor(cursor)?;
        let inner = self.inner.read().await;
        let all = inner.events_by_key.get(key).map_or(&[][..], Vec::as_slice);

        let start = offset.min(all.len());
        let end = start.saturating_add(limit.max(1)).min(all.len());
        let events = all[start..end].to_vec();
        let next_cursor = (end < all.len()).then(|| end.to_string());

        Ok(EventPage {
            events,
            next_cursor,
        })
    }

    async fn list_events_by_actor(
        &self,
        actor: PrincipalId,
        limit: usize,
    ) -> StorageResult<Vec<LedgerEvent>> {
        let inner = self.inner.read().await;
        let mut hits: Vec<LedgerEvent> = inner
            .events_by_key
            .values()
            .flatten()
            .filter(|ev| ev.actor_principal == Some(actor))
            .cloned()
            .collect();
        hits.sort_by_key(|ev| ev.timestamp);
        hits.reverse();
        hits.truncate(limit);
        Ok(hits)
    }

    async fn create_thread(&self, thread: &Thread) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let key = (thread.frontend.clone(), thread.external_id.clone());
        if inner.threads_by_external.contains_key(&key) {
            return Err(StorageError::DuplicateThread {
                frontend: thread.frontend.clone(),
                external_id: thread.external_id.clone(),
            });
        }
        inner.threads_by_external.insert(key, thread.id);
        inner.threads.insert(thread.id, thread.clone());
        Ok(())
    }

    async fn get_thread(&self, id: ThreadId) -> StorageResult<Thread> {
        let inner = self.inner.read().await;
        inner
            .threads
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn find_thread(
        &self,
        frontend: &str,
        external_id: &str,
    ) -> StorageResult<Option<Thread>> {
        let inner = self.inner.read().await;
        let id = inner
            .threads_by_external
            .get(&(frontend.to_string(), external_id.to_string()));
        Ok(id.and_then(|id| inner.threads.get(id)).cloned())
    }

    async fn touch_thread(&self, id: ThreadId) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let thread = inner
            .threads
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        thread.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn upsert_binding(&self, binding: &ChannelBinding) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.bindings.insert(
            (binding.frontend.clone(), binding.channel_id.clone()),
            binding.clone(),
        );
        Ok(())
    }

    async fn find_binding(
        &self,
        frontend: &str,
        channel_id: &str,
    ) -> StorageResult<Option<ChannelBinding>> {
        let inner = self.inner.read().await;
        Ok(inner
            .bindings
            .get(&(frontend.to_string(), channel_id.to_string()))
            .cloned())
    }

    async fn delete_binding(&self, frontend: &str, channel_id: &str) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .bindings
            .remove(&(frontend.to_string(), channel_id.to_string()));
        Ok(())
    }

    async fn agent_state(&self, agent: PrincipalId) -> StorageResult<Option<Value>> {
        let inner = self.inner.read().await;
        Ok(inner.agent_state.get(&agent).cloned())
    }

    async fn set_agent_state(&self, agent: PrincipalId, state: Value) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.agent_state.insert(agent, state);
        Ok(())
    }

    async fn add_todo(&self, todo: &TodoItem) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.todos.push(todo.clone());
        Ok(())
    }

    async fn list_todos(
        &self,
        agent: PrincipalId,
        include_done: bool,
    ) -> StorageResult<Vec<TodoItem>> {
        let inner = self.inner.read().await;
        Ok(inner
            .todos
            .iter()
            .filter(|t| t.agent_id == agent && (include_done || !t.done))
            .cloned()
            .collect())
    }

    async fn complete_todo(&self, agent: PrincipalId, id: Uuid) -> StorageResult<TodoItem> {
        let mut inner = self.inner.write().await;
        let todo = inner
            .todos
            .iter_mut()
            .find(|t| t.agent_id == agent && t.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("todo {id}")))?;
        todo.done = true;
        todo.completed_at = Some(chrono::Utc::now());
        Ok(todo.clone())
    }

    async fn save_note(&self, note: &Note) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .notes
            .insert((note.agent_id, note.name.clone()), note.clone());
        Ok(())
    }

    async fn get_note(&self, agent: PrincipalId, name: &str) -> StorageResult<Option<Note>> {
        let inner = self.inner.read().await;
        Ok(inner.notes.get(&(agent, name.to_string())).cloned())
    }

    async fn post_bulletin(&self, post: &BulletinPost) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.bulletins.push(post.clone());
        Ok(())
    }

    async fn list_bulletins(&self, limit: usize) -> StorageResult<Vec<BulletinPost>> {
        let inner = self.inner.read().await;
        let mut posts: Vec<BulletinPost> = inner.bulletins.clone();
        posts.sort_by_key(|p| p.posted_at);
        posts.reverse();
        posts.truncate(limit);
        Ok(posts)
    }

    async fn send_mail(&self, mail: &MailMessage) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.mail.push(mail.clone());
        Ok(())
    }

    async fn inbox(&self, to: PrincipalId, unread_only: bool) -> StorageResult<Vec<MailMessage>> {
        let inner = self.inner.read().await;
        let mut messages: Vec<MailMessage> = inner
            .mail
            .iter()
            .filter(|m| m.to == to && (!unread_only || !m.read))
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.sent_at);
        messages.reverse();
        Ok(messages)
    }

    async fn mark_mail_read(&self, to: PrincipalId, id: Uuid) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let mail = inner
            .mail
            .iter_mut()
            .find(|m| m.to == to && m.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("mail {id}")))?;
        mail.read = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waygate_events::Direction;

    fn event(key: &str, text: &str) -> LedgerEvent {
        LedgerEvent::message(
            ConversationKey::from(key),
            Direction::InboundToAgent,
            "u",
            text,
        )
    }

    #[tokio::test]
    async fn events_paginate_in_append_order() {
        let store = MemoryStore::new();
        let key = ConversationKey::from("c1");
        for i in 0..5 {
            store.save_event(&event("c1", &format!("m{i}"))).await.unwrap();
        }

        let page = store.get_events(&key, None, 2).await.unwrap();
        assert_eq!(page.events.len(), 2);
        assert_eq!(page.events[0].text.as_deref(), Some("m0"));
        let cursor = page.next_cursor.unwrap();

        let page = store.get_events(&key, Some(&cursor), 10).await.unwrap();
        assert_eq!(page.events.len(), 3);
        assert_eq!(page.events[0].text.as_deref(), Some("m2"));
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn bad_cursor_is_rejected() {
        let store = MemoryStore::new();
        let err = store
            .get_events(&ConversationKey::from("c1"), Some("zzz"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidCursor(_)));
    }

    #[tokio::test]
    async fn events_are_monotonic_per_conversation() {
        let store = MemoryStore::new();
        let key = ConversationKey::from("c1");
        for i in 0..20 {
            store.save_event(&event("c1", &format!("m{i}"))).await.unwrap();
        }
        let page = store.get_events(&key, None, 100).await.unwrap();
        for pair in page.events.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn duplicate_thread_is_a_sentinel() {
        let store = MemoryStore::new();
        let agent = PrincipalId::new();
        store
            .create_thread(&Thread::new("web", "c1", agent))
            .await
            .unwrap();
        let err = store
            .create_thread(&Thread::new("web", "c1", agent))
            .await
            .unwrap_err();
        assert!(err.is_duplicate_thread());

        // Same external id on a different frontend is fine.
        store
            .create_thread(&Thread::new("matrix", "c1", agent))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn binding_upsert_replaces() {
        let store = MemoryStore::new();
        let p1 = PrincipalId::new();
        let p2 = PrincipalId::new();
        store
            .upsert_binding(&ChannelBinding::new("web", "c1", p1, "/w"))
            .await
            .unwrap();
        store
            .upsert_binding(&ChannelBinding::new("web", "c1", p2, "/w2"))
            .await
            .unwrap();

        let binding = store.find_binding("web", "c1").await.unwrap().unwrap();
        assert_eq!(binding.principal_id, p2);
        assert_eq!(binding.working_dir, "/w2");

        store.delete_binding("web", "c1").await.unwrap();
        assert!(store.find_binding("web", "c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn todo_lifecycle() {
        let store = MemoryStore::new();
        let agent = PrincipalId::new();
        let todo = TodoItem::new(agent, "write tests");
        store.add_todo(&todo).await.unwrap();

        let open = store.list_todos(agent, false).await.unwrap();
        assert_eq!(open.len(), 1);

        let done = store.complete_todo(agent, todo.id).await.unwrap();
        assert!(done.done);
        assert!(store.list_todos(agent, false).await.unwrap().is_empty());
        assert_eq!(store.list_todos(agent, true).await.unwrap().len(), 1);

        let err = store.complete_todo(agent, Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn mail_inbox_tracks_unread() {
        let store = MemoryStore::new();
        let from = PrincipalId::new();
        let to = PrincipalId::new();
        let mail = MailMessage {
            id: Uuid::new_v4(),
            from,
            to,
            subject: "hi".into(),
            body: "ping".into(),
            sent_at: chrono::Utc::now(),
            read: false,
        };
        store.send_mail(&mail).await.unwrap();

        assert_eq!(store.inbox(to, true).await.unwrap().len(), 1);
        store.mark_mail_read(to, mail.id).await.unwrap();
        assert!(store.inbox(to, true).await.unwrap().is_empty());
        assert_eq!(store.inbox(to, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn agent_state_round_trips() {
        let store = MemoryStore::new();
        let agent = PrincipalId::new();
        assert!(store.agent_state(agent).await.unwrap().is_none());
        store
            .set_agent_state(agent, serde_json::json!({"cursor": 42}))
            .await
            .unwrap();
        let state = store.agent_state(agent).await.unwrap().unwrap();
        assert_eq!(state["cursor"], 42);
    }
}
