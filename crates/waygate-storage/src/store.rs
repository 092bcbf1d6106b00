//! The `Store` contract and the rows it persists.
//!
//! The gateway consumes this trait; implementations (SQLite, the
//! in-memory backend in this crate) are collaborators. Backends enforce
//! their own uniqueness constraints, surface them as the sentinels in
//! [`StorageError`](crate::error::StorageError), and serialize concurrent
//! writers internally — the gateway layers no extra locking over write
//! paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use waygate_core::id::{ConversationKey, EventId, PrincipalId, ThreadId};
use waygate_events::LedgerEvent;

use crate::error::StorageResult;

/// Persistent conversation identity.
///
/// `(frontend, external_id)` is unique per store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    /// Thread id.
    pub id: ThreadId,
    /// Frontend that owns the conversation (e.g. `"web"`, `"matrix"`).
    pub frontend: String,
    /// Conversation id within that frontend.
    pub external_id: String,
    /// The agent principal servicing the thread.
    pub agent_id: PrincipalId,
    /// When the thread was created.
    pub created_at: DateTime<Utc>,
    /// Last activity.
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// Create a thread rooted at `(frontend, external_id)`.
    #[must_use]
    pub fn new(
        frontend: impl Into<String>,
        external_id: impl Into<String>,
        agent_id: PrincipalId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ThreadId::new(),
            frontend: frontend.into(),
            external_id: external_id.into(),
            agent_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// The conversation key this thread journals under.
    #[must_use]
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(format!("{}:{}", self.frontend, self.external_id))
    }
}

/// Maps a frontend channel to the agent identity servicing it.
///
/// `(frontend, channel_id)` is unique per store. The binding survives
/// agent restarts: it targets `(principal_id, working_dir)`, not a live
/// connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelBinding {
    /// Frontend name.
    pub frontend: String,
    /// Channel id within that frontend.
    pub channel_id: String,
    /// The bound agent principal.
    pub principal_id: PrincipalId,
    /// The bound working directory.
    pub working_dir: String,
    /// When the binding was created.
    pub created_at: DateTime<Utc>,
}

impl ChannelBinding {
    /// Create a binding.
    #[must_use]
    pub fn new(
        frontend: impl Into<String>,
        channel_id: impl Into<String>,
        principal_id: PrincipalId,
        working_dir: impl Into<String>,
    ) -> Self {
        Self {
            frontend: frontend.into(),
            channel_id: channel_id.into(),
            principal_id,
            working_dir: working_dir.into(),
            created_at: Utc::now(),
        }
    }
}

/// A page of ledger events plus the cursor for the next page.
#[derive(Debug, Clone)]
pub struct EventPage {
    /// The events, oldest first.
    pub events: Vec<LedgerEvent>,
    /// Opaque cursor resuming after the last event, if more exist.
    pub next_cursor: Option<String>,
}

/// One per-agent todo row (builtin `todo_*` tools).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    /// Row id.
    pub id: Uuid,
    /// Owning agent.
    pub agent_id: PrincipalId,
    /// What to do.
    pub description: String,
    /// Whether the item is complete.
    pub done: bool,
    /// When the item was created.
    pub created_at: DateTime<Utc>,
    /// When the item was completed, if it was.
    pub completed_at: Option<DateTime<Utc>>,
}

impl TodoItem {
    /// Create an open todo.
    #[must_use]
    pub fn new(agent_id: PrincipalId, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            description: description.into(),
            done: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// A named per-agent note (builtin `note_*` tools).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Owning agent.
    pub agent_id: PrincipalId,
    /// Note name, unique per agent.
    pub name: String,
    /// Note body.
    pub content: String,
    /// Last write.
    pub updated_at: DateTime<Utc>,
}

/// A fleet-wide bulletin post (builtin `bulletin_*` tools).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletinPost {
    /// Row id.
    pub id: Uuid,
    /// Posting agent.
    pub author: PrincipalId,
    /// Display name of the posting agent.
    pub author_name: String,
    /// Post body.
    pub body: String,
    /// When the post was made.
    pub posted_at: DateTime<Utc>,
}

/// An agent-to-agent mail message (builtin `mail_*` tools).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    /// Row id.
    pub id: Uuid,
    /// Sending agent.
    pub from: PrincipalId,
    /// Receiving agent.
    pub to: PrincipalId,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// When the message was sent.
    pub sent_at: DateTime<Utc>,
    /// Whether the recipient has fetched it.
    pub read: bool,
}

/// Abstract persistence consumed by the gateway.
#[async_trait]
pub trait Store: Send + Sync {
    // --- Ledger -----------------------------------------------------------

    /// Append a ledger event.
    async fn save_event(&self, event: &LedgerEvent) -> StorageResult<()>;

    /// Fetch one event by id.
    async fn get_event(&self, id: EventId) -> StorageResult<LedgerEvent>;

    /// Read a page of a conversation's events, oldest first.
    ///
    /// `cursor` is an opaque token from a previous page (`None` starts at
    /// the beginning); `limit` caps the page size.
    async fn get_events(
        &self,
        key: &ConversationKey,
        cursor: Option<&str>,
        limit: usize,
    ) -> StorageResult<EventPage>;

    /// Most recent events stamped with the given acting principal.
    async fn list_events_by_actor(
        &self,
        actor: PrincipalId,
        limit: usize,
    ) -> StorageResult<Vec<LedgerEvent>>;

    // --- Threads ----------------------------------------------------------

    /// Create a thread; `DuplicateThread` if `(frontend, external_id)`
    /// already exists.
    async fn create_thread(&self, thread: &Thread) -> StorageResult<()>;

    /// Fetch a thread by id.
    async fn get_thread(&self, id: ThreadId) -> StorageResult<Thread>;

    /// Look a thread up by `(frontend, external_id)`.
    async fn find_thread(
        &self,
        frontend: &str,
        external_id: &str,
    ) -> StorageResult<Option<Thread>>;

    /// Bump a thread's `updated_at`.
    async fn touch_thread(&self, id: ThreadId) -> StorageResult<()>;

    // --- Channel bindings -------------------------------------------------

    /// Create or replace the binding for `(frontend, channel_id)`.
    async fn upsert_binding(&self, binding: &ChannelBinding) -> StorageResult<()>;

    /// Look a binding up by `(frontend, channel_id)`.
    async fn find_binding(
        &self,
        frontend: &str,
        channel_id: &str,
    ) -> StorageResult<Option<ChannelBinding>>;

    /// Remove a binding. Missing rows are not an error.
    async fn delete_binding(&self, frontend: &str, channel_id: &str) -> StorageResult<()>;

    // --- Agent state ------------------------------------------------------

    /// Read an agent's opaque state blob.
    async fn agent_state(&self, agent: PrincipalId) -> StorageResult<Option<Value>>;

    /// Write an agent's opaque state blob.
    async fn set_agent_state(&self, agent: PrincipalId, state: Value) -> StorageResult<()>;

    // --- Builtin tool tables ----------------------------------------------

    /// Insert a todo row.
    async fn add_todo(&self, todo: &TodoItem) -> StorageResult<()>;

    /// List an agent's todos, oldest first.
    async fn list_todos(&self, agent: PrincipalId, include_done: bool)
    -> StorageResult<Vec<TodoItem>>;

    /// Mark a todo complete; `NotFound` if the agent has no such row.
    async fn complete_todo(&self, agent: PrincipalId, id: Uuid) -> StorageResult<TodoItem>;

    /// Create or replace a named note.
    async fn save_note(&self, note: &Note) -> StorageResult<()>;

    /// Fetch a named note.
    async fn get_note(&self, agent: PrincipalId, name: &str) -> StorageResult<Option<Note>>;

    /// Append a bulletin post.
    async fn post_bulletin(&self, post: &BulletinPost) -> StorageResult<()>;

    /// Most recent bulletin posts, newest first.
    async fn list_bulletins(&self, limit: usize) -> StorageResult<Vec<BulletinPost>>;

    /// Insert a mail message.
    async fn send_mail(&self, mail: &MailMessage) -> StorageResult<()>;

    /// An agent's inbox, newest first.
    async fn inbox(&self, to: PrincipalId, unread_only: bool) -> StorageResult<Vec<MailMessage>>;

    /// Mark a mail message read; `NotFound` if the recipient has no such
    /// row.
    async fn mark_mail_read(&self, to: PrincipalId, id: Uuid) -> StorageResult<()>;
}
