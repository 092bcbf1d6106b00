//! Question routing for the `ask_user` tool.
//!
//! A blocked tool handler asks; a connected client answers through the
//! out-of-scope façade. The router correlates the two with a pending map
//! keyed by question id. Clients observe questions by subscribing to the
//! per-agent question stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, warn};
use waygate_core::id::{PrincipalId, QuestionId};
use waygate_core::protocol::QuestionAnswer;

use crate::error::{PackError, PackResult};

/// Buffer for per-agent question streams.
const QUESTION_STREAM_CAPACITY: usize = 16;

/// A question pushed to an agent's watching clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuestion {
    /// Question id, echoed back by `answer_question`.
    pub id: QuestionId,
    /// The agent asking.
    pub agent_id: PrincipalId,
    /// The question text.
    pub question: String,
    /// Options offered, possibly empty for free-form questions.
    pub options: Vec<String>,
    /// When the question was asked.
    pub asked_at: DateTime<Utc>,
}

struct PendingQuestion {
    agent_id: PrincipalId,
    // Taken under the write lock: the answer path and the timeout path
    // cannot both deliver.
    tx: Option<oneshot::Sender<QuestionAnswer>>,
}

/// Correlates `ask_user` calls with client answers.
pub struct QuestionRouter {
    pending: RwLock<HashMap<QuestionId, PendingQuestion>>,
    watchers: RwLock<HashMap<PrincipalId, Vec<mpsc::Sender<UserQuestion>>>>,
}

impl QuestionRouter {
    /// Create a question router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            watchers: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to the questions one agent asks.
    ///
    /// Consumed by the client-facing façade; dropping the receiver
    /// unsubscribes lazily on the next publish.
    pub async fn subscribe(&self, agent_id: PrincipalId) -> mpsc::Receiver<UserQuestion> {
        let (tx, rx) = mpsc::channel(QUESTION_STREAM_CAPACITY);
        self.watchers.write().await.entry(agent_id).or_default().push(tx);
        rx
    }

    /// Ask a question on behalf of an agent and wait for the answer.
    ///
    /// Returns `None` when the timeout elapses or the router shuts down
    /// first; the pending entry is removed either way.
    pub async fn ask(
        &self,
        agent_id: PrincipalId,
        question: impl Into<String>,
        options: Vec<String>,
        timeout: Duration,
    ) -> Option<QuestionAnswer> {
        let question = UserQuestion {
            id: QuestionId::new(),
            agent_id,
            question: question.into(),
            options,
            asked_at: Utc::now(),
        };
        let id = question.id;

        let (tx, rx) = oneshot::channel();
        self.pending
            .write()
            .await
            .insert(id, PendingQuestion {
                agent_id,
                tx: Some(tx),
            });

        self.publish(question).await;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(answer)) => Some(answer),
            Ok(Err(_closed)) => {
                // Router shut down while we waited.
                self.pending.write().await.remove(&id);
                None
            },
            Err(_elapsed) => {
                debug!(question = %id, "Question timed out unanswered");
                self.pending.write().await.remove(&id);
                None
            },
        }
    }

    /// Deliver a client's answer to the waiting handler.
    ///
    /// # Errors
    ///
    /// [`PackError::QuestionNotFound`] if no such question is pending
    /// (answered already, timed out, or never asked);
    /// [`PackError::Validation`] if the agent id does not match the
    /// question's agent.
    pub async fn deliver_answer(
        &self,
        agent_id: PrincipalId,
        question_id: QuestionId,
        answer: QuestionAnswer,
    ) -> PackResult<()> {
        let mut pending = self.pending.write().await;
        let entry = pending
            .get_mut(&question_id)
            .ok_or(PackError::QuestionNotFound(question_id))?;
        if entry.agent_id != agent_id {
            return Err(PackError::Validation(format!(
                "question {question_id} belongs to a different agent"
            )));
        }
        let tx = entry
            .tx
            .take()
            .ok_or(PackError::QuestionNotFound(question_id))?;
        pending.remove(&question_id);
        if tx.send(answer).is_err() {
            // Waiter already gave up; the entry is gone either way.
            debug!(question = %question_id, "Answer arrived after the asker left");
        }
        Ok(())
    }

    /// Number of questions currently awaiting an answer.
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Drop every pending question and subscription.
    ///
    /// Waiters observe a closed channel and report unanswered.
    pub async fn close(&self) {
        self.pending.write().await.clear();
        self.watchers.write().await.clear();
    }

    async fn publish(&self, question: UserQuestion) {
        let mut watchers = self.watchers.write().await;
        let Some(subs) = watchers.get_mut(&question.agent_id) else {
            warn!(
                agent = %question.agent_id,
                question = %question.id,
                "Question asked with no client watching"
            );
            return;
        };
        subs.retain(|tx| match tx.try_send(question.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(q)) => {
                warn!(question = %q.id, "Question watcher buffer full, question dropped");
                true
            },
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if subs.is_empty() {
            watchers.remove(&question.agent_id);
        }
    }
}

impl Default for QuestionRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QuestionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionRouter").finish_non_exhaustive()
    }
}
