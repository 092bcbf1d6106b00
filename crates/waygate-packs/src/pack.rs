//! Live external pack handle.

use tokio::sync::{Mutex, mpsc};
use waygate_core::id::PackId;

use crate::error::{PackError, PackResult};
use crate::types::ExecuteToolRequest;

/// One attached external pack.
///
/// The registry owns the pack exclusively; the router only ever borrows
/// it through registry lookups. The send half of the pack's request
/// queue lives behind a close-mutex: the mutex is held across the queue
/// send, so `close` cannot interleave with an in-progress `send` — after
/// `close` returns, every subsequent `send` deterministically reports
/// [`PackError::PackClosed`].
#[derive(Debug)]
pub struct Pack {
    id: PackId,
    version: String,
    tool_names: Vec<String>,
    sender: Mutex<Option<mpsc::Sender<ExecuteToolRequest>>>,
}

impl Pack {
    /// Create a pack with a fresh bounded request queue, returning the
    /// receiving half for the attachment service to drain.
    #[must_use]
    pub(crate) fn new(
        id: PackId,
        version: String,
        tool_names: Vec<String>,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<ExecuteToolRequest>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        (
            Self {
                id,
                version,
                tool_names,
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// The pack's id.
    #[must_use]
    pub fn id(&self) -> &PackId {
        &self.id
    }

    /// The pack's version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Names of the tools this pack published.
    #[must_use]
    pub fn tool_names(&self) -> &[String] {
        &self.tool_names
    }

    /// Enqueue a tool request for the attachment stream to pick up.
    ///
    /// Suspends while the queue is full; callers bound the wait with
    /// their own deadline.
    ///
    /// # Errors
    ///
    /// [`PackError::PackClosed`] if the queue was closed before the call;
    /// [`PackError::PackDisconnected`] if the attachment stream went away
    /// mid-send.
    pub async fn send(&self, request: ExecuteToolRequest) -> PackResult<()> {
        let guard = self.sender.lock().await;
        let tx = guard.as_ref().ok_or(PackError::PackClosed)?;
        tx.send(request)
            .await
            .map_err(|_| PackError::PackDisconnected)
    }

    /// Close the request queue.
    ///
    /// Idempotent; returns `true` only for the call that actually closed
    /// the queue.
    pub async fn close(&self) -> bool {
        self.sender.lock().await.take().is_some()
    }

    /// Whether the queue has been closed.
    pub async fn is_closed(&self) -> bool {
        self.sender.lock().await.is_none()
    }
}
