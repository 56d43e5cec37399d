/*!
 * Pending Tasks
 * Correlation table for requests awaiting a reply from another context
 */

use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::trace;

use crate::core::types::TaskId;

/// Why a pending task never got its reply
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    #[error("task discarded before it completed")]
    Disposed,
}

/// Receiver half handed to the caller
pub type TaskReceiver<T> = oneshot::Receiver<T>;

/// Map from correlation id to the waiting caller
///
/// Ids start at 1 and are never reused. Clearing the table drops every
/// sender, so awaiting callers observe a closed channel rather than a
/// fabricated result.
#[derive(Debug)]
pub struct PendingTasks<T> {
    next_id: AtomicU64,
    tasks: DashMap<TaskId, oneshot::Sender<T>, RandomState>,
}

impl<T> PendingTasks<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            tasks: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Allocate an id and the receiver its reply will arrive on
    pub fn register(&self) -> (TaskId, TaskReceiver<T>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.tasks.insert(id, tx);
        trace!(id, "task registered");
        (id, rx)
    }

    /// Deliver the reply for `id`; false if nobody is waiting
    pub fn resolve(&self, id: TaskId, value: T) -> bool {
        match self.tasks.remove(&id) {
            Some((_, tx)) => tx.send(value).is_ok(),
            None => {
                trace!(id, "reply for unknown task ignored");
                false
            }
        }
    }

    /// Forget one task without replying
    pub fn cancel(&self, id: TaskId) -> bool {
        self.tasks.remove(&id).is_some()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drop every waiter without resolving it
    pub fn clear(&self) {
        self.tasks.clear();
    }
}

impl<T> Default for PendingTasks<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Await a task receiver, mapping a discarded sender to [`TaskError`]
pub async fn wait<T>(rx: TaskReceiver<T>) -> Result<T, TaskError> {
    rx.await.map_err(|_| TaskError::Disposed)
}
