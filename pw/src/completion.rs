//! CompletionBus - per-task terminal event pub/sub
//!
//! Publishers emit one `TaskCompletion` per task; subscribers filter the shared
//! broadcast stream down to the single topic they care about. A subscription
//! only sees messages published after it was created, so callers must
//! subscribe before they begin the task.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::{TaskCompletion, TaskId};

/// Default channel capacity (completions)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Errors from waiting on a completion
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("Completion channel closed before task {0} finished")]
    Closed(TaskId),

    #[error("Timed out after {0:?} waiting for completion")]
    Timeout(Duration),

    #[error("Subscriber for task {task_id} fell behind by {skipped} messages")]
    Lagged { task_id: TaskId, skipped: u64 },
}

/// Topic name for a task's terminal event
pub fn topic_for(task_id: &TaskId) -> String {
    format!("task.{}", task_id)
}

/// Publish side of the completion channel
#[derive(Clone)]
pub struct CompletionBus {
    tx: broadcast::Sender<TaskCompletion>,
}

impl CompletionBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "CompletionBus::new: called");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a terminal event; dropped if nobody is listening
    pub fn publish(&self, completion: TaskCompletion) {
        debug!(
            topic = %topic_for(&completion.task_id),
            status = %completion.status,
            "CompletionBus::publish"
        );
        let _ = self.tx.send(completion);
    }

    /// Subscribe to the topic for one task
    pub fn subscribe(&self, task_id: &TaskId) -> CompletionSubscription {
        debug!(topic = %topic_for(task_id), "CompletionBus::subscribe: new subscriber");
        CompletionSubscription {
            task_id: task_id.clone(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for CompletionBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// Receiving side bound to a single task id
pub struct CompletionSubscription {
    task_id: TaskId,
    rx: broadcast::Receiver<TaskCompletion>,
}

impl CompletionSubscription {
    /// Wait for the first terminal event for this task
    ///
    /// Returns [`CompletionError::Lagged`] once if messages were dropped before
    /// this subscriber read them; this task's own event may have been among
    /// them. The subscription stays usable afterwards.
    pub async fn recv(&mut self) -> Result<TaskCompletion, CompletionError> {
        loop {
            match self.rx.recv().await {
                Ok(completion) if completion.task_id == self.task_id => {
                    debug!(task_id = %self.task_id, "CompletionSubscription::recv: matched");
                    return Ok(completion);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(task_id = %self.task_id, skipped, "CompletionSubscription::recv: lagged");
                    return Err(CompletionError::Lagged {
                        task_id: self.task_id.clone(),
                        skipped,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(CompletionError::Closed(self.task_id.clone()));
                }
            }
        }
    }

    /// Like `recv`, bounded by `timeout`
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<TaskCompletion, CompletionError> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(timeout)),
        }
    }
}
