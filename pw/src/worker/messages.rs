//! Worker messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{Task, TaskId, TrackableTask, TransitionOutcome, WorkerState};

/// Errors from worker operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("{0}")]
    Conflict(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from worker operations
pub type WorkerResponse<T> = Result<T, WorkerError>;

/// Commands sent to the Worker actor
#[derive(Debug)]
pub enum WorkerCommand {
    SubmitTask {
        task: Task,
        reply: oneshot::Sender<TaskId>,
    },
    GetTask {
        task_id: TaskId,
        reply: oneshot::Sender<Option<TrackableTask>>,
    },
    BeginTask {
        task_id: TaskId,
        reply: oneshot::Sender<WorkerResponse<()>>,
    },
    GetActiveTask {
        reply: oneshot::Sender<Option<TrackableTask>>,
    },
    RequestTransition {
        target: WorkerState,
        defer: bool,
        reply: oneshot::Sender<TransitionOutcome>,
    },
    Shutdown,
}
