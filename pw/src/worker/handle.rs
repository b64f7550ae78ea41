//! WorkerHandle - client interface for the Worker task

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use super::messages::{WorkerCommand, WorkerError, WorkerResponse};
use crate::completion::{CompletionBus, CompletionError, CompletionSubscription};
use crate::domain::{Task, TaskCompletion, TaskId, TrackableTask, TransitionOutcome, WorkerState};

/// Handle to send commands to the Worker
///
/// Cheap to clone; every clone talks to the same worker.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerCommand>,
    state_rx: watch::Receiver<WorkerState>,
    completions: CompletionBus,
}

impl WorkerHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<WorkerCommand>,
        state_rx: watch::Receiver<WorkerState>,
        completions: CompletionBus,
    ) -> Self {
        Self {
            tx,
            state_rx,
            completions,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> WorkerCommand) -> WorkerResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| WorkerError::ChannelError)?;
        reply_rx.await.map_err(|_| WorkerError::ChannelError)
    }

    /// Register a task definition; it does not run until begun
    pub async fn submit_task(&self, task: Task) -> WorkerResponse<TaskId> {
        debug!(name = %task.name, "submit_task: called");
        self.request(|reply| WorkerCommand::SubmitTask { task, reply }).await
    }

    /// Look up a submitted task
    pub async fn get_task(&self, task_id: &TaskId) -> WorkerResponse<Option<TrackableTask>> {
        debug!(%task_id, "get_task: called");
        let task_id = task_id.clone();
        self.request(|reply| WorkerCommand::GetTask { task_id, reply }).await
    }

    /// Make `task_id` the active task and start it
    pub async fn begin_task(&self, task_id: &TaskId) -> WorkerResponse<()> {
        debug!(%task_id, "begin_task: called");
        let task_id = task_id.clone();
        self.request(|reply| WorkerCommand::BeginTask { task_id, reply }).await?
    }

    /// The most recently begun task, if any
    pub async fn get_active_task(&self) -> WorkerResponse<Option<TrackableTask>> {
        debug!("get_active_task: called");
        self.request(|reply| WorkerCommand::GetActiveTask { reply }).await
    }

    /// Current worker state
    pub fn state(&self) -> WorkerState {
        *self.state_rx.borrow()
    }

    /// Observe state changes
    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state_rx.clone()
    }

    /// Ask for `target`; rejected requests are reported, not raised
    pub async fn request_transition(&self, target: WorkerState, defer: bool) -> WorkerResponse<TransitionOutcome> {
        debug!(%target, defer, "request_transition: called");
        self.request(|reply| WorkerCommand::RequestTransition { target, defer, reply })
            .await
    }

    pub async fn pause(&self, defer: bool) -> WorkerResponse<TransitionOutcome> {
        self.request_transition(WorkerState::Paused, defer).await
    }

    pub async fn resume(&self) -> WorkerResponse<TransitionOutcome> {
        self.request_transition(WorkerState::Running, false).await
    }

    /// Subscribe to a task's terminal event; do this before `begin_task`
    pub fn subscribe_completion(&self, task_id: &TaskId) -> CompletionSubscription {
        self.completions.subscribe(task_id)
    }

    /// Wait on `subscription`, falling back to the registry when it lags
    ///
    /// A lagging subscriber may have missed its own event, so the task record
    /// is consulted before waiting again.
    pub async fn wait_completion(
        &self,
        subscription: &mut CompletionSubscription,
    ) -> Result<TaskCompletion, CompletionError> {
        loop {
            match subscription.recv().await {
                Err(CompletionError::Lagged { task_id, .. }) => match self.get_task(&task_id).await {
                    Ok(Some(task)) if task.is_complete => {
                        debug!(%task_id, "wait_completion: recovered from registry");
                        return Ok(task.completion());
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(%task_id, error = %e, "wait_completion: worker unavailable");
                        return Err(CompletionError::Closed(task_id));
                    }
                },
                other => return other,
            }
        }
    }

    /// Stop the worker task
    pub async fn shutdown(&self) -> WorkerResponse<()> {
        debug!("shutdown: called");
        self.tx
            .send(WorkerCommand::Shutdown)
            .await
            .map_err(|_| WorkerError::ChannelError)
    }
}
