//! StateBridge - engine notifications to observable worker state
//!
//! Maps each [`EngineEvent`] onto the IDLE / RUNNING / PAUSED machine, owns
//! the published state cell, and fires the completion channel when the
//! active task finishes.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::completion::CompletionBus;
use crate::domain::{TaskId, WorkerState};
use crate::engine::{EngineEvent, EngineState};
use crate::registry::TaskRegistry;

/// Owner of the current [`WorkerState`]
pub struct StateBridge {
    state_tx: watch::Sender<WorkerState>,
    completions: CompletionBus,
}

impl StateBridge {
    pub fn new(completions: CompletionBus) -> Self {
        let (state_tx, _) = watch::channel(WorkerState::Idle);
        Self { state_tx, completions }
    }

    /// Current state as last derived from the engine
    pub fn current(&self) -> WorkerState {
        *self.state_tx.borrow()
    }

    /// New observer of state changes
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state_tx.subscribe()
    }

    /// Apply one engine notification
    pub fn apply(&self, event: EngineEvent, registry: &mut TaskRegistry, active: Option<&TaskId>) {
        debug!(?event, ?active, "StateBridge::apply: called");
        match event {
            EngineEvent::StateChanged(engine_state) => {
                let next = WorkerState::from(engine_state);
                let previous = self.state_tx.send_replace(next);
                if previous != next {
                    info!(%previous, %next, %engine_state, "Worker state changed");
                }
                if previous != WorkerState::Idle
                    && next == WorkerState::Idle
                    && let Some(task_id) = active
                {
                    if engine_state == EngineState::Panicked {
                        self.record_error(registry, task_id, "Engine panicked".to_string());
                    }
                    self.complete(registry, task_id);
                }
            }
            EngineEvent::Error(message) => match active {
                Some(task_id) => self.record_error(registry, task_id, message),
                None => warn!(%message, "Engine error with no active task"),
            },
        }
    }

    fn record_error(&self, registry: &mut TaskRegistry, task_id: &TaskId, message: String) {
        match registry.get_mut(task_id) {
            Some(task) if !task.is_complete => {
                warn!(%task_id, %message, "Active task reported an error");
                task.errors.push(message);
            }
            _ => warn!(%task_id, %message, "Engine error after task finished"),
        }
    }

    /// Record `error` against a task that never got going and finish it
    pub fn fail(&self, registry: &mut TaskRegistry, task_id: &TaskId, error: String) {
        debug!(%task_id, %error, "StateBridge::fail: called");
        self.record_error(registry, task_id, error);
        self.complete(registry, task_id);
    }

    /// Mark the task complete and publish its terminal event, at most once
    fn complete(&self, registry: &mut TaskRegistry, task_id: &TaskId) {
        let Some(task) = registry.get_mut(task_id) else {
            warn!(%task_id, "StateBridge::complete: task missing from registry");
            return;
        };
        if task.is_complete {
            debug!(%task_id, "StateBridge::complete: already complete");
            return;
        }

        task.is_complete = true;
        let completion = task.completion();
        info!(%task_id, status = %completion.status, "Task finished");
        self.completions.publish(completion);
    }
}
