//! TaskRegistry - process-lifetime store of submitted tasks
//!
//! Owned by the worker actor; entries are never removed.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::{Task, TaskId, TrackableTask};

/// In-memory mapping from task id to its trackable record
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, TrackableTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new task and return its freshly generated id
    pub fn submit(&mut self, task: Task) -> TaskId {
        let task_id = TaskId::generate();
        debug!(%task_id, name = %task.name, "TaskRegistry::submit: called");
        self.tasks.insert(task_id.clone(), TrackableTask::new(task_id.clone(), task));
        task_id
    }

    /// Look up a task by id
    pub fn get(&self, task_id: &TaskId) -> Option<&TrackableTask> {
        self.tasks.get(task_id)
    }

    pub(crate) fn get_mut(&mut self, task_id: &TaskId) -> Option<&mut TrackableTask> {
        self.tasks.get_mut(task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
