//! Task definitions and their tracked runtime records

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque, globally-unique task identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh time-ordered id
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Wrap an id received from a caller
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A plan invocation: the plan name plus its keyword parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,

    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl Task {
    /// Create a task with no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter insertion
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// A submitted task together with its runtime bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackableTask {
    pub task_id: TaskId,
    pub task: Task,
    pub is_complete: bool,
    pub errors: Vec<String>,
}

impl TrackableTask {
    pub fn new(task_id: TaskId, task: Task) -> Self {
        Self {
            task_id,
            task,
            is_complete: false,
            errors: Vec::new(),
        }
    }

    /// Build the terminal event for this task
    pub fn completion(&self) -> TaskCompletion {
        TaskCompletion {
            task_id: self.task_id.clone(),
            status: if self.errors.is_empty() {
                TerminalStatus::Complete
            } else {
                TerminalStatus::Failed
            },
            errors: self.errors.clone(),
        }
    }
}

/// How a task finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Complete,
    Failed,
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal event published once per task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub task_id: TaskId,
    pub status: TerminalStatus,
    pub errors: Vec<String>,
}
