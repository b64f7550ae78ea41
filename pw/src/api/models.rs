//! Request and response bodies

use serde::{Deserialize, Serialize};

use crate::catalog::{DeviceInfo, PlanInfo};
use crate::domain::{TaskId, WorkerState};

/// Returned by `POST /tasks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: TaskId,
}

/// Body of `GET` / `PUT /worker/task`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTask {
    #[serde(default)]
    pub task_id: Option<TaskId>,
}

/// Body of `PUT /worker/state`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeRequest {
    pub new_state: WorkerState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defer: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanResponse {
    pub plans: Vec<PlanInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub devices: Vec<DeviceInfo>,
}
