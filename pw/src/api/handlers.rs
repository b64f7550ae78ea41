//! Route handlers

use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tracing::debug;

use super::AppState;
use super::error::ApiError;
use super::models::{DeviceResponse, PlanResponse, StateChangeRequest, TaskResponse, WorkerTask};
use crate::catalog::{DeviceInfo, PlanInfo};
use crate::completion::CompletionError;
use crate::domain::{Task, TaskCompletion, TaskId, TrackableTask, WorkerState};

/// SSE event name carrying a [`TaskCompletion`]
pub const COMPLETION_EVENT: &str = "completion";

pub async fn get_plans(State(state): State<AppState>) -> Json<PlanResponse> {
    Json(PlanResponse {
        plans: state.catalog.plans.clone(),
    })
}

pub async fn get_plan(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<PlanInfo>, ApiError> {
    state
        .catalog
        .plan(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Item not found".to_string()))
}

pub async fn get_devices(State(state): State<AppState>) -> Json<DeviceResponse> {
    Json(DeviceResponse {
        devices: state.catalog.devices.clone(),
    })
}

pub async fn get_device(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeviceInfo>, ApiError> {
    state
        .catalog
        .device(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Item not found".to_string()))
}

/// `POST /tasks` - register a task without starting it
pub async fn submit_task(State(state): State<AppState>, Json(task): Json<Task>) -> Result<impl IntoResponse, ApiError> {
    debug!(name = %task.name, "submit_task: called");
    if task.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Task name must not be empty".to_string()));
    }

    let task_id = state.worker.submit_task(task).await?;
    let location = format!("/tasks/{}", task_id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(TaskResponse { task_id }),
    ))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TrackableTask>, ApiError> {
    let task_id = TaskId::from_string(task_id);
    state
        .worker
        .get_task(&task_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Item not found".to_string()))
}

/// `PUT /worker/task` - begin a submitted task
pub async fn set_active_task(
    State(state): State<AppState>,
    Json(body): Json<WorkerTask>,
) -> Result<Json<WorkerTask>, ApiError> {
    debug!(task_id = ?body.task_id, "set_active_task: called");
    match &body.task_id {
        Some(task_id) => state.worker.begin_task(task_id).await?,
        None => {
            if let Some(active) = state.worker.get_active_task().await?
                && !active.is_complete
            {
                return Err(ApiError::Conflict(format!(
                    "Worker already active with task {}",
                    active.task_id
                )));
            }
        }
    }
    Ok(Json(body))
}

pub async fn get_active_task(State(state): State<AppState>) -> Result<Json<WorkerTask>, ApiError> {
    let active = state.worker.get_active_task().await?;
    Ok(Json(WorkerTask {
        task_id: active.map(|t| t.task_id),
    }))
}

pub async fn get_state(State(state): State<AppState>) -> Json<WorkerState> {
    Json(state.worker.state())
}

/// `PUT /worker/state` - 202 when the transition is allowed, 400 otherwise
pub async fn set_state(
    State(state): State<AppState>,
    Json(request): Json<StateChangeRequest>,
) -> Result<(StatusCode, Json<WorkerState>), ApiError> {
    debug!(?request, "set_state: called");
    let outcome = state
        .worker
        .request_transition(request.new_state, request.defer.unwrap_or(false))
        .await?;

    let status = if outcome.accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(outcome.state)))
}

/// `GET /tasks/{task_id}/completion` - one SSE event when the task finishes
///
/// The subscription is taken before the task is looked up, so a completion
/// racing this request is seen either in the registry or on the channel.
pub async fn task_completion(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let task_id = TaskId::from_string(task_id);
    debug!(%task_id, "task_completion: called");

    let mut subscription = state.worker.subscribe_completion(&task_id);
    let task = state
        .worker
        .get_task(&task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Item not found".to_string()))?;
    let finished = task.is_complete.then(|| task.completion());

    let worker = state.worker.clone();
    let stream = futures::stream::once(async move {
        let result = match finished {
            Some(completion) => Ok(completion),
            None => worker.wait_completion(&mut subscription).await,
        };
        Ok(completion_event(result))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn completion_event(result: Result<TaskCompletion, CompletionError>) -> Event {
    let error_event = |message: String| Event::default().event("error").data(message);
    match result {
        Ok(completion) => Event::default()
            .event(COMPLETION_EVENT)
            .json_data(&completion)
            .unwrap_or_else(|e| error_event(e.to_string())),
        Err(e) => error_event(e.to_string()),
    }
}
