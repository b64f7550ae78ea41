//! ApiClient - typed HTTP client for the plan worker API
//!
//! Used by the `controller` CLI commands. Completion waits ride on the
//! server-sent-event endpoint; a subscription is only handed back once the
//! server has acknowledged it, so beginning the task afterwards cannot race
//! the terminal event.

use std::time::Duration;

use futures::StreamExt;
use reqwest::StatusCode;
use reqwest_eventsource::{Event, EventSource};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{DeviceResponse, PlanResponse, StateChangeRequest, TaskResponse, WorkerTask};
use crate::catalog::{DeviceInfo, PlanInfo};
use crate::domain::{Task, TaskCompletion, TaskId, TrackableTask, TransitionOutcome, WorkerState};

/// Errors from talking to the API
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to establish connection to server at {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Server returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Completion stream error: {0}")]
    Stream(String),

    #[error("Timed out after {0:?} waiting for task to finish")]
    Timeout(Duration),
}

/// Client for one plan worker server
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(%base_url, "ApiClient::new: called");
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        request.send().await.map_err(|source| ClientError::Transport {
            url: self.base_url.clone(),
            source,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.send(self.http.get(self.url(path))).await?;
        decode(check(response).await?).await
    }

    pub async fn get_plans(&self) -> Result<Vec<PlanInfo>, ClientError> {
        debug!("get_plans: called");
        Ok(self.get_json::<PlanResponse>("/plans").await?.plans)
    }

    pub async fn get_plan(&self, name: &str) -> Result<PlanInfo, ClientError> {
        debug!(%name, "get_plan: called");
        self.get_json(&format!("/plans/{}", name)).await
    }

    pub async fn get_devices(&self) -> Result<Vec<DeviceInfo>, ClientError> {
        debug!("get_devices: called");
        Ok(self.get_json::<DeviceResponse>("/devices").await?.devices)
    }

    pub async fn get_device(&self, name: &str) -> Result<DeviceInfo, ClientError> {
        debug!(%name, "get_device: called");
        self.get_json(&format!("/devices/{}", name)).await
    }

    /// Register a task; it does not start until [`ApiClient::begin_task`]
    pub async fn submit_task(&self, task: &Task) -> Result<TaskId, ClientError> {
        debug!(name = %task.name, "submit_task: called");
        let response = self.send(self.http.post(self.url("/tasks")).json(task)).await?;
        let body: TaskResponse = decode(check(response).await?).await?;
        Ok(body.task_id)
    }

    pub async fn get_task(&self, task_id: &TaskId) -> Result<TrackableTask, ClientError> {
        debug!(%task_id, "get_task: called");
        self.get_json(&format!("/tasks/{}", task_id)).await
    }

    pub async fn begin_task(&self, task_id: &TaskId) -> Result<(), ClientError> {
        debug!(%task_id, "begin_task: called");
        let body = WorkerTask {
            task_id: Some(task_id.clone()),
        };
        let response = self.send(self.http.put(self.url("/worker/task")).json(&body)).await?;
        check(response).await?;
        Ok(())
    }

    pub async fn get_active_task(&self) -> Result<Option<TaskId>, ClientError> {
        debug!("get_active_task: called");
        Ok(self.get_json::<WorkerTask>("/worker/task").await?.task_id)
    }

    pub async fn get_state(&self) -> Result<WorkerState, ClientError> {
        debug!("get_state: called");
        self.get_json("/worker/state").await
    }

    /// Request a state change; a rejected request is not an error
    pub async fn request_transition(&self, target: WorkerState, defer: bool) -> Result<TransitionOutcome, ClientError> {
        debug!(%target, defer, "request_transition: called");
        let body = StateChangeRequest {
            new_state: target,
            defer: Some(defer),
        };
        let response = self.send(self.http.put(self.url("/worker/state")).json(&body)).await?;
        let accepted = match response.status() {
            StatusCode::ACCEPTED => true,
            StatusCode::BAD_REQUEST => false,
            _ => {
                check(response).await?;
                return Err(ClientError::InvalidResponse("unexpected status from /worker/state".to_string()));
            }
        };
        let state: WorkerState = decode(response).await?;
        Ok(TransitionOutcome { accepted, state })
    }

    pub async fn pause(&self, defer: bool) -> Result<TransitionOutcome, ClientError> {
        self.request_transition(WorkerState::Paused, defer).await
    }

    pub async fn resume(&self) -> Result<TransitionOutcome, ClientError> {
        self.request_transition(WorkerState::Running, false).await
    }

    /// Open the completion stream for a task and wait until the server has accepted it
    pub async fn subscribe_completion(&self, task_id: &TaskId) -> Result<CompletionWatcher, ClientError> {
        debug!(%task_id, "subscribe_completion: called");
        let request = self.http.get(self.url(&format!("/tasks/{}/completion", task_id)));
        let mut es = EventSource::new(request).map_err(|e| ClientError::Stream(e.to_string()))?;
        es.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        match es.next().await {
            Some(Ok(Event::Open)) => {
                debug!(%task_id, "subscribe_completion: Event::Open");
            }
            Some(Ok(Event::Message(msg))) => {
                return Err(ClientError::InvalidResponse(format!(
                    "completion stream sent '{}' before opening",
                    msg.event
                )));
            }
            Some(Err(e)) => return Err(self.stream_error(e)),
            None => return Err(ClientError::Stream("completion stream closed".to_string())),
        }

        Ok(CompletionWatcher {
            task_id: task_id.clone(),
            es,
        })
    }

    fn stream_error(&self, err: reqwest_eventsource::Error) -> ClientError {
        match err {
            reqwest_eventsource::Error::InvalidStatusCode(status, _) if status == StatusCode::NOT_FOUND => {
                ClientError::NotFound("Item not found".to_string())
            }
            reqwest_eventsource::Error::InvalidStatusCode(status, _) => ClientError::Status {
                status: status.as_u16(),
                detail: "completion stream refused".to_string(),
            },
            reqwest_eventsource::Error::Transport(source) => ClientError::Transport {
                url: self.base_url.clone(),
                source,
            },
            other => ClientError::Stream(other.to_string()),
        }
    }
}

/// An acknowledged subscription to one task's terminal event
pub struct CompletionWatcher {
    task_id: TaskId,
    es: EventSource,
}

impl CompletionWatcher {
    /// Wait for the terminal event
    pub async fn wait(&mut self) -> Result<TaskCompletion, ClientError> {
        debug!(task_id = %self.task_id, "CompletionWatcher::wait: called");
        while let Some(event) = self.es.next().await {
            match event {
                Ok(Event::Message(msg)) if msg.event == crate::api::COMPLETION_EVENT => {
                    let completion: TaskCompletion = serde_json::from_str(&msg.data)
                        .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
                    self.es.close();
                    return Ok(completion);
                }
                Ok(Event::Message(msg)) => {
                    warn!(event = %msg.event, data = %msg.data, "CompletionWatcher::wait: unexpected event");
                    self.es.close();
                    return Err(ClientError::Stream(msg.data));
                }
                Ok(Event::Open) => {
                    debug!("CompletionWatcher::wait: Event::Open");
                }
                Err(e) => {
                    self.es.close();
                    return Err(ClientError::Stream(e.to_string()));
                }
            }
        }
        Err(ClientError::Stream("completion stream ended".to_string()))
    }

    /// Like [`CompletionWatcher::wait`], giving up after `timeout`
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Result<TaskCompletion, ClientError> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(result) => result,
            Err(_) => {
                self.es.close();
                Err(ClientError::Timeout(timeout))
            }
        }
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or(text);

    Err(match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(detail),
        StatusCode::CONFLICT => ClientError::Conflict(detail),
        _ => ClientError::Status {
            status: status.as_u16(),
            detail,
        },
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    response
        .json()
        .await
        .map_err(|e| ClientError::InvalidResponse(e.to_string()))
}
