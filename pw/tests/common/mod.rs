//! Shared test fixtures: a scriptable engine and HTTP helpers

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use planworker::api::{self, AppState};
use planworker::engine::{self, EngineEventSender};
use planworker::{
    Catalog, CompletionBus, Engine, EngineError, EngineEvent, EngineState, Task, TaskId, Worker, WorkerConfig,
    WorkerHandle, WorkerState,
};

/// A call the worker made on the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Run(TaskId),
    Pause { defer: bool },
    Resume,
}

/// Engine that records calls and switches state as soon as it is asked
pub struct RecordingEngine {
    events: EngineEventSender,
    calls: Mutex<Vec<EngineCall>>,
    next_run_error: Mutex<Option<EngineError>>,
}

impl RecordingEngine {
    pub fn new(events: EngineEventSender) -> Self {
        Self {
            events,
            calls: Mutex::new(Vec::new()),
            next_run_error: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn pause_calls(&self) -> Vec<bool> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Pause { defer } => Some(defer),
                _ => None,
            })
            .collect()
    }

    pub fn resume_calls(&self) -> usize {
        self.calls().iter().filter(|c| **c == EngineCall::Resume).count()
    }

    /// Refuse the next `run` with `error`
    pub fn fail_next_run(&self, error: EngineError) {
        *self.next_run_error.lock().unwrap() = Some(error);
    }

    /// Push a state change as if the engine moved on its own
    pub fn emit(&self, state: EngineState) {
        self.events.send(EngineEvent::StateChanged(state)).unwrap();
    }

    pub fn emit_error(&self, message: &str) {
        self.events.send(EngineEvent::Error(message.to_string())).unwrap();
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Engine for RecordingEngine {
    async fn run(&self, task_id: &TaskId, _task: &Task) -> Result<(), EngineError> {
        self.record(EngineCall::Run(task_id.clone()));
        if let Some(error) = self.next_run_error.lock().unwrap().take() {
            return Err(error);
        }
        self.emit(EngineState::Running);
        Ok(())
    }

    async fn request_pause(&self, defer: bool) -> Result<(), EngineError> {
        self.record(EngineCall::Pause { defer });
        self.emit(EngineState::Paused);
        Ok(())
    }

    async fn resume(&self) -> Result<(), EngineError> {
        self.record(EngineCall::Resume);
        self.emit(EngineState::Running);
        Ok(())
    }
}

/// A worker wired to a [`RecordingEngine`]
pub struct Harness {
    pub worker: WorkerHandle,
    pub engine: Arc<RecordingEngine>,
}

impl Harness {
    pub fn new() -> Self {
        let (tx, rx) = engine::event_channel();
        let engine = Arc::new(RecordingEngine::new(tx));
        let worker = Worker::spawn(WorkerConfig::default(), engine.clone(), rx, CompletionBus::new(64));
        Self { worker, engine }
    }

    pub fn router(&self) -> Router {
        api::router(AppState::new(self.worker.clone(), Catalog::builtin()))
    }

    /// Finish the running plan and wait for the worker to notice
    pub async fn finish_active(&self) {
        self.engine.emit(EngineState::Idle);
        wait_for_state(&self.worker, WorkerState::Idle).await;
    }
}

/// Block until the worker reports `target`, failing after two seconds
pub async fn wait_for_state(worker: &WorkerHandle, target: WorkerState) {
    let mut rx = worker.subscribe_state();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == target))
        .await
        .expect("timed out waiting for worker state")
        .expect("worker state channel closed");
}

/// Send one request through the router
pub async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, HeaderMap, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(payload) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&payload).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, headers, value)
}
