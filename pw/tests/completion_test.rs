//! Completion notification tests
//!
//! Run a real server on an ephemeral port and wait on task completions
//! through the HTTP client, the way the CLI does.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;

use common::{Harness, wait_for_state};
use planworker::api::{self, AppState};
use planworker::client::{ApiClient, ClientError};
use planworker::engine::{self, SimulatedEngine, SimulatedEngineConfig};
use planworker::{Catalog, CompletionBus, EngineError, EngineState, Task, TerminalStatus, Worker, WorkerConfig, WorkerHandle, WorkerState};

/// Running server plus the means to stop it
struct TestServer {
    client: ApiClient,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(worker: WorkerHandle) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = AppState::new(worker, Catalog::builtin());

        tokio::spawn(async move {
            let _ = api::serve(listener, state, async move {
                let _ = shutdown_rx.await;
            })
            .await;
        });

        Self {
            client: ApiClient::new(format!("http://{}", addr)),
            shutdown_tx: Some(shutdown_tx),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn simulated_worker(step_ms: u64) -> WorkerHandle {
    let (tx, rx) = engine::event_channel();
    let config = SimulatedEngineConfig {
        step: Duration::from_millis(step_ms),
        default_steps: 3,
        plans: Catalog::builtin().plan_names(),
    };
    let engine = SimulatedEngine::spawn(config, tx);
    Worker::spawn(WorkerConfig::default(), Arc::new(engine), rx, CompletionBus::default())
}

// =============================================================================
// In-process subscription
// =============================================================================

#[tokio::test]
async fn test_subscribe_before_begin_receives_completion() {
    let h = Harness::new();
    let task_id = h.worker.submit_task(Task::new("count")).await.unwrap();

    let mut subscription = h.worker.subscribe_completion(&task_id);
    h.worker.begin_task(&task_id).await.unwrap();
    h.engine.emit(EngineState::Idle);

    let completion = subscription.recv_timeout(Duration::from_secs(2)).await.unwrap();
    assert_eq!(completion.task_id, task_id);
    assert_eq!(completion.status, TerminalStatus::Complete);
    assert!(completion.errors.is_empty());
}

#[tokio::test]
async fn test_completion_published_once_per_task() {
    let h = Harness::new();
    let task_id = h.worker.submit_task(Task::new("count")).await.unwrap();
    let mut subscription = h.worker.subscribe_completion(&task_id);
    h.worker.begin_task(&task_id).await.unwrap();

    h.finish_active().await;
    h.engine.emit(EngineState::Running);
    h.engine.emit(EngineState::Idle);
    wait_for_state(&h.worker, WorkerState::Idle).await;

    subscription.recv_timeout(Duration::from_secs(2)).await.unwrap();
    assert!(subscription.recv_timeout(Duration::from_millis(100)).await.is_err());
}

#[tokio::test]
async fn test_engine_error_fails_task() {
    let h = Harness::new();
    let task_id = h.worker.submit_task(Task::new("count")).await.unwrap();
    let mut subscription = h.worker.subscribe_completion(&task_id);
    h.worker.begin_task(&task_id).await.unwrap();

    h.engine.emit_error("detector offline");
    h.engine.emit(EngineState::Idle);

    let completion = subscription.recv_timeout(Duration::from_secs(2)).await.unwrap();
    assert_eq!(completion.status, TerminalStatus::Failed);
    assert_eq!(completion.errors, vec!["detector offline".to_string()]);

    let task = h.worker.get_task(&task_id).await.unwrap().unwrap();
    assert!(task.is_complete);
    assert_eq!(task.errors, vec!["detector offline".to_string()]);
}

#[tokio::test]
async fn test_refused_run_fails_task_and_frees_worker() {
    let h = Harness::new();
    h.engine.fail_next_run(EngineError::UnknownPlan("fly".to_string()));
    let refused = h.worker.submit_task(Task::new("fly")).await.unwrap();
    let mut subscription = h.worker.subscribe_completion(&refused);

    h.worker.begin_task(&refused).await.unwrap();

    let completion = subscription.recv_timeout(Duration::from_secs(2)).await.unwrap();
    assert_eq!(completion.status, TerminalStatus::Failed);
    assert_eq!(completion.errors, vec!["Unknown plan: fly".to_string()]);
    assert_eq!(h.worker.state(), WorkerState::Idle);

    let next = h.worker.submit_task(Task::new("count")).await.unwrap();
    h.worker.begin_task(&next).await.unwrap();
    assert_eq!(h.worker.state(), WorkerState::Running);
}

// =============================================================================
// Remote subscription over HTTP
// =============================================================================

#[tokio::test]
async fn test_remote_subscriber_receives_completion() {
    let h = Harness::new();
    let server = TestServer::start(h.worker.clone()).await;
    let client = &server.client;

    let task_id = client.submit_task(&Task::new("count")).await.unwrap();
    let mut watcher = client.subscribe_completion(&task_id).await.unwrap();
    client.begin_task(&task_id).await.unwrap();
    assert_eq!(client.get_state().await.unwrap(), WorkerState::Running);

    h.engine.emit(EngineState::Idle);

    let completion = watcher.wait_timeout(Duration::from_secs(5)).await.unwrap();
    assert_eq!(completion.task_id, task_id);
    assert_eq!(completion.status, TerminalStatus::Complete);
}

#[tokio::test]
async fn test_late_subscriber_gets_completion_immediately() {
    let h = Harness::new();
    let server = TestServer::start(h.worker.clone()).await;
    let client = &server.client;

    let task_id = client.submit_task(&Task::new("count")).await.unwrap();
    client.begin_task(&task_id).await.unwrap();
    h.finish_active().await;

    let mut watcher = client.subscribe_completion(&task_id).await.unwrap();
    let completion = watcher.wait_timeout(Duration::from_secs(5)).await.unwrap();
    assert_eq!(completion.status, TerminalStatus::Complete);
}

#[tokio::test]
async fn test_subscribe_unknown_task_is_not_found() {
    let h = Harness::new();
    let server = TestServer::start(h.worker.clone()).await;

    let result = server
        .client
        .subscribe_completion(&planworker::TaskId::from_string("missing"))
        .await;
    assert!(matches!(result, Err(ClientError::NotFound(_))));
}

#[tokio::test]
async fn test_wait_timeout_leaves_task_running() {
    let h = Harness::new();
    let server = TestServer::start(h.worker.clone()).await;
    let client = &server.client;

    let task_id = client.submit_task(&Task::new("count")).await.unwrap();
    let mut watcher = client.subscribe_completion(&task_id).await.unwrap();
    client.begin_task(&task_id).await.unwrap();

    let result = watcher.wait_timeout(Duration::from_millis(100)).await;
    assert!(matches!(result, Err(ClientError::Timeout(_))));
    assert_eq!(client.get_state().await.unwrap(), WorkerState::Running);
    assert_eq!(client.get_active_task().await.unwrap(), Some(task_id));
}

#[tokio::test]
async fn test_client_transition_and_conflict() {
    let h = Harness::new();
    let server = TestServer::start(h.worker.clone()).await;
    let client = &server.client;

    let rejected = client.pause(false).await.unwrap();
    assert!(!rejected.accepted);
    assert_eq!(rejected.state, WorkerState::Idle);

    let first = client.submit_task(&Task::new("count")).await.unwrap();
    let second = client.submit_task(&Task::new("count")).await.unwrap();
    client.begin_task(&first).await.unwrap();
    let conflict = client.begin_task(&second).await;
    assert!(matches!(conflict, Err(ClientError::Conflict(_))));

    let paused = client.pause(true).await.unwrap();
    assert!(paused.accepted);
    assert_eq!(paused.state, WorkerState::Paused);
    assert_eq!(h.engine.pause_calls(), vec![true]);

    let resumed = client.resume().await.unwrap();
    assert!(resumed.accepted);
    assert_eq!(resumed.state, WorkerState::Running);
}

#[tokio::test]
async fn test_client_catalog_lookup() {
    let h = Harness::new();
    let server = TestServer::start(h.worker.clone()).await;
    let client = &server.client;

    let plan = client.get_plan("count").await.unwrap();
    assert_eq!(plan.name, "count");
    let device = client.get_device("det").await.unwrap();
    assert!(device.protocols.contains(&"Triggerable".to_string()));

    assert!(matches!(client.get_plan("fly").await, Err(ClientError::NotFound(_))));
    assert!(matches!(client.get_device("z").await, Err(ClientError::NotFound(_))));
}

// =============================================================================
// End to end with the simulated engine
// =============================================================================

#[tokio::test]
async fn test_simulated_run_with_pause_and_resume() {
    let worker = simulated_worker(30);
    let server = TestServer::start(worker.clone()).await;
    let client = &server.client;

    let task = Task::new("count").with_param("num", 4);
    let task_id = client.submit_task(&task).await.unwrap();
    let mut watcher = client.subscribe_completion(&task_id).await.unwrap();
    client.begin_task(&task_id).await.unwrap();

    let paused = client.pause(false).await.unwrap();
    assert_eq!(paused, planworker::TransitionOutcome { accepted: true, state: WorkerState::Paused });
    let resumed = client.resume().await.unwrap();
    assert_eq!(resumed.state, WorkerState::Running);

    let completion = watcher.wait_timeout(Duration::from_secs(5)).await.unwrap();
    assert_eq!(completion.status, TerminalStatus::Complete);
    assert_eq!(client.get_state().await.unwrap(), WorkerState::Idle);
    assert!(client.get_task(&task_id).await.unwrap().is_complete);
}

#[tokio::test]
async fn test_simulated_unknown_plan_fails() {
    let worker = simulated_worker(10);
    let server = TestServer::start(worker).await;
    let client = &server.client;

    let task_id = client.submit_task(&Task::new("fly")).await.unwrap();
    let mut watcher = client.subscribe_completion(&task_id).await.unwrap();
    client.begin_task(&task_id).await.unwrap();

    let completion = watcher.wait_timeout(Duration::from_secs(5)).await.unwrap();
    assert_eq!(completion.status, TerminalStatus::Failed);
    assert_eq!(completion.errors, vec!["Unknown plan: fly".to_string()]);
}

#[tokio::test]
async fn test_simulated_plan_error_fails() {
    let worker = simulated_worker(10);
    let server = TestServer::start(worker).await;
    let client = &server.client;

    let task = Task::new("count").with_param("num", 5).with_param("fail_after", 2);
    let task_id = client.submit_task(&task).await.unwrap();
    let mut watcher = client.subscribe_completion(&task_id).await.unwrap();
    client.begin_task(&task_id).await.unwrap();

    let completion = watcher.wait_timeout(Duration::from_secs(5)).await.unwrap();
    assert_eq!(completion.status, TerminalStatus::Failed);
    assert_eq!(completion.errors, vec!["plan failed after 2 step(s)".to_string()]);
}
