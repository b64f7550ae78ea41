//! SimulatedEngine - an in-process engine that executes plans as timed steps
//!
//! Runs as its own tokio task. Each plan is a sequence of steps of fixed
//! duration; the step count comes from the `num` parameter or the configured
//! default. A `fail_after` parameter makes the plan report an error after
//! that many steps.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Engine, EngineError, EngineEvent, EngineEventSender, EngineState};
use crate::domain::{Task, TaskId};

/// Tuning for the simulated engine
#[derive(Debug, Clone)]
pub struct SimulatedEngineConfig {
    /// Duration of a single step
    pub step: Duration,
    /// Steps executed when a task does not pass `num`
    pub default_steps: u64,
    /// Plan names this engine accepts
    pub plans: Vec<String>,
}

impl Default for SimulatedEngineConfig {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(100),
            default_steps: 10,
            plans: vec!["count".to_string(), "sleep".to_string()],
        }
    }
}

type Reply = oneshot::Sender<Result<(), EngineError>>;

enum EngineCommand {
    Run { task_id: TaskId, task: Task, reply: Reply },
    Pause { defer: bool, reply: Reply },
    Resume { reply: Reply },
}

/// Handle to the simulated engine task
pub struct SimulatedEngine {
    tx: mpsc::Sender<EngineCommand>,
}

impl SimulatedEngine {
    /// Spawn the engine task, reporting to `events`
    pub fn spawn(config: SimulatedEngineConfig, events: EngineEventSender) -> Self {
        debug!(?config, "SimulatedEngine::spawn: called");
        let (tx, rx) = mpsc::channel(32);
        let actor = EngineActor {
            rx,
            events,
            state: EngineState::Idle,
            plans: config.plans.into_iter().collect(),
            step: config.step,
            default_steps: config.default_steps,
            current: None,
        };
        tokio::spawn(actor.run());
        Self { tx }
    }

    async fn call(&self, build: impl FnOnce(Reply) -> EngineCommand) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::Unavailable)?;
        reply_rx.await.map_err(|_| EngineError::Unavailable)?
    }
}

#[async_trait]
impl Engine for SimulatedEngine {
    async fn run(&self, task_id: &TaskId, task: &Task) -> Result<(), EngineError> {
        debug!(%task_id, name = %task.name, "SimulatedEngine::run: called");
        let task_id = task_id.clone();
        let task = task.clone();
        self.call(|reply| EngineCommand::Run { task_id, task, reply }).await
    }

    async fn request_pause(&self, defer: bool) -> Result<(), EngineError> {
        debug!(defer, "SimulatedEngine::request_pause: called");
        self.call(|reply| EngineCommand::Pause { defer, reply }).await
    }

    async fn resume(&self) -> Result<(), EngineError> {
        debug!("SimulatedEngine::resume: called");
        self.call(|reply| EngineCommand::Resume { reply }).await
    }
}

/// Progress of the plan currently loaded
struct Execution {
    task_id: TaskId,
    remaining: u64,
    fail_after: Option<u64>,
    completed: u64,
    /// End of the step in flight; `None` while paused
    deadline: Option<Instant>,
}

struct EngineActor {
    rx: mpsc::Receiver<EngineCommand>,
    events: EngineEventSender,
    state: EngineState,
    plans: HashSet<String>,
    step: Duration,
    default_steps: u64,
    current: Option<Execution>,
}

impl EngineActor {
    async fn run(mut self) {
        info!("SimulatedEngine started");
        self.emit(EngineState::Idle);

        loop {
            let deadline = self.current.as_ref().and_then(|exec| exec.deadline);
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.finish_step();
                }
            }
        }

        info!("SimulatedEngine stopped");
    }

    fn handle(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Run { task_id, task, reply } => {
                let result = self.start(task_id, &task);
                let _ = reply.send(result);
            }
            EngineCommand::Pause { defer, reply } => {
                let result = self.pause(defer);
                let _ = reply.send(result);
            }
            EngineCommand::Resume { reply } => {
                let result = self.resume();
                let _ = reply.send(result);
            }
        }
    }

    fn emit(&mut self, state: EngineState) {
        debug!(%state, "EngineActor::emit");
        self.state = state;
        let _ = self.events.send(EngineEvent::StateChanged(state));
    }

    fn start(&mut self, task_id: TaskId, task: &Task) -> Result<(), EngineError> {
        if self.state != EngineState::Idle {
            return Err(EngineError::Busy);
        }
        if !self.plans.contains(&task.name) {
            return Err(EngineError::UnknownPlan(task.name.clone()));
        }
        let steps = match task.params.get("num") {
            Some(value) => positive_count("num", value)?,
            None => self.default_steps,
        };
        let fail_after = match task.params.get("fail_after") {
            Some(value) => Some(positive_count("fail_after", value)?),
            None => None,
        };

        info!(%task_id, plan = %task.name, steps, "SimulatedEngine: starting plan");
        self.current = Some(Execution {
            task_id,
            remaining: steps,
            fail_after,
            completed: 0,
            deadline: Some(Instant::now() + self.step),
        });
        self.emit(EngineState::Running);
        if steps == 0 {
            self.finish();
        }
        Ok(())
    }

    fn pause(&mut self, defer: bool) -> Result<(), EngineError> {
        if self.state != EngineState::Running {
            return Err(EngineError::InvalidState {
                operation: "pause",
                state: self.state,
            });
        }

        self.emit(EngineState::Pausing);
        if !defer {
            // The interrupted step is repeated on resume
            if let Some(exec) = self.current.as_mut() {
                exec.deadline = None;
            }
            self.emit(EngineState::Paused);
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Paused {
            return Err(EngineError::InvalidState {
                operation: "resume",
                state: self.state,
            });
        }

        if let Some(exec) = self.current.as_mut() {
            exec.deadline = Some(Instant::now() + self.step);
        }
        self.emit(EngineState::Running);
        Ok(())
    }

    fn finish_step(&mut self) {
        let Some(exec) = self.current.as_mut() else {
            return;
        };
        exec.remaining = exec.remaining.saturating_sub(1);
        exec.completed += 1;
        debug!(task_id = %exec.task_id, completed = exec.completed, remaining = exec.remaining, "EngineActor::finish_step");

        if let Some(limit) = exec.fail_after
            && exec.completed >= limit
        {
            let message = format!("plan failed after {} step(s)", exec.completed);
            warn!(task_id = %exec.task_id, %message, "SimulatedEngine: plan error");
            let _ = self.events.send(EngineEvent::Error(message));
            self.finish();
            return;
        }

        if exec.remaining == 0 {
            self.finish();
        } else if self.state == EngineState::Pausing {
            exec.deadline = None;
            self.emit(EngineState::Paused);
        } else {
            exec.deadline = Some(Instant::now() + self.step);
        }
    }

    fn finish(&mut self) {
        if let Some(exec) = self.current.take() {
            info!(task_id = %exec.task_id, steps = exec.completed, "SimulatedEngine: plan finished");
        }
        self.emit(EngineState::Idle);
    }
}

fn positive_count(name: &str, value: &Value) -> Result<u64, EngineError> {
    value
        .as_u64()
        .filter(|n| *n > 0)
        .ok_or_else(|| EngineError::InvalidParams(format!("'{}' must be a positive integer, got {}", name, value)))
}
