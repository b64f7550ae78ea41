//! Main Worker task implementation

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::bridge::StateBridge;
use super::config::WorkerConfig;
use super::handle::WorkerHandle;
use super::messages::{WorkerCommand, WorkerError, WorkerResponse};
use crate::completion::CompletionBus;
use crate::domain::{Task, TaskId, TrackableTask, TransitionOutcome, WorkerState};
use crate::engine::{Engine, EngineEvent, EngineEventReceiver};
use crate::registry::TaskRegistry;

/// The Worker admits at most one task at a time and drives the engine
pub struct Worker {
    rx: mpsc::Receiver<WorkerCommand>,
    events: EngineEventReceiver,
    engine: Arc<dyn Engine>,
    registry: TaskRegistry,
    bridge: StateBridge,
    active: Option<TaskId>,
}

impl Worker {
    /// Spawn the worker task and return a handle to it
    pub fn spawn(
        config: WorkerConfig,
        engine: Arc<dyn Engine>,
        events: EngineEventReceiver,
        completions: CompletionBus,
    ) -> WorkerHandle {
        debug!(?config, "Worker::spawn: called");
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let bridge = StateBridge::new(completions.clone());
        let state_rx = bridge.subscribe();

        let worker = Self {
            rx,
            events,
            engine,
            registry: TaskRegistry::new(),
            bridge,
            active: None,
        };
        tokio::spawn(worker.run());

        info!("Worker spawned");
        WorkerHandle::new(tx, state_rx, completions)
    }

    /// Run the worker event loop
    async fn run(mut self) {
        info!("Worker started");

        loop {
            tokio::select! {
                biased;

                Some(event) = self.events.recv() => {
                    self.on_engine_event(event);
                }
                cmd = self.rx.recv() => match cmd {
                    Some(WorkerCommand::Shutdown) => {
                        info!("Worker received shutdown");
                        break;
                    }
                    Some(cmd) => self.handle(cmd).await,
                    None => {
                        debug!("Worker::run: all handles dropped");
                        break;
                    }
                },
            }
        }

        info!("Worker stopped");
    }

    async fn handle(&mut self, cmd: WorkerCommand) {
        match cmd {
            WorkerCommand::SubmitTask { task, reply } => {
                let _ = reply.send(self.registry.submit(task));
            }
            WorkerCommand::GetTask { task_id, reply } => {
                let _ = reply.send(self.registry.get(&task_id).cloned());
            }
            WorkerCommand::BeginTask { task_id, reply } => {
                let result = self.begin_task(task_id).await;
                let _ = reply.send(result);
            }
            WorkerCommand::GetActiveTask { reply } => {
                self.drain_events();
                let _ = reply.send(self.active_task().cloned());
            }
            WorkerCommand::RequestTransition { target, defer, reply } => {
                let outcome = self.request_transition(target, defer).await;
                let _ = reply.send(outcome);
            }
            WorkerCommand::Shutdown => {}
        }
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        self.bridge.apply(event, &mut self.registry, self.active.as_ref());
    }

    /// Apply every engine event already delivered
    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.on_engine_event(event);
        }
    }

    fn active_task(&self) -> Option<&TrackableTask> {
        self.active.as_ref().and_then(|id| self.registry.get(id))
    }

    async fn begin_task(&mut self, task_id: TaskId) -> WorkerResponse<()> {
        debug!(%task_id, "Worker::begin_task: called");
        self.drain_events();

        if let Some(active) = self.active_task()
            && !active.is_complete
        {
            warn!(active = %active.task_id, requested = %task_id, "Worker::begin_task: rejected, task in progress");
            return Err(WorkerError::Conflict(format!(
                "Worker already active with task {}",
                active.task_id
            )));
        }

        let task: Task = match self.registry.get(&task_id) {
            Some(tracked) if tracked.is_complete => {
                return Err(WorkerError::Conflict(format!("Task {} has already finished", task_id)));
            }
            Some(tracked) => tracked.task.clone(),
            None => return Err(WorkerError::NotFound(task_id)),
        };

        info!(%task_id, plan = %task.name, "Beginning task");
        self.active = Some(task_id.clone());

        let result = self.engine.run(&task_id, &task).await;
        self.drain_events();
        if let Err(e) = result {
            warn!(%task_id, error = %e, "Engine refused task");
            self.bridge.fail(&mut self.registry, &task_id, e.to_string());
        }
        Ok(())
    }

    async fn request_transition(&mut self, target: WorkerState, defer: bool) -> TransitionOutcome {
        debug!(%target, defer, "Worker::request_transition: called");
        self.drain_events();

        let current = self.bridge.current();
        let rejected = TransitionOutcome {
            accepted: false,
            state: current,
        };
        if !current.can_request(target) {
            debug!(%current, %target, "Worker::request_transition: not in transition table");
            return rejected;
        }

        let result = match target {
            WorkerState::Paused => self.engine.request_pause(defer).await,
            WorkerState::Running => self.engine.resume().await,
            WorkerState::Idle => return rejected,
        };
        if let Err(e) = result {
            // The engine moved on between our read and its call
            warn!(%current, %target, error = %e, "Engine declined accepted transition");
        }

        self.drain_events();
        TransitionOutcome {
            accepted: true,
            state: self.bridge.current(),
        }
    }
}
