//! Execution engine contract
//!
//! The worker never inspects how a plan is executed. It drives an [`Engine`]
//! through three calls and learns about progress only through
//! [`EngineEvent`]s delivered on a channel it owns the receiving end of.

mod simulated;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{Task, TaskId, WorkerState};

pub use simulated::{SimulatedEngine, SimulatedEngineConfig};

/// Errors raised by an engine when asked to act
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Engine is busy running another plan")]
    Busy,

    #[error("Cannot {operation} while engine is {state}")]
    InvalidState { operation: &'static str, state: EngineState },

    #[error("Engine unavailable")]
    Unavailable,
}

/// Fine-grained engine run states
///
/// Engines report these; the worker only ever exposes the coarser
/// [`WorkerState`] they map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Idle,
    Running,
    Pausing,
    Paused,
    Halting,
    Stopping,
    Aborting,
    Suspending,
    Panicked,
}

impl EngineState {
    pub const ALL: [EngineState; 9] = [
        EngineState::Idle,
        EngineState::Running,
        EngineState::Pausing,
        EngineState::Paused,
        EngineState::Halting,
        EngineState::Stopping,
        EngineState::Aborting,
        EngineState::Suspending,
        EngineState::Panicked,
    ];
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Pausing => write!(f, "pausing"),
            Self::Paused => write!(f, "paused"),
            Self::Halting => write!(f, "halting"),
            Self::Stopping => write!(f, "stopping"),
            Self::Aborting => write!(f, "aborting"),
            Self::Suspending => write!(f, "suspending"),
            Self::Panicked => write!(f, "panicked"),
        }
    }
}

impl From<EngineState> for WorkerState {
    fn from(state: EngineState) -> Self {
        // No wildcard arm: a new engine state must be mapped here
        match state {
            EngineState::Idle | EngineState::Panicked => WorkerState::Idle,
            EngineState::Paused => WorkerState::Paused,
            EngineState::Running
            | EngineState::Pausing
            | EngineState::Halting
            | EngineState::Stopping
            | EngineState::Aborting
            | EngineState::Suspending => WorkerState::Running,
        }
    }
}

/// Notification from the engine to the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine entered a new state
    StateChanged(EngineState),
    /// The running plan reported an error; the task will finish as failed
    Error(String),
}

/// Sending half held by the engine
///
/// Unbounded so that an engine never waits on the worker that is waiting on it.
pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;

/// Receiving half owned by the worker
pub type EngineEventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Create the channel connecting an engine to its worker
pub fn event_channel() -> (EngineEventSender, EngineEventReceiver) {
    mpsc::unbounded_channel()
}

/// A stateful executor of plans
///
/// Every method must return promptly. Long-running work happens in the
/// background and is reported through [`EngineEvent`]s. Events an engine
/// emits before a call returns are observed by the worker before it replies
/// to the request that triggered the call.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Start executing `task`
    async fn run(&self, task_id: &TaskId, task: &Task) -> Result<(), EngineError>;

    /// Pause now, or at the next checkpoint when `defer` is set
    async fn request_pause(&self, defer: bool) -> Result<(), EngineError>;

    /// Continue a paused plan
    async fn resume(&self) -> Result<(), EngineError>;
}
