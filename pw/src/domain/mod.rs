//! Domain types for the plan worker
//!
//! Tasks, their trackable wrappers, completion payloads and the observable
//! worker state machine.

mod state;
mod task;

pub use state::{TransitionOutcome, WorkerState};
pub use task::{Task, TaskCompletion, TaskId, TerminalStatus, TrackableTask};
