//! PlanWorker - single-active-task plan execution service
//!
//! Accepts plan submissions over HTTP, runs at most one of them at a time on
//! a stateful engine, and tells the submitter when each one finishes.
//!
//! # Core Concepts
//!
//! - **Submit, then begin**: submitting only registers a task; it runs when begun
//! - **One active task**: a task can only begin once the previous one has finished
//! - **Observable state**: the engine's many states collapse onto IDLE, RUNNING and PAUSED
//! - **Completion topics**: subscribers learn about exactly one terminal event per task
//!
//! # Modules
//!
//! - [`worker`] - Admission control and the actor owning all task state
//! - [`engine`] - Engine contract and the simulated engine
//! - [`completion`] - Per-task completion pub/sub
//! - [`registry`] - Submitted task store
//! - [`api`] - HTTP control surface
//! - [`client`] - HTTP client used by the CLI
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod api;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod completion;
pub mod config;
pub mod domain;
pub mod engine;
pub mod registry;
pub mod worker;

pub use catalog::Catalog;
pub use completion::{CompletionBus, CompletionError, CompletionSubscription};
pub use config::Config;
pub use domain::{Task, TaskCompletion, TaskId, TerminalStatus, TrackableTask, TransitionOutcome, WorkerState};
pub use engine::{Engine, EngineError, EngineEvent, EngineState};
pub use registry::TaskRegistry;
pub use worker::{Worker, WorkerConfig, WorkerError, WorkerHandle};
