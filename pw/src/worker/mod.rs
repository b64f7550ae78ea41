//! Worker - single-active-task admission and transition control
//!
//! One tokio task owns the registry, the active-task reference and the
//! state bridge. Control requests arrive as [`WorkerCommand`]s with oneshot
//! replies and engine notifications arrive on a separate channel; the actor
//! handles both in one loop so every check-then-act runs without
//! interleaving.

mod bridge;
mod config;
mod core;
mod handle;
mod messages;

pub use bridge::StateBridge;
pub use config::WorkerConfig;
pub use self::core::Worker;
pub use handle::WorkerHandle;
pub use messages::{WorkerCommand, WorkerError, WorkerResponse};
