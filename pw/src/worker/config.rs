//! Worker configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Worker actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Channel buffer size for worker commands
    #[serde(default = "default_command_buffer", rename = "command-buffer")]
    pub command_buffer: usize,
}

fn default_command_buffer() -> usize {
    debug!("default_command_buffer: called");
    256
}

impl Default for WorkerConfig {
    fn default() -> Self {
        debug!("WorkerConfig::default: called");
        Self {
            command_buffer: default_command_buffer(),
        }
    }
}
