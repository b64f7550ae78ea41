//! Plan worker configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::Catalog;
use crate::completion::DEFAULT_CHANNEL_CAPACITY;
use crate::engine::SimulatedEngineConfig;
use crate::worker::WorkerConfig;

/// Main plan worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP API bind / connect address
    pub api: ApiConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Worker actor tuning
    pub worker: WorkerConfig,

    /// Completion channel tuning
    pub completion: CompletionConfig,

    /// CLI client behaviour
    pub client: ClientConfig,

    /// Simulated engine tuning
    pub engine: EngineConfig,

    /// Plans and devices served by the API
    pub catalog: Catalog,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
            worker: WorkerConfig::default(),
            completion: CompletionConfig::default(),
            client: ClientConfig::default(),
            engine: EngineConfig::default(),
            catalog: Catalog::builtin(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .planworker.yml
        let local_config = PathBuf::from(".planworker.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/planworker/planworker.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("planworker").join("planworker.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the logging section, before logging is set up
    pub fn load_logging(config_path: Option<&PathBuf>) -> LoggingConfig {
        Self::load(config_path).map(|c| c.logging).unwrap_or_default()
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// HTTP API address
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ApiConfig {
    /// `host:port` for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL clients connect to
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (overridden by --log-level)
    pub level: Option<String>,

    /// Directory for planworker.log; logs go to stderr when unset
    pub dir: Option<PathBuf>,
}

/// Completion channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Broadcast buffer shared by all subscribers
    #[serde(rename = "channel-capacity")]
    pub channel_capacity: usize,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// CLI client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Give up waiting for a task after this many seconds; wait forever when unset
    #[serde(rename = "completion-timeout-secs")]
    pub completion_timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout_secs.map(Duration::from_secs)
    }
}

/// Simulated engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Duration of one plan step in milliseconds
    #[serde(rename = "step-ms")]
    pub step_ms: u64,

    /// Steps run when a task has no `num` parameter
    #[serde(rename = "default-steps")]
    pub default_steps: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_ms: 100,
            default_steps: 10,
        }
    }
}

impl EngineConfig {
    /// Engine settings accepting every plan in `catalog`
    pub fn simulated(&self, catalog: &Catalog) -> SimulatedEngineConfig {
        SimulatedEngineConfig {
            step: Duration::from_millis(self.step_ms),
            default_steps: self.default_steps,
            plans: catalog.plan_names(),
        }
    }
}
