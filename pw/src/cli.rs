//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// PlanWorker - single-active-task plan execution service
#[derive(Parser)]
#[command(
    name = "pw",
    about = "Run and control a single-active-task plan worker",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the worker and its HTTP API
    Serve,

    /// (Deprecated) Alias of `serve`
    Worker,

    /// Talk to a running worker
    Controller {
        /// Server URL (defaults to the configured api host and port)
        #[arg(short, long)]
        url: Option<String>,

        #[command(subcommand)]
        command: ControllerCommand,
    },
}

/// Client subcommands
#[derive(Debug, Subcommand)]
pub enum ControllerCommand {
    /// List available plans, or show one
    Plans {
        /// Plan name
        name: Option<String>,
    },

    /// List available devices, or show one
    Devices {
        /// Device name
        name: Option<String>,
    },

    /// Submit a plan, run it and wait for it to finish
    Run {
        /// Plan name
        name: String,

        /// Plan parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        parameters: String,

        /// Give up waiting after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Submit a plan without starting it
    Submit {
        /// Plan name
        name: String,

        /// Plan parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        parameters: String,
    },

    /// Begin a previously submitted task
    Begin {
        /// Task id
        task_id: String,
    },

    /// Show a task
    Task {
        /// Task id
        task_id: String,
    },

    /// Show the active task id
    Active,

    /// Show the worker state
    State,

    /// Pause the running plan
    Pause {
        /// Pause at the next checkpoint instead of immediately
        #[arg(short, long)]
        defer: bool,
    },

    /// Resume the paused plan
    Resume,
}
