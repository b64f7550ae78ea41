//! PlanWorker - single-active-task plan execution service
//!
//! CLI entry point for serving the worker and controlling it remotely.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

use planworker::api::{self, AppState};
use planworker::catalog::{DeviceInfo, PlanInfo};
use planworker::cli::{Cli, Command, ControllerCommand};
use planworker::client::{ApiClient, CompletionWatcher};
use planworker::config::Config;
use planworker::engine::{self, SimulatedEngine};
use planworker::{CompletionBus, Task, TaskCompletion, TaskId, TerminalStatus, Worker};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, log_dir: Option<&Path>) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).context("Failed to create log directory")?;
            let log_file = fs::File::create(dir.join("planworker.log")).context("Failed to create log file")?;
            tracing_subscriber::fmt()
                .with_writer(log_file)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log settings from config file early (before full config load)
    let logging = Config::load_logging(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), logging.level.as_deref(), logging.dir.as_deref())
        .context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Serve) => {
            debug!("main: matched Serve command");
            cmd_serve(&config).await
        }
        Some(Command::Worker) => {
            debug!("main: matched deprecated Worker command");
            eprintln!("{}", "Please use serve command instead.".yellow());
            cmd_serve(&config).await
        }
        Some(Command::Controller { url, command }) => {
            debug!(?url, ?command, "main: matched Controller command");
            let client = ApiClient::new(url.unwrap_or_else(|| config.api.url()));
            cmd_controller(&config, &client, command).await
        }
        None => {
            debug!("main: no command specified, printing help");
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

/// Run the worker, the simulated engine and the HTTP API until Ctrl-C
async fn cmd_serve(config: &Config) -> Result<()> {
    debug!("cmd_serve: called");
    let completions = CompletionBus::new(config.completion.channel_capacity);
    let (event_tx, event_rx) = engine::event_channel();
    let engine = SimulatedEngine::spawn(config.engine.simulated(&config.catalog), event_tx);
    let worker = Worker::spawn(config.worker.clone(), Arc::new(engine), event_rx, completions);

    let addr = config.api.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind {}", addr))?;
    println!("PlanWorker listening on {}", config.api.url().cyan());

    let state = AppState::new(worker.clone(), config.catalog.clone());
    api::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
        }
        info!("Shutdown signal received");
    })
    .await
    .context("API server failed")?;

    if let Err(e) = worker.shutdown().await {
        debug!(error = %e, "cmd_serve: worker already stopped");
    }
    println!("PlanWorker stopped");
    Ok(())
}

async fn cmd_controller(config: &Config, client: &ApiClient, command: ControllerCommand) -> Result<()> {
    debug!(?command, "cmd_controller: called");
    match command {
        ControllerCommand::Plans { name: Some(name) } => print_plan(client.get_plan(&name).await?),
        ControllerCommand::Plans { name: None } => {
            for plan in client.get_plans().await? {
                print_plan(plan);
            }
        }
        ControllerCommand::Devices { name: Some(name) } => print_device(client.get_device(&name).await?),
        ControllerCommand::Devices { name: None } => {
            for device in client.get_devices().await? {
                print_device(device);
            }
        }
        ControllerCommand::Run {
            name,
            parameters,
            timeout,
        } => {
            let timeout = timeout.map(Duration::from_secs).or(config.client.completion_timeout());
            cmd_run(client, parse_task(&name, &parameters)?, timeout).await?;
        }
        ControllerCommand::Submit { name, parameters } => {
            let task_id = client.submit_task(&parse_task(&name, &parameters)?).await?;
            println!("{}", task_id);
        }
        ControllerCommand::Begin { task_id } => {
            client.begin_task(&TaskId::from_string(task_id)).await?;
            println!("{}", client.get_state().await?);
        }
        ControllerCommand::Task { task_id } => {
            let task = client.get_task(&TaskId::from_string(task_id)).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        ControllerCommand::Active => match client.get_active_task().await? {
            Some(task_id) => println!("{}", task_id),
            None => println!("No active task"),
        },
        ControllerCommand::State => {
            println!("{}", client.get_state().await?);
        }
        ControllerCommand::Pause { defer } => {
            let outcome = client.pause(defer).await?;
            print_transition(outcome.accepted, &outcome.state.to_string());
        }
        ControllerCommand::Resume => {
            let outcome = client.resume().await?;
            print_transition(outcome.accepted, &outcome.state.to_string());
        }
    }
    Ok(())
}

fn print_plan(plan: PlanInfo) {
    match plan.description {
        Some(description) => println!("{}  {}", plan.name.bold(), description),
        None => println!("{}", plan.name.bold()),
    }
}

fn print_device(device: DeviceInfo) {
    println!("{}  [{}]", device.name.bold(), device.protocols.join(", "));
}

fn print_transition(accepted: bool, state: &str) {
    if accepted {
        println!("{} (now {})", "accepted".green(), state);
    } else {
        println!("{} (still {})", "rejected".red(), state);
    }
}

/// Build a task from a plan name and a JSON object of parameters
fn parse_task(name: &str, parameters: &str) -> Result<Task> {
    let params: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(parameters).context("Parameters must be a JSON object")?;
    Ok(Task {
        name: name.to_string(),
        params,
    })
}

/// Submit, subscribe, begin, then wait for the terminal event
async fn cmd_run(client: &ApiClient, task: Task, timeout: Option<Duration>) -> Result<()> {
    debug!(name = %task.name, ?timeout, "cmd_run: called");
    let task_id = client.submit_task(&task).await?;
    println!("Submitted task {}", task_id.to_string().cyan());

    // Subscribe before beginning so the terminal event cannot be missed
    let mut watcher = client.subscribe_completion(&task_id).await?;
    client.begin_task(&task_id).await?;
    println!("Worker is {}", client.get_state().await?);

    let completion = tokio::select! {
        result = wait_for(&mut watcher, timeout) => result?,
        _ = tokio::signal::ctrl_c() => {
            return Err(eyre!("Stopped waiting for task {}; it keeps running on the server", task_id));
        }
    };

    print_completion(&completion);
    match completion.status {
        TerminalStatus::Complete => Ok(()),
        TerminalStatus::Failed => Err(eyre!("Task {} failed", task_id)),
    }
}

async fn wait_for(watcher: &mut CompletionWatcher, timeout: Option<Duration>) -> Result<TaskCompletion> {
    let completion = match timeout {
        Some(timeout) => watcher.wait_timeout(timeout).await?,
        None => watcher.wait().await?,
    };
    Ok(completion)
}

fn print_completion(completion: &TaskCompletion) {
    let status = match completion.status {
        TerminalStatus::Complete => completion.status.to_string().green(),
        TerminalStatus::Failed => completion.status.to_string().red(),
    };
    println!("Task {} {}", completion.task_id, status);
    for error in &completion.errors {
        println!("  {}", error);
    }
}
