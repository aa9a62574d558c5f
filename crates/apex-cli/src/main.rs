//! `apex` — the thin CLI front-end that drives the orchestration
//! kernel (spec §4.K): opens a store, builds an `Orchestrator`, runs
//! it, and maps the outcome to an exit code (spec §6).

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;

use apex_dispatch::{UtilityCapability, UtilityCatalog};
use apex_orchestrator::{Orchestrator, UtilityScripts, WorkerInvocation};
use apex_process::{ProcessManager, ProcessManagerConfig, RealLauncher};
use apex_shared::config::ApexConfig;
use apex_store::StoreHandle;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::error;

/// Command-line front-end for the APEX orchestration kernel.
#[derive(Debug, Parser)]
#[command(name = "apex", version, about)]
struct Cli {
    /// Directory holding the embedded store file.
    #[arg(long, global = true, default_value = "./apex-data")]
    store_path: String,

    /// Project namespace within the store.
    #[arg(long, global = true, default_value = "default")]
    project_id: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the PLAN/CONSTRUCT/INVOKE/MONITOR/INTEGRATE loop to
    /// completion, a stop request, or the tick safety cap.
    Run {
        /// The goal text handed to the Planner.
        #[arg(long)]
        goal: String,
        /// Worker model identifier, passed as `--model` to `claude`.
        #[arg(long, default_value = "claude-opus-4")]
        model: String,
        /// Path to the MCP server config consumed by worker subprocesses.
        #[arg(long, default_value = "./.mcp.json")]
        mcp_config: String,
        /// A `name=script-path` pair, repeatable, wiring a utility's
        /// dispatch name to its runnable tool script.
        #[arg(long = "utility", value_parser = parse_utility)]
        utilities: Vec<(String, String)>,
    },
    /// Sets the `paused` flag; in-flight subprocesses keep running.
    Pause,
    /// Clears the `paused` flag.
    Resume,
    /// Requests a stop and terminates every active process.
    Stop,
    /// Prints the current `SupervisorState` as JSON.
    Status,
}

fn parse_utility(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, script)| (name.to_string(), script.to_string()))
        .ok_or_else(|| format!("expected NAME=SCRIPT, got '{raw}'"))
}

fn build_orchestrator(
    store: StoreHandle,
    project_id: &str,
    config: ApexConfig,
    worker_invocation: WorkerInvocation,
    utilities: Vec<(String, String)>,
) -> Orchestrator {
    let process_config = ProcessManagerConfig {
        max_workers: config.concurrency.max_workers,
        max_utilities: config.concurrency.max_utilities,
        worker_timeout: std::time::Duration::from_secs(config.timeouts.worker_seconds),
        utility_timeout: std::time::Duration::from_secs(config.timeouts.utility_seconds),
        terminate_grace: std::time::Duration::from_secs(config.timeouts.terminate_grace_seconds),
    };
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let process_manager =
        Arc::new(ProcessManager::new(Arc::new(RealLauncher), process_config).with_stream_sink(tx));

    let catalog = UtilityCatalog {
        utilities: utilities
            .iter()
            .map(|(name, _)| UtilityCapability {
                name: name.clone(),
                keywords: vec![name.clone()],
            })
            .collect(),
    };
    let scripts = UtilityScripts {
        scripts: utilities.into_iter().collect::<HashMap<_, _>>(),
    };

    Orchestrator::new(
        store,
        project_id,
        config,
        process_manager,
        worker_invocation,
        catalog,
        scripts,
        rx,
    )
}

#[tokio::main]
async fn main() -> ExitCode {
    apex_shared::telemetry::init_tracing(false);

    let cli = Cli::parse();
    let config = match ApexConfig::load(None) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let store = match StoreHandle::open(&cli.store_path, config.store.map_size_bytes) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to open store");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Run { goal, model, mcp_config, utilities } => {
            let worker_invocation = WorkerInvocation { model, mcp_config_path: mcp_config };
            let orchestrator =
                build_orchestrator(store, &cli.project_id, config, worker_invocation, utilities);
            match orchestrator.run(&goal, Utc::now).await {
                Ok(state) if state.is_idle() && state.failed.is_empty() => ExitCode::SUCCESS,
                Ok(_) => ExitCode::FAILURE,
                Err(e) => {
                    error!(error = %e, "orchestration run failed");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Pause => {
            let worker_invocation = WorkerInvocation { model: String::new(), mcp_config_path: String::new() };
            let orchestrator = build_orchestrator(store, &cli.project_id, config, worker_invocation, Vec::new());
            match orchestrator.pause() {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(error = %e, "pause failed");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Resume => {
            let worker_invocation = WorkerInvocation { model: String::new(), mcp_config_path: String::new() };
            let orchestrator = build_orchestrator(store, &cli.project_id, config, worker_invocation, Vec::new());
            match orchestrator.resume() {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(error = %e, "resume failed");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Stop => {
            let worker_invocation = WorkerInvocation { model: String::new(), mcp_config_path: String::new() };
            let orchestrator = build_orchestrator(store, &cli.project_id, config, worker_invocation, Vec::new());
            match orchestrator.stop().await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(error = %e, "stop failed");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Status => {
            let worker_invocation = WorkerInvocation { model: String::new(), mcp_config_path: String::new() };
            let orchestrator = build_orchestrator(store, &cli.project_id, config, worker_invocation, Vec::new());
            match orchestrator.load_state() {
                Ok(Some(state)) => {
                    println!("{}", serde_json::to_string_pretty(&state).unwrap());
                    ExitCode::SUCCESS
                }
                Ok(None) => {
                    println!("{{}}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(error = %e, "status failed");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
