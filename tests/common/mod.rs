//! Shared harness for the end-to-end scenario and invariant tests:
//! an `Orchestrator` wired to a temporary on-disk store and a
//! scripted process launcher, so no real `claude`/`python` binary is
//! ever spawned.

use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use apex_briefing::{BriefingStatus, BriefingStore};
use apex_orchestrator::{Orchestrator, UtilityScripts, WorkerInvocation};
use apex_process::testing::FakeLauncher;
use apex_process::{CommandSpec, Launcher, ProcessManager, ProcessManagerConfig};
use apex_shared::config::ApexConfig;
use apex_store::StoreHandle;
use async_trait::async_trait;
use tokio::process::{Child, Command};

pub const PROJECT_ID: &str = "proj-1";

/// Builds an `Orchestrator` over a temporary store, `config`, and
/// whatever `launcher` the scenario needs. Returns the store and
/// tempdir too, since most scenarios need to inspect or reopen the
/// same backing store directly.
pub fn harness(
    config: ApexConfig,
    launcher: Arc<dyn Launcher>,
) -> (Orchestrator, StoreHandle, tempfile::TempDir) {
    let (store, dir) = StoreHandle::open_temporary().unwrap();
    (build_on(store.clone(), config, launcher), store, dir)
}

/// Builds a second `Orchestrator` against an already-open store, for
/// scenarios that simulate a process restart against the same data.
pub fn build_on(store: StoreHandle, config: ApexConfig, launcher: Arc<dyn Launcher>) -> Orchestrator {
    let process_config = ProcessManagerConfig {
        max_workers: config.concurrency.max_workers,
        max_utilities: config.concurrency.max_utilities,
        worker_timeout: std::time::Duration::from_secs(config.timeouts.worker_seconds),
        utility_timeout: std::time::Duration::from_secs(config.timeouts.utility_seconds),
        terminate_grace: std::time::Duration::from_secs(config.timeouts.terminate_grace_seconds),
    };
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let process_manager = Arc::new(ProcessManager::new(launcher, process_config).with_stream_sink(tx));
    let worker_invocation = WorkerInvocation {
        model: "test-model".into(),
        mcp_config_path: "/tmp/.mcp.json".into(),
    };
    Orchestrator::new(
        store,
        PROJECT_ID,
        config,
        process_manager,
        worker_invocation,
        Default::default(),
        UtilityScripts::default(),
        rx,
    )
}

/// Simulates every in-progress worker "finishing its work" by writing
/// its required deliverables, so Integrate's validation passes
/// without a real subprocess having done anything.
pub fn fulfil_in_progress_deliverables(store: &StoreHandle, project_id: &str) {
    let briefings = BriefingStore::new(store.clone(), project_id);
    for entry in briefings.list(Some(BriefingStatus::InProgress), None).unwrap() {
        let briefing = briefings.get(&entry.task_id).unwrap();
        for deliverable in &briefing.deliverables {
            store.write(&deliverable.output_key, b"done").unwrap();
        }
    }
}

/// A launcher that fails every invocation whose prompt names
/// `target_step` until `failures_remaining` drops to zero, then
/// succeeds — used to script the retry/permanent-failure scenarios,
/// which need one specific task's worker to misbehave while its
/// siblings succeed (`FakeLauncher`'s single shared `"-p"` key can't
/// express that).
#[derive(Debug)]
pub struct FlakyStepLauncher {
    target_step: String,
    failures_remaining: AtomicU32,
}

impl FlakyStepLauncher {
    pub fn new(target_step: impl Into<String>, failures: u32) -> Self {
        Self {
            target_step: target_step.into(),
            failures_remaining: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl Launcher for FlakyStepLauncher {
    async fn spawn(&self, spec: &CommandSpec) -> std::io::Result<Child> {
        let prompt = spec.args.get(1).cloned().unwrap_or_default();
        let should_fail = prompt.contains(&self.target_step)
            && self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        let exit_code = if should_fail { 1 } else { 0 };
        Command::new("sh")
            .arg("-c")
            .arg(format!("exit {exit_code}"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
    }
}

/// A launcher whose worker invocations sleep past any reasonable
/// timeout, for the timeout scenario.
pub fn sleepy_launcher(seconds: u64) -> FakeLauncher {
    FakeLauncher::new().with_behavior(
        "-p",
        apex_process::testing::FakeBehavior::SleepThenExit(
            std::time::Duration::from_secs(seconds),
            0,
        ),
    )
}
