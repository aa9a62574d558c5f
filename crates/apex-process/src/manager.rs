use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apex_shared::error::{ApexError, ApexResult};
use apex_stream::StreamParser;
use chrono::Utc;
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::timeout as tokio_timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::command::{CommandSpec, Launcher};
use crate::record::{ProcessKind, ProcessRecord, ProcessStatus};

const TAIL_CAPACITY: usize = 100;

/// Configuration for [`ProcessManager`] — concurrency caps and
/// timeouts, straight from spec §4.D / §5.
#[derive(Debug, Clone, Copy)]
pub struct ProcessManagerConfig {
    pub max_workers: u32,
    pub max_utilities: u32,
    pub worker_timeout: Duration,
    pub utility_timeout: Duration,
    pub terminate_grace: Duration,
}

impl Default for ProcessManagerConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            max_utilities: 5,
            worker_timeout: Duration::from_secs(1800),
            utility_timeout: Duration::from_secs(600),
            terminate_grace: Duration::from_secs(5),
        }
    }
}

/// A parsed stream event tagged with the process it came from, handed
/// to whoever the caller wired up as the event sink (normally the
/// Orchestrator's session event writer). Kept decoupled from
/// `apex-store` here — the Process Manager only knows how to produce
/// events, not where session sequence numbers live.
#[derive(Debug, Clone)]
pub struct TaggedStreamEvent {
    pub process_id: Uuid,
    pub task_id: String,
    pub event: apex_stream::StreamEvent,
}

struct ActiveProcess {
    record: Arc<std::sync::Mutex<ProcessRecord>>,
    child: Arc<AsyncMutex<Option<Child>>>,
    desired_running: Arc<AtomicBool>,
    command: CommandSpec,
    kind: ProcessKind,
}

/// Module D — spawns, tracks, monitors, times out, and restarts
/// worker and utility subprocesses (spec §4.D).
pub struct ProcessManager {
    launcher: Arc<dyn Launcher>,
    config: ProcessManagerConfig,
    active: Arc<DashMap<Uuid, ActiveProcess>>,
    worker_count: Arc<AtomicU32>,
    utility_count: Arc<AtomicU32>,
    stream_sink: Option<mpsc::UnboundedSender<TaggedStreamEvent>>,
}

impl std::fmt::Debug for ProcessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessManager")
            .field("active_count", &self.active.len())
            .finish()
    }
}

impl ProcessManager {
    pub fn new(launcher: Arc<dyn Launcher>, config: ProcessManagerConfig) -> Self {
        Self {
            launcher,
            config,
            active: Arc::new(DashMap::new()),
            worker_count: Arc::new(AtomicU32::new(0)),
            utility_count: Arc::new(AtomicU32::new(0)),
            stream_sink: None,
        }
    }

    /// Attach a channel that receives every parsed stdout event from
    /// every spawned worker, independent of the Orchestrator's poll
    /// cadence (spec §4.C's ordering note, §9's async-boundary note).
    pub fn with_stream_sink(mut self, sink: mpsc::UnboundedSender<TaggedStreamEvent>) -> Self {
        self.stream_sink = Some(sink);
        self
    }

    fn count_for(&self, kind: ProcessKind) -> u32 {
        match kind {
            ProcessKind::Worker => self.worker_count.load(Ordering::SeqCst),
            ProcessKind::Utility => self.utility_count.load(Ordering::SeqCst),
        }
    }

    fn cap_for(&self, kind: ProcessKind) -> u32 {
        match kind {
            ProcessKind::Worker => self.config.max_workers,
            ProcessKind::Utility => self.config.max_utilities,
        }
    }

    fn timeout_for(&self, kind: ProcessKind) -> Duration {
        match kind {
            ProcessKind::Worker => self.config.worker_timeout,
            ProcessKind::Utility => self.config.utility_timeout,
        }
    }

    /// Spawn a worker or utility subprocess. Refuses with
    /// `ResourceExhausted` once the per-kind concurrency cap (spec
    /// §4.D, §5) is reached.
    pub async fn spawn(
        &self,
        kind: ProcessKind,
        task_id: &str,
        role: Option<String>,
        command: CommandSpec,
    ) -> ApexResult<ProcessRecord> {
        if self.count_for(kind) >= self.cap_for(kind) {
            return Err(ApexError::ResourceExhausted(format!(
                "{kind:?} concurrency cap ({}) reached",
                self.cap_for(kind)
            )));
        }

        let process_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut record = ProcessRecord::new(
            process_id,
            kind,
            task_id.to_string(),
            role,
            &command,
            started_at,
        );

        let mut child = self
            .launcher
            .spawn(&command)
            .await
            .map_err(|e| ApexError::SubprocessFailure(e.to_string()))?;

        record.pid = child.id();
        record.status = ProcessStatus::Running;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        match kind {
            ProcessKind::Worker => self.worker_count.fetch_add(1, Ordering::SeqCst),
            ProcessKind::Utility => self.utility_count.fetch_add(1, Ordering::SeqCst),
        };

        let record_handle = Arc::new(std::sync::Mutex::new(record.clone()));
        let child_handle = Arc::new(AsyncMutex::new(Some(child)));

        self.active.insert(
            process_id,
            ActiveProcess {
                record: record_handle.clone(),
                child: child_handle.clone(),
                desired_running: Arc::new(AtomicBool::new(false)),
                command: command.clone(),
                kind,
            },
        );

        if let Some(stdout) = stdout {
            spawn_tail_reader(
                record_handle.clone(),
                stdout,
                TailTarget::Stdout,
                self.stream_sink.clone(),
                process_id,
                task_id.to_string(),
            );
        }
        if let Some(stderr) = stderr {
            spawn_tail_reader(
                record_handle.clone(),
                stderr,
                TailTarget::Stderr,
                None,
                process_id,
                task_id.to_string(),
            );
        }

        let deadline = self.timeout_for(kind);
        let grace = self.config.terminate_grace;
        let active = self.active.clone();
        let worker_count = self.worker_count.clone();
        let utility_count = self.utility_count.clone();

        tokio::spawn(async move {
            monitor_process(
                process_id,
                kind,
                record_handle,
                child_handle,
                deadline,
                grace,
                active,
                worker_count,
                utility_count,
            )
            .await;
        });

        Ok(record)
    }

    /// Current snapshot of one process.
    pub fn check_status(&self, process_id: Uuid) -> ApexResult<ProcessRecord> {
        let entry = self
            .active
            .get(&process_id)
            .ok_or_else(|| ApexError::NotFound(format!("process {process_id}")))?;
        Ok(entry.record.lock().unwrap().clone())
    }

    /// Idempotent: closes stdin to ask the child to exit gracefully,
    /// waits `terminate_grace`, then force-kills (spec §4.D, §5).
    pub async fn terminate(&self, process_id: Uuid) -> ApexResult<()> {
        let Some(entry) = self.active.get(&process_id) else {
            return Ok(()); // already gone: idempotent no-op
        };
        let child_handle = entry.child.clone();
        let grace = self.config.terminate_grace;
        drop(entry);
        terminate_child(child_handle, grace).await
    }

    pub fn list_active(&self) -> Vec<ProcessRecord> {
        self.active
            .iter()
            .filter(|e| !e.record.lock().unwrap().status.is_terminal())
            .map(|e| e.record.lock().unwrap().clone())
            .collect()
    }

    pub fn get_output(&self, process_id: Uuid) -> ApexResult<(Vec<String>, Vec<String>)> {
        let record = self.check_status(process_id)?;
        Ok((record.captured_stdout_tail, record.captured_stderr_tail))
    }

    /// Enable the restart-monitor for a process already spawned.
    /// Disabled by default for one-shot worker processes (spec §9,
    /// Open Question b) — callers that need a long-lived supervised
    /// process (not task workers/utilities) opt in explicitly here.
    pub fn set_desired_running(&self, process_id: Uuid, desired: bool) {
        if let Some(entry) = self.active.get(&process_id) {
            entry.desired_running.store(desired, Ordering::SeqCst);
        }
    }

    /// Background task that restarts any process whose
    /// `desired_running` flag is true but whose observed status is
    /// terminal, at the configured tick (spec §4.D).
    pub fn start_restart_monitor(self: &Arc<Self>, tick: Duration) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut restart_counts: std::collections::HashMap<Uuid, u32> = Default::default();
            loop {
                tokio::time::sleep(tick).await;
                let due_for_restart: Vec<(Uuid, ProcessKind, String, Option<String>, CommandSpec)> =
                    manager
                        .active
                        .iter()
                        .filter_map(|entry| {
                            let desired = entry.desired_running.load(Ordering::SeqCst);
                            let terminal = entry.record.lock().unwrap().status.is_terminal();
                            if desired && terminal {
                                let record = entry.record.lock().unwrap();
                                Some((
                                    *entry.key(),
                                    entry.kind,
                                    record.task_id.clone(),
                                    record.role.clone(),
                                    entry.command.clone(),
                                ))
                            } else {
                                None
                            }
                        })
                        .collect();

                for (old_id, kind, task_id, role, command) in due_for_restart {
                    manager.active.remove(&old_id);
                    match manager.spawn(kind, &task_id, role, command).await {
                        Ok(new_record) => {
                            let count = restart_counts.entry(old_id).or_insert(0);
                            *count += 1;
                            manager.set_desired_running(new_record.process_id, true);
                            info!(
                                old_process_id = %old_id,
                                new_process_id = %new_record.process_id,
                                restart_count = *count,
                                "restarted supervised process"
                            );
                        }
                        Err(e) => warn!(process_id = %old_id, error = %e, "restart failed"),
                    }
                }
            }
        })
    }
}

enum TailTarget {
    Stdout,
    Stderr,
}

fn spawn_tail_reader<R>(
    record: Arc<std::sync::Mutex<ProcessRecord>>,
    reader: R,
    target: TailTarget,
    stream_sink: Option<mpsc::UnboundedSender<TaggedStreamEvent>>,
    process_id: Uuid,
    task_id: String,
) where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut parser = StreamParser::new();
        while let Ok(Some(line)) = lines.next_line().await {
            {
                let mut rec = record.lock().unwrap();
                let tail = match target {
                    TailTarget::Stdout => &mut rec.captured_stdout_tail,
                    TailTarget::Stderr => &mut rec.captured_stderr_tail,
                };
                push_bounded(tail, line.clone());
            }
            if let (TailTarget::Stdout, Some(sink)) = (&target, &stream_sink) {
                for event in parser.feed(&format!("{line}\n")) {
                    let _ = sink.send(TaggedStreamEvent {
                        process_id,
                        task_id: task_id.clone(),
                        event,
                    });
                }
            }
        }
    });
}

fn push_bounded(tail: &mut Vec<String>, line: String) {
    if tail.len() >= TAIL_CAPACITY {
        tail.remove(0);
    }
    tail.push(line);
}

#[allow(clippy::too_many_arguments)]
async fn monitor_process(
    process_id: Uuid,
    kind: ProcessKind,
    record: Arc<std::sync::Mutex<ProcessRecord>>,
    child: Arc<AsyncMutex<Option<Child>>>,
    deadline: Duration,
    grace: Duration,
    active: Arc<DashMap<Uuid, ActiveProcess>>,
    worker_count: Arc<AtomicU32>,
    utility_count: Arc<AtomicU32>,
) {
    let wait_result = {
        let mut guard = child.lock().await;
        if let Some(child_ref) = guard.as_mut() {
            tokio_timeout(deadline, child_ref.wait()).await
        } else {
            return;
        }
    };

    let final_status = match wait_result {
        Ok(Ok(exit_status)) => {
            let mut rec = record.lock().unwrap();
            rec.exit_code = exit_status.code();
            rec.completed_at = Some(Utc::now());
            rec.status = if exit_status.success() {
                ProcessStatus::Completed
            } else {
                ProcessStatus::Failed
            };
            rec.status
        }
        Ok(Err(e)) => {
            warn!(process_id = %process_id, error = %e, "failed to wait on child process");
            let mut rec = record.lock().unwrap();
            rec.completed_at = Some(Utc::now());
            rec.status = ProcessStatus::Failed;
            rec.status
        }
        Err(_elapsed) => {
            warn!(process_id = %process_id, "process exceeded deadline, terminating");
            {
                let mut rec = record.lock().unwrap();
                rec.captured_stderr_tail
                    .push(format!("apex: monitor deadline of {deadline:?} elapsed"));
            }
            let _ = terminate_child(child.clone(), grace).await;
            let mut rec = record.lock().unwrap();
            rec.completed_at = Some(Utc::now());
            rec.status = ProcessStatus::Timeout;
            rec.status
        }
    };

    info!(process_id = %process_id, status = ?final_status, "process finished");

    match kind {
        ProcessKind::Worker => worker_count.fetch_sub(1, Ordering::SeqCst),
        ProcessKind::Utility => utility_count.fetch_sub(1, Ordering::SeqCst),
    };
    let _ = active; // entries are retained for ListActive/GetOutput until caller-driven cleanup
}

async fn terminate_child(child: Arc<AsyncMutex<Option<Child>>>, grace: Duration) -> ApexResult<()> {
    let mut guard = child.lock().await;
    let Some(child_ref) = guard.as_mut() else {
        return Ok(()); // already reaped: idempotent
    };

    if let Some(mut stdin) = child_ref.stdin.take() {
        let _ = stdin.shutdown().await;
    }

    match tokio_timeout(grace, child_ref.wait()).await {
        Ok(_) => Ok(()),
        Err(_elapsed) => child_ref
            .kill()
            .await
            .map_err(|e| ApexError::SubprocessFailure(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLauncher;
    use std::time::Duration as StdDuration;

    fn manager(config: ProcessManagerConfig) -> ProcessManager {
        ProcessManager::new(Arc::new(FakeLauncher::new()), config)
    }

    #[tokio::test]
    async fn spawn_and_observe_completion() {
        let mgr = manager(ProcessManagerConfig {
            max_workers: 3,
            max_utilities: 5,
            worker_timeout: StdDuration::from_secs(5),
            utility_timeout: StdDuration::from_secs(5),
            terminate_grace: StdDuration::from_millis(200),
        });
        let record = mgr
            .spawn(
                ProcessKind::Worker,
                "task-1",
                Some("Coder".into()),
                CommandSpec::new("fake").arg("exit-ok"),
            )
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(100)).await;
        let status = mgr.check_status(record.process_id).unwrap();
        assert_eq!(status.status, ProcessStatus::Completed);
    }

    #[tokio::test]
    async fn spawn_refuses_beyond_cap() {
        let mgr = manager(ProcessManagerConfig {
            max_workers: 1,
            max_utilities: 5,
            worker_timeout: StdDuration::from_secs(5),
            utility_timeout: StdDuration::from_secs(5),
            terminate_grace: StdDuration::from_millis(200),
        });
        mgr.spawn(
            ProcessKind::Worker,
            "task-1",
            None,
            CommandSpec::new("fake").arg("sleep-long"),
        )
        .await
        .unwrap();

        let second = mgr
            .spawn(
                ProcessKind::Worker,
                "task-2",
                None,
                CommandSpec::new("fake").arg("sleep-long"),
            )
            .await;
        assert!(matches!(second, Err(ApexError::ResourceExhausted(_))));
    }

    #[tokio::test]
    async fn timeout_results_in_timeout_status() {
        let mgr = manager(ProcessManagerConfig {
            max_workers: 3,
            max_utilities: 5,
            worker_timeout: StdDuration::from_millis(100),
            utility_timeout: StdDuration::from_secs(5),
            terminate_grace: StdDuration::from_millis(50),
        });
        let record = mgr
            .spawn(
                ProcessKind::Worker,
                "task-3",
                None,
                CommandSpec::new("fake").arg("sleep-long"),
            )
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(400)).await;
        let status = mgr.check_status(record.process_id).unwrap();
        assert_eq!(status.status, ProcessStatus::Timeout);
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let mgr = manager(ProcessManagerConfig::default());
        let record = mgr
            .spawn(
                ProcessKind::Worker,
                "task-4",
                None,
                CommandSpec::new("fake").arg("sleep-long"),
            )
            .await
            .unwrap();

        mgr.terminate(record.process_id).await.unwrap();
        mgr.terminate(record.process_id).await.unwrap();
    }
}
