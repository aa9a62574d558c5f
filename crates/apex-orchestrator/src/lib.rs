//! Module H — the Orchestrator: the five-stage PLAN/CONSTRUCT/INVOKE/
//! MONITOR/INTEGRATE control loop, its persistent state, and the
//! pause/resume/stop control surface (spec §4.H — "the hard part").

pub mod invocation;
pub mod session;
pub mod state;

pub use invocation::{UtilityScripts, WorkerInvocation};
pub use session::SessionMetadata;
pub use state::{ActiveTask, Metrics, OrchestratorEvent, Stage, SupervisorState};

use std::sync::Arc;

use apex_briefing::{BriefingStatus, BriefingStore, TaskBriefing};
use apex_briefing::generator::{BriefingGenerator, GeneratorInputs, TaskSpec, TaskType};
use apex_dispatch::{Complexity, Dispatcher, Executor, TaskFeatures, UtilityCatalog};
use apex_planner::Planner;
use apex_process::{ProcessKind, ProcessManager, ProcessStatus, TaggedStreamEvent};
use apex_shared::config::ApexConfig;
use apex_shared::error::{ApexError, ApexResult, ErrorRecord};
use apex_store::StoreHandle;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

fn step_name_to_task_type(step_name: &str) -> TaskType {
    let base = step_name.strip_suffix("_retry").unwrap_or(step_name);
    match base {
        "investigation" => TaskType::Investigation,
        "bug_fix" => TaskType::BugFix,
        "verification" => TaskType::Verification,
        "research" => TaskType::Research,
        "implementation" => TaskType::Implementation,
        "testing" => TaskType::Testing,
        "analysis" => TaskType::Analysis,
        "review" => TaskType::Review,
        _ => TaskType::Implementation,
    }
}

fn task_features(briefing: &TaskBriefing, task_type: TaskType) -> TaskFeatures {
    let complexity = briefing
        .constraints
        .get("complexity")
        .and_then(|v| v.as_str())
        .map(|s| match s {
            "low" => Complexity::Low,
            "high" => Complexity::High,
            _ => Complexity::Medium,
        })
        .unwrap_or(Complexity::Medium);

    TaskFeatures {
        keywords: briefing
            .objective
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| !w.is_empty())
            .collect(),
        task_type: format!("{task_type:?}").to_lowercase(),
        complexity,
    }
}

/// Module H — owns `SupervisorState`, the task-graph/briefing
/// components it drives, and the Process Manager it spawns against.
pub struct Orchestrator {
    store: StoreHandle,
    project_id: String,
    config: ApexConfig,
    process_manager: Arc<ProcessManager>,
    planner: Planner,
    dispatcher: Dispatcher,
    generator: BriefingGenerator,
    worker_invocation: WorkerInvocation,
    utility_catalog: UtilityCatalog,
    utility_scripts: UtilityScripts,
    session_id: Uuid,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl Orchestrator {
    /// `stream_events` is the receiving half of the channel the caller
    /// attached to `process_manager` via `ProcessManager::with_stream_sink`
    /// before wrapping it in an `Arc` — the Orchestrator spawns a
    /// detached task that assigns each arriving event the next
    /// per-session sequence number and persists it at
    /// `agents/events/{sid}/{seq}` (spec §4.C, data-model invariant 5),
    /// independent of this Orchestrator's own tick cadence.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: StoreHandle,
        project_id: impl Into<String>,
        config: ApexConfig,
        process_manager: Arc<ProcessManager>,
        worker_invocation: WorkerInvocation,
        utility_catalog: UtilityCatalog,
        utility_scripts: UtilityScripts,
        stream_events: mpsc::UnboundedReceiver<TaggedStreamEvent>,
    ) -> Self {
        let project_id = project_id.into();
        let session_id = Uuid::new_v4();
        tokio::spawn(session::run_session_event_writer(
            store.clone(),
            project_id.clone(),
            session_id,
            stream_events,
        ));
        Self {
            planner: Planner::new(store.clone(), project_id.clone()),
            dispatcher: Dispatcher::new(store.clone(), project_id.clone()),
            generator: BriefingGenerator::new(),
            store,
            project_id,
            config,
            process_manager,
            worker_invocation,
            utility_catalog,
            utility_scripts,
            session_id,
        }
    }

    /// The session id this Orchestrator's stream-event writer is
    /// persisting under (`agents/events/{sid}/{seq}`, `sessions/{sid}/metadata`).
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn state_key(&self) -> String {
        format!("projects/{}/supervisor/state", self.project_id)
    }

    fn briefings(&self) -> BriefingStore {
        BriefingStore::new(self.store.clone(), self.project_id.clone())
    }

    /// Builds an `ErrorRecord` for a stage failure and persists it at
    /// `errors/{err_id}/context` (spec §7). Best-effort: a failure to
    /// persist the record is logged, not propagated, since the
    /// original error `e` is already being returned to the caller.
    fn record_error(&self, operation: &str, err: &ApexError, now: DateTime<Utc>) {
        let record = ErrorRecord::new("orchestrator", operation, err, now);
        let key = format!("errors/{}/context", record.err_id);
        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                if let Err(e) = self.store.write(&key, &bytes) {
                    warn!(err_id = %record.err_id, error = %e, "failed to persist error record");
                }
            }
            Err(e) => warn!(err_id = %record.err_id, error = %e, "failed to serialize error record"),
        }
    }

    pub fn load_state(&self) -> ApexResult<Option<SupervisorState>> {
        match self.store.read(&self.state_key())? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map(Some).map_err(|e| ApexError::InvalidInput(e.to_string()))
            }
            None => Ok(None),
        }
    }

    fn persist_state(&self, state: &SupervisorState) -> ApexResult<()> {
        let bytes = serde_json::to_vec(state).map_err(|e| ApexError::InvalidInput(e.to_string()))?;
        self.store.write(&self.state_key(), &bytes)
    }

    pub fn pause(&self) -> ApexResult<()> {
        let mut state = self.load_state()?.ok_or_else(|| ApexError::NotFound("supervisor state".into()))?;
        state.paused = true;
        self.persist_state(&state)
    }

    pub fn resume(&self) -> ApexResult<()> {
        let mut state = self.load_state()?.ok_or_else(|| ApexError::NotFound("supervisor state".into()))?;
        state.paused = false;
        self.persist_state(&state)
    }

    /// Sets `stop_requested`, terminates every active process, flushes
    /// the final state row (spec §4.H).
    pub async fn stop(&self) -> ApexResult<()> {
        let mut state = self.load_state()?.unwrap_or_else(|| SupervisorState::new(""));
        state.stop_requested = true;
        for active in &state.active {
            self.process_manager.terminate(active.process_id).await?;
        }
        self.persist_state(&state)
    }

    /// Runs ticks until `IDLE`, `stop_requested`, or the configured
    /// tick safety cap is reached (spec §4.H's scheduling model).
    pub async fn run(&self, goal: &str, now_fn: impl Fn() -> DateTime<Utc>) -> ApexResult<SupervisorState> {
        let mut state = self.load_state()?.unwrap_or_else(|| SupervisorState::new(goal));
        state.goal = goal.to_string();

        while !state.is_idle()
            && !state.stop_requested
            && state.tick_count < self.config.retry.max_ticks_per_orchestration
        {
            state = self.tick(state, now_fn()).await?;
        }
        Ok(state)
    }

    /// One PLAN→CONSTRUCT→INVOKE→MONITOR→INTEGRATE pass (spec §4.H).
    pub async fn tick(&self, mut state: SupervisorState, now: DateTime<Utc>) -> ApexResult<SupervisorState> {
        if state.paused {
            return Ok(state);
        }
        state.tick_count += 1;
        state.metrics.ticks_run += 1;

        let plan_result = self.stage_plan(&mut state, now);
        let graph = match plan_result {
            Ok(None) => {
                self.persist_state(&state)?;
                return Ok(state);
            }
            Ok(Some(graph)) => graph,
            Err(e) => {
                self.record_error("stage_plan", &e, now);
                state.record(OrchestratorEvent::ErrorOccurred { message: e.to_string(), at: now });
                self.persist_state(&state)?;
                return Err(e);
            }
        };

        if let Err(e) = self.stage_construct(&mut state, &graph, now) {
            self.record_error("stage_construct", &e, now);
            state.record(OrchestratorEvent::ErrorOccurred { message: e.to_string(), at: now });
            self.persist_state(&state)?;
            return Err(e);
        }

        if let Err(e) = self.stage_invoke(&mut state, now).await {
            self.record_error("stage_invoke", &e, now);
            state.record(OrchestratorEvent::ErrorOccurred { message: e.to_string(), at: now });
            self.persist_state(&state)?;
            return Err(e);
        }

        let (newly_completed, newly_failed) = self.stage_monitor(&mut state);

        if let Err(e) = self.stage_integrate(&mut state, newly_completed, newly_failed, now) {
            self.record_error("stage_integrate", &e, now);
            state.record(OrchestratorEvent::ErrorOccurred { message: e.to_string(), at: now });
            self.persist_state(&state)?;
            return Err(e);
        }

        self.persist_state(&state)?;
        Ok(state)
    }

    /// Returns `Ok(None)` when the completion predicate holds and the
    /// Orchestrator has entered `IDLE` (spec §9, Open Question a: the
    /// threshold is `ApexConfig::completion_threshold`, default 0.9).
    fn stage_plan(
        &self,
        state: &mut SupervisorState,
        now: DateTime<Utc>,
    ) -> ApexResult<Option<apex_planner::TaskGraph>> {
        state.stage = Stage::Plan;
        let existing_graph = self.load_graph_quietly().ok();

        if let Some(graph) = &existing_graph {
            let total = graph.tasks.len().max(1);
            let fraction_complete = state.completed.len() as f64 / total as f64;
            if fraction_complete >= self.config.completion_threshold && state.active.is_empty() {
                state.stage = Stage::Idle;
                info!(project_id = %self.project_id, fraction_complete, "orchestration complete, entering IDLE");
                return Ok(None);
            }
        }

        let permanently_failed: Vec<String> = {
            let briefings = self.briefings();
            state
                .failed
                .iter()
                .filter(|tid| {
                    briefings
                        .get(tid)
                        .map(|b| b.retry_count >= self.config.retry.max_task_retries)
                        .unwrap_or(false)
                })
                .cloned()
                .collect()
        };

        let previously_known: std::collections::HashSet<String> = existing_graph
            .as_ref()
            .map(|g| g.tasks.iter().map(|t| t.task_id.clone()).collect())
            .unwrap_or_default();

        let graph = if existing_graph.is_some() {
            self.planner.update(&state.goal, &state.completed, &permanently_failed, now)?
        } else {
            self.planner.plan(&state.goal, now)?
        };

        for task in &graph.tasks {
            if !previously_known.contains(&task.task_id) {
                state.record(OrchestratorEvent::TaskCreated { task_id: task.task_id.clone(), at: now });
                state.metrics.tasks_created += 1;
            }
        }

        Ok(Some(graph))
    }

    fn load_graph_quietly(&self) -> ApexResult<apex_planner::TaskGraph> {
        let key = format!("projects/{}/supervisor/task_graph", self.project_id);
        let bytes = self.store.read(&key)?.ok_or_else(|| ApexError::NotFound("task graph".into()))?;
        serde_json::from_slice(&bytes).map_err(|e| ApexError::InvalidInput(e.to_string()))
    }

    /// For each ready task, up to the free worker slots, enriches its
    /// skeletal briefing via the Briefing Generator (spec §4.H step
    /// 2). The Planner already wrote a skeletal `pending_invocation`
    /// briefing per task; this fills in context pointers,
    /// deliverables, and quality criteria without changing status, a
    /// legal (from == to) transition under the Briefing Store's rules.
    fn stage_construct(
        &self,
        state: &mut SupervisorState,
        graph: &apex_planner::TaskGraph,
        now: DateTime<Utc>,
    ) -> ApexResult<()> {
        state.stage = Stage::Construct;
        let briefings = self.briefings();
        let free_slots = self.free_worker_slots(state);

        let ready = briefings.ready(&state.completed)?;
        for briefing in ready.into_iter().take(free_slots) {
            let Some(planned) = graph.tasks.iter().find(|t| t.task_id == briefing.task_id) else {
                continue;
            };
            let task_type = step_name_to_task_type(&planned.step_name);
            let spec = TaskSpec {
                task_id: briefing.task_id.clone(),
                description: briefing.objective.clone(),
                role: briefing.role_required,
                task_type,
                priority: briefing.priority,
                dependencies: briefing.dependencies.clone(),
                constraints: briefing.constraints.clone(),
            };
            let enriched = self.generator.generate(&spec, &GeneratorInputs::default(), now);

            let mut updated = briefing;
            updated.context_pointers.extend(enriched.context_pointers);
            updated.deliverables = enriched.deliverables;
            updated.quality_criteria = enriched.quality_criteria;
            briefings.update(updated, now)?;
        }
        Ok(())
    }

    fn free_worker_slots(&self, state: &SupervisorState) -> usize {
        let active_workers = state.active.iter().filter(|a| a.kind == ProcessKind::Worker).count();
        (self.config.concurrency.max_workers as usize).saturating_sub(active_workers)
    }

    /// For each ready briefing, decides worker-vs-utility (spec
    /// §4.J), spawns the chosen process, and moves the briefing to
    /// `in_progress`. Stops when a concurrency cap is hit.
    async fn stage_invoke(&self, state: &mut SupervisorState, now: DateTime<Utc>) -> ApexResult<()> {
        state.stage = Stage::Invoke;
        let briefings = self.briefings();
        let ready = briefings.ready(&state.completed)?;

        for briefing in ready {
            let key = format!("projects/{}/tasks/briefings/{}", self.project_id, briefing.task_id);
            let graph = self.load_graph_quietly().ok();
            let task_type = graph
                .as_ref()
                .and_then(|g| g.tasks.iter().find(|t| t.task_id == briefing.task_id))
                .map(|t| step_name_to_task_type(&t.step_name))
                .unwrap_or(TaskType::Implementation);
            let features = task_features(&briefing, task_type);

            let decision = self.dispatcher.decide(&briefing.task_id, &features, &self.utility_catalog, now)?;

            let spawn_result = match decision.executor {
                Executor::Worker => {
                    let command = self.worker_invocation.command_for(&key, briefing.role_required);
                    self.process_manager
                        .spawn(
                            ProcessKind::Worker,
                            &briefing.task_id,
                            Some(format!("{:?}", briefing.role_required)),
                            command,
                        )
                        .await
                }
                Executor::Utility => {
                    let utility_name = decision.utility_name.as_deref().unwrap_or_default();
                    let store_path = self.store.path().display().to_string();
                    match self.utility_scripts.command_for(utility_name, &briefing.task_id, &key, &store_path) {
                        Some(command) => {
                            self.process_manager
                                .spawn(ProcessKind::Utility, &briefing.task_id, None, command)
                                .await
                        }
                        None => {
                            let command = self.worker_invocation.command_for(&key, briefing.role_required);
                            self.process_manager
                                .spawn(
                                    ProcessKind::Worker,
                                    &briefing.task_id,
                                    Some(format!("{:?}", briefing.role_required)),
                                    command,
                                )
                                .await
                        }
                    }
                }
            };

            match spawn_result {
                Ok(record) => {
                    let mut in_progress = briefing;
                    in_progress.status = BriefingStatus::InProgress;
                    in_progress.started_at = Some(now);
                    briefings.update(in_progress, now)?;

                    state.record(OrchestratorEvent::TaskStarted {
                        task_id: record.task_id.clone(),
                        process_id: record.process_id,
                        at: now,
                    });
                    state.metrics.tasks_started += 1;
                    state.active.push(ActiveTask {
                        task_id: record.task_id,
                        process_id: record.process_id,
                        kind: record.kind,
                        started_at: now,
                    });
                }
                Err(ApexError::ResourceExhausted(_)) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Polls every active process; returns (newly-completed,
    /// newly-failed) task ids for Integrate to act on (spec §4.H
    /// step 4).
    fn stage_monitor(&self, state: &mut SupervisorState) -> (Vec<String>, Vec<String>) {
        state.stage = Stage::Monitor;
        let mut newly_completed = Vec::new();
        let mut newly_failed = Vec::new();
        let mut still_active = Vec::new();

        for active in std::mem::take(&mut state.active) {
            match self.process_manager.check_status(active.process_id) {
                Ok(record) if record.status.is_terminal() => {
                    if record.status == ProcessStatus::Completed && record.exit_code == Some(0) {
                        newly_completed.push(active.task_id.clone());
                    } else {
                        newly_failed.push(active.task_id.clone());
                    }
                }
                Ok(_) => still_active.push(active),
                Err(e) => {
                    warn!(task_id = %active.task_id, error = %e, "lost track of active process");
                    newly_failed.push(active.task_id.clone());
                }
            }
        }
        state.active = still_active;
        (newly_completed, newly_failed)
    }

    /// Validates deliverables for tentatively-completed tasks,
    /// applies the retry policy to failed ones, and persists the
    /// final state (spec §4.H step 5).
    fn stage_integrate(
        &self,
        state: &mut SupervisorState,
        newly_completed: Vec<String>,
        newly_failed: Vec<String>,
        now: DateTime<Utc>,
    ) -> ApexResult<()> {
        state.stage = Stage::Integrate;
        let briefings = self.briefings();
        let mut demoted = Vec::new();

        for task_id in newly_completed {
            let briefing = briefings.get(&task_id)?;
            let all_present = briefing
                .deliverables
                .iter()
                .filter(|d| d.required)
                .all(|d| self.store.read(&d.output_key).ok().flatten().is_some());

            if all_present {
                let mut done = briefing;
                done.status = BriefingStatus::Completed;
                done.completed_at = Some(now);
                briefings.update(done, now)?;
                state.completed.push(task_id.clone());
                state.metrics.tasks_completed += 1;
                state.record(OrchestratorEvent::TaskCompleted { task_id, at: now });
            } else {
                demoted.push(task_id);
            }
        }

        for task_id in newly_failed.into_iter().chain(demoted) {
            let mut briefing = briefings.get(&task_id)?;
            briefing.status = BriefingStatus::Failed;
            briefing.failed_at = Some(now);
            briefings.update(briefing.clone(), now)?;

            if briefing.retry_count < self.config.retry.max_task_retries {
                briefing.status = BriefingStatus::PendingInvocation;
                briefing.retry_count += 1;
                briefings.update(briefing, now)?;
            } else {
                state.failed.push(task_id.clone());
                state.metrics.tasks_failed += 1;
                state.record(OrchestratorEvent::TaskFailed {
                    task_id,
                    reason: "exceeded max_task_retries".to_string(),
                    at: now,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_process::testing::{FakeBehavior, FakeLauncher};
    use apex_process::ProcessManagerConfig;
    use chrono::TimeZone;
    use std::time::Duration;

    fn harness(config: ApexConfig, launcher: FakeLauncher) -> (Orchestrator, StoreHandle, tempfile::TempDir) {
        let (store, dir) = StoreHandle::open_temporary().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let process_manager = Arc::new(
            ProcessManager::new(Arc::new(launcher), ProcessManagerConfig::default()).with_stream_sink(tx),
        );
        let worker_invocation = WorkerInvocation {
            model: "test-model".into(),
            mcp_config_path: "/tmp/.mcp.json".into(),
        };
        let orchestrator = Orchestrator::new(
            store.clone(),
            "proj-1",
            config,
            process_manager,
            worker_invocation,
            UtilityCatalog::default(),
            UtilityScripts::default(),
            rx,
        );
        (orchestrator, store, dir)
    }

    /// Simulates every in-progress worker "finishing its work" by
    /// writing its required deliverables, so Integrate's validation
    /// passes without a real `claude` subprocess involved.
    fn fulfil_in_progress_deliverables(store: &StoreHandle, project_id: &str) {
        let briefings = BriefingStore::new(store.clone(), project_id);
        for entry in briefings.list(Some(BriefingStatus::InProgress), None).unwrap() {
            let briefing = briefings.get(&entry.task_id).unwrap();
            for deliverable in &briefing.deliverables {
                store.write(&deliverable.output_key, b"done").unwrap();
            }
        }
    }

    #[tokio::test]
    async fn happy_path_drives_a_bug_fix_goal_to_idle() {
        let (orchestrator, store, _dir) = harness(ApexConfig::default(), FakeLauncher::new());
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap();
        let mut state = SupervisorState::new("fix the authentication bug");

        for _ in 0..20 {
            state = orchestrator.tick(state, now).await.unwrap();
            if state.is_idle() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
            fulfil_in_progress_deliverables(&store, "proj-1");
        }

        assert!(state.is_idle(), "expected idle, stage was {:?}", state.stage);
        assert_eq!(state.completed.len(), 3);
        assert!(state.failed.is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_land_a_task_in_failed() {
        let mut config = ApexConfig::default();
        config.retry.max_task_retries = 0;
        let launcher = FakeLauncher::new().with_behavior("-p", FakeBehavior::ExitImmediately(1));
        let (orchestrator, store, _dir) = harness(config, launcher);
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap();
        let mut state = SupervisorState::new("fix the authentication bug");

        for _ in 0..10 {
            state = orchestrator.tick(state, now).await.unwrap();
            if !state.failed.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
            fulfil_in_progress_deliverables(&store, "proj-1");
        }

        assert_eq!(state.failed.len(), 1);
        assert!(state
            .events
            .iter()
            .any(|e| matches!(e, OrchestratorEvent::TaskFailed { .. })));
    }

    #[tokio::test]
    async fn paused_orchestrator_does_not_advance_stage() {
        let (orchestrator, _store, _dir) = harness(ApexConfig::default(), FakeLauncher::new());
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap();
        let mut state = SupervisorState::new("fix the authentication bug");
        state.paused = true;
        let before = state.tick_count;

        state = orchestrator.tick(state, now).await.unwrap();

        assert_eq!(state.tick_count, before);
        assert_eq!(state.stage, Stage::Plan);
    }

    #[tokio::test]
    async fn stop_terminates_active_processes_and_sets_flag() {
        let launcher = FakeLauncher::new().with_behavior("-p", FakeBehavior::SleepThenExit(Duration::from_secs(30), 0));
        let (orchestrator, _store, _dir) = harness(ApexConfig::default(), launcher);
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap();
        let state = orchestrator.tick(SupervisorState::new("fix the authentication bug"), now).await.unwrap();
        assert_eq!(state.active.len(), 1);
        orchestrator.persist_state(&state).unwrap();

        orchestrator.stop().await.unwrap();

        let stopped = orchestrator.load_state().unwrap().unwrap();
        assert!(stopped.stop_requested);
    }

    #[tokio::test]
    async fn stage_error_persists_a_readable_error_record() {
        let (orchestrator, store, _dir) = harness(ApexConfig::default(), FakeLauncher::new());
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap();
        let err = ApexError::InvalidInput("bad goal".to_string());

        orchestrator.record_error("stage_plan", &err, now);

        let keys = store.list_keys("errors/").unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].ends_with("/context"));
        let bytes = store.read(&keys[0]).unwrap().unwrap();
        let record: ErrorRecord = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(record.component, "orchestrator");
        assert_eq!(record.operation, "stage_plan");
        assert!(!record.resolved);
    }
}
