//! Module F — turns a free-text goal into a 3-to-5 task graph using a
//! small fixed set of keyword-matched templates (spec §4.F).

use apex_briefing::{
    BriefingStatus, BriefingStore, Dependency, Priority, RequiredStatus, Role, TaskBriefing,
};
use apex_shared::error::{ApexError, ApexResult};
use apex_shared::ids::task_id;
use apex_store::StoreHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which of the three fixed templates matched the goal's keywords
/// (spec §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    BugFix,
    Implementation,
    Generic,
}

const BUG_FIX_KEYWORDS: &[&str] = &["fix", "bug", "error", "issue", "repair"];
const IMPLEMENTATION_KEYWORDS: &[&str] = &["implement", "add", "create", "build", "develop"];

const BUG_FIX_STEPS: &[(&str, Role, u32)] = &[
    ("investigation", Role::Adversary, 30),
    ("bug_fix", Role::Coder, 60),
    ("verification", Role::Adversary, 30),
];
const IMPLEMENTATION_STEPS: &[(&str, Role, u32)] = &[
    ("research", Role::Coder, 30),
    ("implementation", Role::Coder, 90),
    ("testing", Role::Adversary, 45),
];
const GENERIC_STEPS: &[(&str, Role, u32)] = &[
    ("analysis", Role::Coder, 30),
    ("implementation", Role::Coder, 90),
    ("review", Role::Adversary, 30),
];

fn classify(goal: &str) -> TemplateKind {
    let lowered = goal.to_lowercase();
    if BUG_FIX_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        TemplateKind::BugFix
    } else if IMPLEMENTATION_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        TemplateKind::Implementation
    } else {
        TemplateKind::Generic
    }
}

fn steps_for(template: TemplateKind) -> &'static [(&'static str, Role, u32)] {
    match template {
        TemplateKind::BugFix => BUG_FIX_STEPS,
        TemplateKind::Implementation => IMPLEMENTATION_STEPS,
        TemplateKind::Generic => GENERIC_STEPS,
    }
}

/// One node of the task graph: a step, its role and estimated
/// duration, and the predecessor it depends on (spec §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTask {
    pub task_id: String,
    pub step_name: String,
    pub role: Role,
    pub duration_minutes: u32,
    pub depends_on: Option<String>,
}

/// The ordered task graph produced for one goal, persisted at
/// `projects/{pid}/supervisor/task_graph` (spec §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGraph {
    pub goal: String,
    pub template: TemplateKind,
    pub tasks: Vec<PlannedTask>,
}

/// Module F — builds and revises task graphs, persisting both the
/// graph and a skeletal `pending_invocation` briefing per task (spec
/// §4.F).
#[derive(Debug, Clone)]
pub struct Planner {
    store: StoreHandle,
    project_id: String,
}

impl Planner {
    pub fn new(store: StoreHandle, project_id: impl Into<String>) -> Self {
        Self {
            store,
            project_id: project_id.into(),
        }
    }

    fn graph_key(&self) -> String {
        format!("projects/{}/supervisor/task_graph", self.project_id)
    }

    fn briefing_store(&self) -> BriefingStore {
        BriefingStore::new(self.store.clone(), self.project_id.clone())
    }

    /// Builds a fresh task graph from `goal`, persists it, and creates
    /// a skeletal `pending_invocation` briefing per task.
    pub fn plan(&self, goal: &str, now: DateTime<Utc>) -> ApexResult<TaskGraph> {
        let template = classify(goal);
        let mut tasks = Vec::new();
        let mut predecessor: Option<String> = None;
        for (step_name, role, duration) in steps_for(template).iter().copied() {
            let tid = task_id(now, step_name);
            tasks.push(PlannedTask {
                task_id: tid.clone(),
                step_name: step_name.to_string(),
                role,
                duration_minutes: duration,
                depends_on: predecessor.clone(),
            });
            predecessor = Some(tid);
        }

        let graph = TaskGraph {
            goal: goal.to_string(),
            template,
            tasks,
        };
        self.persist_graph(&graph)?;
        self.create_briefings(&graph.tasks, now)?;
        Ok(graph)
    }

    /// May rewrite the graph between cycles — e.g. insert a retry step
    /// for each failed task — preserving completed tasks' ids (spec
    /// §4.F).
    pub fn update(
        &self,
        goal: &str,
        completed: &[String],
        failed: &[String],
        now: DateTime<Utc>,
    ) -> ApexResult<TaskGraph> {
        let _ = completed; // completed ids are preserved by construction: never touched below
        let mut graph = self.load_graph()?;
        graph.goal = goal.to_string();

        let mut retry_tasks = Vec::new();
        for failed_id in failed {
            let Some(original) = graph.tasks.iter().find(|t| &t.task_id == failed_id) else {
                continue;
            };
            let retry_step = format!("{}_retry", original.step_name);
            let retry_id = task_id(now, &retry_step);
            retry_tasks.push(PlannedTask {
                task_id: retry_id,
                step_name: retry_step,
                role: original.role,
                duration_minutes: original.duration_minutes,
                depends_on: original.depends_on.clone(),
            });
        }

        graph.tasks.extend(retry_tasks.clone());
        self.persist_graph(&graph)?;
        self.create_briefings(&retry_tasks, now)?;
        Ok(graph)
    }

    fn persist_graph(&self, graph: &TaskGraph) -> ApexResult<()> {
        let bytes = serde_json::to_vec(graph).map_err(|e| ApexError::InvalidInput(e.to_string()))?;
        self.store.write(&self.graph_key(), &bytes)
    }

    fn load_graph(&self) -> ApexResult<TaskGraph> {
        let bytes = self
            .store
            .read(&self.graph_key())?
            .ok_or_else(|| ApexError::NotFound(format!("task graph for {}", self.project_id)))?;
        serde_json::from_slice(&bytes).map_err(|e| ApexError::InvalidInput(e.to_string()))
    }

    fn create_briefings(&self, tasks: &[PlannedTask], now: DateTime<Utc>) -> ApexResult<()> {
        let briefings = self.briefing_store();
        for task in tasks {
            let mut briefing = TaskBriefing::new(
                task.task_id.clone(),
                task.role,
                format!("{}: step '{}'", task.task_id, task.step_name),
                Priority::Medium,
                now,
            );
            briefing.status = BriefingStatus::PendingInvocation;
            if let Some(dep) = &task.depends_on {
                briefing.dependencies.push(Dependency {
                    task_id: dep.clone(),
                    required_status: RequiredStatus::Completed,
                });
            }
            briefings.create(&briefing)?;
        }
        Ok(())
    }
}
