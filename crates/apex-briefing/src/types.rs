use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::collections::BTreeMap;

/// Who a task briefing is addressed to (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Coder,
    Adversary,
    Supervisor,
}

/// Lifecycle state of a briefing (spec §3, invariant 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BriefingStatus {
    PendingCreation,
    PendingInvocation,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

/// Total order used for the Orchestrator's ready-task tie-break
/// (spec §3, §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

/// The small fixed set of context-pointer content kinds the Briefing
/// Generator actually produces (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Code,
    Log,
    Test,
    Doc,
    Report,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPointer {
    pub key: String,
    pub description: String,
    pub content_type: ContentType,
    pub size: u64,
}

/// A dependency's required status gate, e.g. the `blocks` relation
/// from §4.E's `Ready` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredStatus {
    Completed,
    AnyTerminal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub task_id: String,
    pub required_status: RequiredStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableType {
    Code,
    Test,
    Documentation,
    Report,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliverable {
    #[serde(rename = "type")]
    pub kind: DeliverableType,
    pub description: String,
    pub output_key: String,
    pub required: bool,
    pub validation_criteria: Vec<String>,
}

/// The full task-briefing contract between Supervisor and worker
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBriefing {
    pub task_id: String,
    pub role_required: Role,
    pub objective: String,
    pub status: BriefingStatus,
    pub priority: Priority,
    pub context_pointers: BTreeMap<String, ContextPointer>,
    pub deliverables: Vec<Deliverable>,
    pub dependencies: Vec<Dependency>,
    pub quality_criteria: Vec<String>,
    pub constraints: Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub orchestration_metadata: Map<String, serde_json::Value>,
}

impl TaskBriefing {
    pub fn new(
        task_id: impl Into<String>,
        role_required: Role,
        objective: impl Into<String>,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            role_required,
            objective: objective.into(),
            status: BriefingStatus::PendingCreation,
            priority,
            context_pointers: BTreeMap::new(),
            deliverables: Vec::new(),
            dependencies: Vec::new(),
            quality_criteria: Vec::new(),
            constraints: Map::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
            retry_count: 0,
            orchestration_metadata: Map::new(),
        }
    }
}

/// The query-frequent subset mirrored at `tasks/briefings/index/{tid}`
/// (spec §3), kept small so `List`/`project_status` stay cheap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefingIndexEntry {
    pub task_id: String,
    pub status: BriefingStatus,
    pub role: Role,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub objective_head: String,
}

impl From<&TaskBriefing> for BriefingIndexEntry {
    fn from(b: &TaskBriefing) -> Self {
        const HEAD_LEN: usize = 80;
        let objective_head: String = b.objective.chars().take(HEAD_LEN).collect();
        Self {
            task_id: b.task_id.clone(),
            status: b.status,
            role: b.role_required,
            priority: b.priority,
            created_at: b.created_at,
            objective_head,
        }
    }
}
