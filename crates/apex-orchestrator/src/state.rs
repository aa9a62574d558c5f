//! Persistent Orchestrator state: stage, goal, task bookkeeping,
//! control flags, and a bounded event log (spec §3, §4.H).

use std::collections::VecDeque;

use apex_process::ProcessKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which of the five stages — or the terminal `Idle` state — the
/// Orchestrator is in (spec §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plan,
    Construct,
    Invoke,
    Monitor,
    Integrate,
    Idle,
}

/// One task currently occupying a worker/utility slot (spec §3's
/// `active_tasks` map).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTask {
    pub task_id: String,
    pub process_id: Uuid,
    pub kind: ProcessKind,
    pub started_at: DateTime<Utc>,
}

/// Running counters surfaced alongside the state row (spec §3's
/// "metrics counters").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub tasks_created: u64,
    pub tasks_started: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub ticks_run: u64,
}

pub const EVENT_LOG_CAPACITY: usize = 1000;

/// One entry of the Orchestrator's ring-buffer event log (spec §4.H
/// supplement): gives operators and tests cycle history without
/// instrumenting the code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    TaskCreated {
        task_id: String,
        at: DateTime<Utc>,
    },
    TaskStarted {
        task_id: String,
        process_id: Uuid,
        at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: String,
        at: DateTime<Utc>,
    },
    TaskFailed {
        task_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
    ErrorOccurred {
        message: String,
        at: DateTime<Utc>,
    },
}

/// The full persisted row at `projects/{pid}/supervisor/state` (spec
/// §3's `SupervisorState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorState {
    pub stage: Stage,
    pub goal: String,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub active: Vec<ActiveTask>,
    pub metrics: Metrics,
    pub paused: bool,
    pub stop_requested: bool,
    pub tick_count: u32,
    pub events: VecDeque<OrchestratorEvent>,
}

impl SupervisorState {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            stage: Stage::Plan,
            goal: goal.into(),
            completed: Vec::new(),
            failed: Vec::new(),
            active: Vec::new(),
            metrics: Metrics::default(),
            paused: false,
            stop_requested: false,
            tick_count: 0,
            events: VecDeque::new(),
        }
    }

    /// Appends to the event log, evicting the oldest entry once the
    /// 1000-entry cap is reached.
    pub fn record(&mut self, event: OrchestratorEvent) {
        if self.events.len() >= EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }
}
