use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::command::CommandSpec;

/// Which side of the worker/utility split a process belongs to (spec
/// §4.D, §GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    Worker,
    Utility,
}

/// Lifecycle state of a managed process (spec §4.D). No re-entry: a
/// restart always creates a new process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Starting,
    Running,
    Completed,
    Failed,
    Timeout,
    Terminated,
}

impl ProcessStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessStatus::Completed
                | ProcessStatus::Failed
                | ProcessStatus::Timeout
                | ProcessStatus::Terminated
        )
    }
}

/// A snapshot of one managed process, the data-model entry of spec
/// §4.D / §3 (`supervisor/processes/history/{pid}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub process_id: Uuid,
    pub kind: ProcessKind,
    pub task_id: String,
    pub role: Option<String>,
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub command_line: Vec<String>,
    pub captured_stdout_tail: Vec<String>,
    pub captured_stderr_tail: Vec<String>,
}

impl ProcessRecord {
    pub fn new(
        process_id: Uuid,
        kind: ProcessKind,
        task_id: impl Into<String>,
        role: Option<String>,
        command: &CommandSpec,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut command_line = vec![command.program.clone()];
        command_line.extend(command.args.iter().cloned());
        Self {
            process_id,
            kind,
            task_id: task_id.into(),
            role,
            status: ProcessStatus::Starting,
            pid: None,
            started_at,
            completed_at: None,
            exit_code: None,
            command_line,
            captured_stdout_tail: Vec::new(),
            captured_stderr_tail: Vec::new(),
        }
    }

    pub fn wall_clock_seconds(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_seconds())
    }
}
