use apex_shared::error::{ApexError, ApexResult};
use apex_store::StoreHandle;
use chrono::{DateTime, Utc};

use crate::types::{BriefingIndexEntry, BriefingStatus, Priority, Role, TaskBriefing};

/// The structural transitions allowed by data-model invariant 2 (spec
/// §3). The retry-count gate on `Failed -> PendingInvocation` is a
/// policy decision for the caller (Recovery/Orchestrator), not a
/// structural one, so it is not checked here.
const ALLOWED_TRANSITIONS: &[(BriefingStatus, BriefingStatus)] = &[
    (BriefingStatus::PendingCreation, BriefingStatus::PendingInvocation),
    (BriefingStatus::PendingInvocation, BriefingStatus::InProgress),
    (BriefingStatus::PendingInvocation, BriefingStatus::Cancelled),
    (BriefingStatus::InProgress, BriefingStatus::Completed),
    (BriefingStatus::InProgress, BriefingStatus::Failed),
    (BriefingStatus::InProgress, BriefingStatus::Cancelled),
    (BriefingStatus::Failed, BriefingStatus::PendingInvocation),
];

fn transition_allowed(from: BriefingStatus, to: BriefingStatus) -> bool {
    from == to || ALLOWED_TRANSITIONS.iter().any(|(f, t)| *f == from && *t == to)
}

/// Module E — typed layer over [`apex_store::StoreHandle`] implementing
/// the task-briefing schema, indexes, and state transitions (spec
/// §4.E).
#[derive(Debug, Clone)]
pub struct BriefingStore {
    store: StoreHandle,
    project_id: String,
}

impl BriefingStore {
    pub fn new(store: StoreHandle, project_id: impl Into<String>) -> Self {
        Self {
            store,
            project_id: project_id.into(),
        }
    }

    fn briefing_key(&self, task_id: &str) -> String {
        format!("projects/{}/tasks/briefings/{}", self.project_id, task_id)
    }

    fn index_key(&self, task_id: &str) -> String {
        format!(
            "projects/{}/tasks/briefings/index/{}",
            self.project_id, task_id
        )
    }

    fn index_prefix(&self) -> String {
        format!("projects/{}/tasks/briefings/index/", self.project_id)
    }

    pub fn create(&self, briefing: &TaskBriefing) -> ApexResult<()> {
        let key = self.briefing_key(&briefing.task_id);
        if self.store.read(&key)?.is_some() {
            return Err(ApexError::AlreadyExists(format!(
                "briefing {} already exists",
                briefing.task_id
            )));
        }
        let bytes = serde_json::to_vec(briefing)
            .map_err(|e| ApexError::InvalidInput(e.to_string()))?;
        self.store.write(&key, &bytes)?;

        let index_entry = BriefingIndexEntry::from(briefing);
        let index_bytes = serde_json::to_vec(&index_entry)
            .map_err(|e| ApexError::InvalidInput(e.to_string()))?;
        self.store.write(&self.index_key(&briefing.task_id), &index_bytes)?;
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> ApexResult<TaskBriefing> {
        let key = self.briefing_key(task_id);
        let bytes = self
            .store
            .read(&key)?
            .ok_or_else(|| ApexError::NotFound(format!("briefing {task_id}")))?;
        serde_json::from_slice(&bytes).map_err(|e| ApexError::InvalidInput(e.to_string()))
    }

    /// Rewrites the briefing and refreshes its index row. Refuses a
    /// status transition outside the allowed set (spec §4.E,
    /// data-model invariant 2).
    pub fn update(&self, mut briefing: TaskBriefing, now: DateTime<Utc>) -> ApexResult<()> {
        let key = self.briefing_key(&briefing.task_id);
        let existing_bytes = self
            .store
            .read(&key)?
            .ok_or_else(|| ApexError::NotFound(format!("briefing {}", briefing.task_id)))?;
        let existing: TaskBriefing = serde_json::from_slice(&existing_bytes)
            .map_err(|e| ApexError::InvalidInput(e.to_string()))?;

        if !transition_allowed(existing.status, briefing.status) {
            return Err(ApexError::InvalidInput(format!(
                "illegal status transition {:?} -> {:?} for {}",
                existing.status, briefing.status, briefing.task_id
            )));
        }

        briefing.updated_at = now;
        let bytes = serde_json::to_vec(&briefing)
            .map_err(|e| ApexError::InvalidInput(e.to_string()))?;
        self.store.write(&key, &bytes)?;

        let index_entry = BriefingIndexEntry::from(&briefing);
        let index_bytes = serde_json::to_vec(&index_entry)
            .map_err(|e| ApexError::InvalidInput(e.to_string()))?;
        self.store.write(&self.index_key(&briefing.task_id), &index_bytes)?;
        Ok(())
    }

    /// Scans the index and applies filters; ordered by
    /// (priority-rank, created_at).
    pub fn list(
        &self,
        status: Option<BriefingStatus>,
        role: Option<Role>,
    ) -> ApexResult<Vec<BriefingIndexEntry>> {
        let keys = self.store.list_keys(&self.index_prefix())?;
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let bytes = self
                .store
                .read(&key)?
                .ok_or_else(|| ApexError::NotFound(key.clone()))?;
            let entry: BriefingIndexEntry =
                serde_json::from_slice(&bytes).map_err(|e| ApexError::InvalidInput(e.to_string()))?;
            if status.is_some_and(|s| s != entry.status) {
                continue;
            }
            if role.is_some_and(|r| r != entry.role) {
                continue;
            }
            entries.push(entry);
        }
        entries.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(entries)
    }

    /// Every `pending_invocation` briefing whose `blocks`-type
    /// dependencies are all in `completed_tids` (spec §3, §4.E).
    pub fn ready(&self, completed_tids: &[String]) -> ApexResult<Vec<TaskBriefing>> {
        let keys = self
            .store
            .list_keys(&format!("projects/{}/tasks/briefings/", self.project_id))?;
        let mut ready = Vec::new();
        for key in keys {
            // Skip index rows, which live under the same prefix.
            if key.contains("/index/") {
                continue;
            }
            let bytes = self.store.read(&key)?.ok_or_else(|| ApexError::NotFound(key.clone()))?;
            let briefing: TaskBriefing =
                serde_json::from_slice(&bytes).map_err(|e| ApexError::InvalidInput(e.to_string()))?;
            if briefing.status != BriefingStatus::PendingInvocation {
                continue;
            }
            let blocked = briefing.dependencies.iter().any(|dep| {
                matches!(dep.required_status, crate::types::RequiredStatus::Completed)
                    && !completed_tids.contains(&dep.task_id)
            });
            if !blocked {
                ready.push(briefing);
            }
        }
        ready.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(ready)
    }

    /// Deletes `completed` briefings (and their index rows) older
    /// than `older_than`, returning how many were removed.
    pub fn cleanup(&self, older_than: DateTime<Utc>) -> ApexResult<usize> {
        let entries = self.list(Some(BriefingStatus::Completed), None)?;
        let mut removed = 0;
        for entry in entries {
            if entry.created_at < older_than {
                self.store.delete(&self.briefing_key(&entry.task_id))?;
                self.store.delete(&self.index_key(&entry.task_id))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
