//! Module I — checkpoints, restore, failed-task retry, health-check,
//! and cleanup (spec §4.I).

pub mod health;
pub mod snapshot;

pub use health::{ErrorRateHealthCheck, HealthCheck};
pub use snapshot::{Snapshot, SnapshotStore};

use std::sync::Arc;
use std::time::Duration;

use apex_briefing::{BriefingStatus, BriefingStore, RequiredStatus};
use apex_shared::config::RecoveryConfig;
use apex_shared::error::ApexResult;
use apex_store::StoreHandle;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Module I — wraps [`SnapshotStore`] with the recovery policy: the
/// auto-recovery trigger, per-task recovery attempts, and active-task
/// demotion after a restore (spec §4.I).
#[derive(Debug, Clone)]
pub struct Recovery {
    store: StoreHandle,
    project_id: String,
    config: RecoveryConfig,
    snapshots: SnapshotStore,
}

impl Recovery {
    pub fn new(store: StoreHandle, project_id: impl Into<String>, config: RecoveryConfig) -> Self {
        let project_id = project_id.into();
        let snapshots = SnapshotStore::new(store.clone(), project_id.clone());
        Self {
            store,
            project_id,
            config,
            snapshots,
        }
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    fn briefings(&self) -> BriefingStore {
        BriefingStore::new(self.store.clone(), self.project_id.clone())
    }

    /// Whether recent failures warrant auto-recovery (spec §4.I:
    /// "> 3 recent failures").
    pub fn should_trigger_auto_recovery(&self, recent_failure_count: u32) -> bool {
        recent_failure_count > self.config.auto_recovery_failure_threshold
    }

    /// After a restore, checkpointed active tasks are gone along with
    /// their subprocesses; demote each to `failed` so the standard
    /// retry policy picks them back up (spec §4.I).
    pub fn demote_active_tasks(&self, active_task_ids: &[String], now: DateTime<Utc>) -> ApexResult<()> {
        let briefings = self.briefings();
        for task_id in active_task_ids {
            let mut briefing = briefings.get(task_id)?;
            if briefing.status == BriefingStatus::InProgress {
                briefing.status = BriefingStatus::Failed;
                briefing.failed_at = Some(now);
                briefings.update(briefing, now)?;
            }
        }
        Ok(())
    }

    /// Per-task recovery attempt: reset a `failed` task back to
    /// `pending_invocation` iff its `blocks`-type dependencies are
    /// still satisfied (spec §4.I). Returns whether the task was
    /// reset.
    pub fn attempt_task_recovery(
        &self,
        task_id: &str,
        completed_tids: &[String],
        now: DateTime<Utc>,
    ) -> ApexResult<bool> {
        let briefings = self.briefings();
        let mut briefing = briefings.get(task_id)?;
        if briefing.status != BriefingStatus::Failed {
            return Ok(false);
        }
        let deps_satisfied = briefing.dependencies.iter().all(|dep| {
            !matches!(dep.required_status, RequiredStatus::Completed)
                || completed_tids.contains(&dep.task_id)
        });
        if !deps_satisfied {
            return Ok(false);
        }
        briefing.status = BriefingStatus::PendingInvocation;
        briefings.update(briefing, now)?;
        Ok(true)
    }

    /// Retains the K most-recent checkpoints plus any younger than M
    /// days, per the configured retention policy.
    pub fn cleanup_checkpoints(&self, now: DateTime<Utc>) -> ApexResult<usize> {
        self.snapshots.cleanup(
            self.config.keep_checkpoints as usize,
            self.config.keep_checkpoints_younger_than_days as i64,
            now,
        )
    }

    /// Spawns a background task that checkpoints every
    /// `checkpoint_interval_minutes` so long as `has_unfinished_work`
    /// reports `true` (spec §4.I).
    pub fn start_periodic_checkpoint<F, P>(
        self: Arc<Self>,
        has_unfinished_work: F,
        capture_prefixes: P,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn() -> bool + Send + Sync + 'static,
        P: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        let interval = Duration::from_secs(self.config.checkpoint_interval_minutes as u64 * 60);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !has_unfinished_work() {
                    continue;
                }
                let now = Utc::now();
                match self.snapshots.checkpoint(&capture_prefixes(), now) {
                    Ok(snapshot) => info!(snapshot_id = %snapshot.id, "periodic checkpoint written"),
                    Err(e) => warn!(error = %e, "periodic checkpoint failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_briefing::{Priority, Role, TaskBriefing};
    use chrono::TimeZone;

    fn recovery() -> (Recovery, StoreHandle, tempfile::TempDir) {
        let (store, dir) = StoreHandle::open_temporary().unwrap();
        let recovery = Recovery::new(store.clone(), "proj-1", RecoveryConfig::default());
        (recovery, store, dir)
    }

    #[test]
    fn auto_recovery_triggers_above_threshold() {
        let (recovery, ..) = recovery();
        assert!(!recovery.should_trigger_auto_recovery(3));
        assert!(recovery.should_trigger_auto_recovery(4));
    }

    #[test]
    fn demote_active_tasks_marks_in_progress_as_failed() {
        let (recovery, ..) = recovery();
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap();
        let briefings = recovery.briefings();
        let mut b = TaskBriefing::new("task-1", Role::Coder, "do it", Priority::Medium, now);
        briefings.create(&b).unwrap();
        b.status = BriefingStatus::PendingInvocation;
        briefings.update(b.clone(), now).unwrap();
        b.status = BriefingStatus::InProgress;
        briefings.update(b, now).unwrap();

        recovery.demote_active_tasks(&["task-1".to_string()], now).unwrap();
        assert_eq!(briefings.get("task-1").unwrap().status, BriefingStatus::Failed);
    }

    #[test]
    fn attempt_task_recovery_requires_satisfied_dependencies() {
        let (recovery, ..) = recovery();
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap();
        let briefings = recovery.briefings();
        let mut b = TaskBriefing::new("task-2", Role::Coder, "do it", Priority::Medium, now);
        b.dependencies.push(apex_briefing::Dependency {
            task_id: "upstream".to_string(),
            required_status: RequiredStatus::Completed,
        });
        briefings.create(&b).unwrap();
        b.status = BriefingStatus::PendingInvocation;
        briefings.update(b.clone(), now).unwrap();
        b.status = BriefingStatus::InProgress;
        briefings.update(b.clone(), now).unwrap();
        b.status = BriefingStatus::Failed;
        briefings.update(b, now).unwrap();

        let reset_blocked = recovery.attempt_task_recovery("task-2", &[], now).unwrap();
        assert!(!reset_blocked);

        let reset_ok = recovery
            .attempt_task_recovery("task-2", &["upstream".to_string()], now)
            .unwrap();
        assert!(reset_ok);
        assert_eq!(
            briefings.get("task-2").unwrap().status,
            BriefingStatus::PendingInvocation
        );
    }
}
