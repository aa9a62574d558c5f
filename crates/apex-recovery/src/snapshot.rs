use std::collections::BTreeMap;

use apex_shared::error::{ApexError, ApexResult};
use apex_store::StoreHandle;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

const SNAPSHOT_PREFIX: &str = "snapshots/checkpoint-";

/// `snapshots/{snap_id}` (spec §3): an immutable capture of every
/// key/value pair under a set of prefixes at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
    pub keys: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    store: StoreHandle,
    project_id: String,
}

impl SnapshotStore {
    pub fn new(store: StoreHandle, project_id: impl Into<String>) -> Self {
        Self {
            store,
            project_id: project_id.into(),
        }
    }

    fn snapshot_key(&self, snap_id: &str) -> String {
        format!("snapshots/{snap_id}")
    }

    /// Captures SupervisorState + task-graph + active task ids (or
    /// whatever key prefixes the caller names) into
    /// `snapshots/checkpoint-{ts}` (spec §4.I).
    pub fn checkpoint(&self, capture_prefixes: &[String], now: DateTime<Utc>) -> ApexResult<Snapshot> {
        let snap_id = format!("checkpoint-{}", now.timestamp_millis());
        let mut keys = BTreeMap::new();
        for prefix in capture_prefixes {
            for (k, v) in self.store.snapshot_prefix(prefix)? {
                keys.insert(k, v);
            }
        }
        let snapshot = Snapshot {
            id: snap_id.clone(),
            project_id: self.project_id.clone(),
            created_at: now,
            keys,
        };
        let bytes = serde_json::to_vec(&snapshot).map_err(|e| ApexError::InvalidInput(e.to_string()))?;
        self.store.write(&self.snapshot_key(&snap_id), &bytes)?;
        Ok(snapshot)
    }

    /// Loads a checkpoint and rehydrates every captured key back into
    /// the live store. Does not revive active tasks — see
    /// [`crate::demote_active_tasks`] for that half of restore.
    pub fn restore(&self, snap_id: &str) -> ApexResult<Snapshot> {
        let bytes = self
            .store
            .read(&self.snapshot_key(snap_id))?
            .ok_or_else(|| ApexError::NotFound(format!("snapshot {snap_id}")))?;
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|e| ApexError::InvalidInput(e.to_string()))?;
        for (key, value) in &snapshot.keys {
            self.store.write(key, value)?;
        }
        Ok(snapshot)
    }

    /// Retains the most recent `keep_count` checkpoints plus any
    /// younger than `keep_younger_than_days`, deleting the rest (spec
    /// §4.I).
    pub fn cleanup(
        &self,
        keep_count: usize,
        keep_younger_than_days: i64,
        now: DateTime<Utc>,
    ) -> ApexResult<usize> {
        let mut keys = self.store.list_keys(SNAPSHOT_PREFIX)?;
        // Lexicographic order on `checkpoint-{millis}` matches
        // chronological order while the epoch-millis digit count stays
        // constant, which holds for every checkpoint this process
        // will ever create.
        keys.sort();

        let cutoff = now - ChronoDuration::days(keep_younger_than_days);
        let keep_recent: std::collections::HashSet<&String> =
            keys.iter().rev().take(keep_count).collect();

        let mut removed = 0;
        for key in &keys {
            if keep_recent.contains(key) {
                continue;
            }
            let created_at = parse_checkpoint_timestamp(key);
            if created_at.is_some_and(|ts| ts >= cutoff) {
                continue;
            }
            self.store.delete(key)?;
            removed += 1;
        }
        Ok(removed)
    }
}

fn parse_checkpoint_timestamp(key: &str) -> Option<DateTime<Utc>> {
    let millis_str = key.strip_prefix(SNAPSHOT_PREFIX)?;
    let millis: i64 = millis_str.parse().ok()?;
    DateTime::from_timestamp_millis(millis)
}
