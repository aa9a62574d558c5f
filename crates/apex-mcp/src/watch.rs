//! `watch`'s polling loop (spec §4.B).
//!
//! This backoff schedule is local to the tool and unrelated to
//! `apex_shared::retry::Backoff`, which governs subprocess/store retry
//! elsewhere in the workspace — `watch` is a cooperative long-poll, not
//! a failure-recovery retry.

use std::collections::HashMap;
use std::time::Duration;

use apex_shared::error::ApexResult;
use apex_store::StoreHandle;
use tokio::time::Instant;

const BACKOFF_STEPS_MS: &[u64] = &[100, 200, 400, 800, 1600];
const BACKOFF_CAP_MS: u64 = 2000;

pub struct WatchDiff {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub timed_out: bool,
}

fn snapshot_map(store: &StoreHandle, prefix: &str) -> ApexResult<HashMap<String, Vec<u8>>> {
    Ok(store.snapshot_prefix(prefix)?.into_iter().collect())
}

fn diff(
    before: &HashMap<String, Vec<u8>>,
    after: &HashMap<String, Vec<u8>>,
) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut created = Vec::new();
    let mut modified = Vec::new();
    let mut deleted = Vec::new();

    for (key, value) in after {
        match before.get(key) {
            None => created.push(key.clone()),
            Some(old) if old != value => modified.push(key.clone()),
            _ => {}
        }
    }
    for key in before.keys() {
        if !after.contains_key(key) {
            deleted.push(key.clone());
        }
    }
    created.sort();
    modified.sort();
    deleted.sort();
    (created, modified, deleted)
}

/// Snapshots `prefix`, then polls with exponential back-off (100 ms up
/// to a 2 s cap) until a diff appears or `timeout_seconds` elapses.
///
/// Polling only compares two snapshots, so a key that changes twice
/// between polls surfaces as a single diff against its first-seen
/// value — callers must not rely on observing every intermediate
/// value a key passes through, only its eventual settled state.
pub async fn watch(
    store: &StoreHandle,
    prefix: &str,
    timeout_seconds: u64,
) -> ApexResult<WatchDiff> {
    let before = snapshot_map(store, prefix)?;
    let deadline = Instant::now() + Duration::from_secs(timeout_seconds);
    let mut step = 0usize;

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Ok(WatchDiff {
                created: Vec::new(),
                modified: Vec::new(),
                deleted: Vec::new(),
                timed_out: true,
            });
        }

        let backoff_ms = BACKOFF_STEPS_MS
            .get(step)
            .copied()
            .unwrap_or(BACKOFF_CAP_MS)
            .min(BACKOFF_CAP_MS);
        step += 1;

        let sleep_for = Duration::from_millis(backoff_ms).min(deadline - now);
        tokio::time::sleep(sleep_for).await;

        let after = snapshot_map(store, prefix)?;
        let (created, modified, deleted) = diff(&before, &after);
        if !created.is_empty() || !modified.is_empty() || !deleted.is_empty() {
            return Ok(WatchDiff {
                created,
                modified,
                deleted,
                timed_out: false,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detects_a_created_key() {
        let (store, _dir) = StoreHandle::open_temporary().unwrap();
        let watch_store = store.clone();
        let handle = tokio::spawn(async move { watch(&watch_store, "k/", 5).await.unwrap() });

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.write("k/new", b"v").unwrap();

        let result = handle.await.unwrap();
        assert!(!result.timed_out);
        assert_eq!(result.created, vec!["k/new".to_string()]);
    }

    #[tokio::test]
    async fn times_out_when_nothing_changes() {
        let (store, _dir) = StoreHandle::open_temporary().unwrap();
        let result = watch(&store, "k/", 0).await.unwrap();
        assert!(result.timed_out);
    }

    #[tokio::test]
    async fn detects_a_modified_value() {
        let (store, _dir) = StoreHandle::open_temporary().unwrap();
        store.write("k/a", b"old").unwrap();
        let watch_store = store.clone();
        let handle = tokio::spawn(async move { watch(&watch_store, "k/", 5).await.unwrap() });

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.write("k/a", b"new").unwrap();

        let result = handle.await.unwrap();
        assert!(!result.timed_out);
        assert_eq!(result.modified, vec!["k/a".to_string()]);
    }
}
