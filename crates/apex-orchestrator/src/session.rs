//! Session event persistence (spec §3's `Session`/`StreamEvent`
//! entities, §4.C's per-event write contract, data-model invariant 5,
//! the "Event gap-free" testable property): assigns the next
//! per-session sequence number to each classified worker stream event
//! and writes it to `agents/events/{sid}/{seq}`, independent of the
//! Orchestrator's tick cadence.

use std::sync::atomic::{AtomicU64, Ordering};

use apex_process::TaggedStreamEvent;
use apex_shared::error::{ApexError, ApexResult};
use apex_store::StoreHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// The per-orchestration-run row at `sessions/{sid}/metadata` (spec
/// §3). One active per project at a time, per the data model; the
/// goal itself lives at `projects/{pid}/supervisor/state`, not
/// duplicated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub sid: Uuid,
    pub project_id: String,
    pub started_at: DateTime<Utc>,
}

fn session_key(sid: Uuid) -> String {
    format!("sessions/{sid}/metadata")
}

fn event_key(sid: Uuid, seq: u64) -> String {
    format!("agents/events/{sid}/{seq}")
}

fn persist_session(store: &StoreHandle, metadata: &SessionMetadata) -> ApexResult<()> {
    let bytes = serde_json::to_vec(metadata).map_err(|e| ApexError::InvalidInput(e.to_string()))?;
    store.write(&session_key(metadata.sid), &bytes)
}

fn persist_event(store: &StoreHandle, sid: Uuid, seq: u64, event: &TaggedStreamEvent) -> ApexResult<()> {
    let bytes = serde_json::to_vec(&event.event).map_err(|e| ApexError::InvalidInput(e.to_string()))?;
    store.write(&event_key(sid, seq), &bytes)
}

/// Drains `receiver` for as long as any `ProcessManager` holds the
/// paired sender, assigning each arriving event the next monotonic
/// sequence number for `sid` and persisting it. Run as a detached
/// background task, the same pattern the Process Manager uses for its
/// own monitor/restart-monitor tasks.
pub async fn run_session_event_writer(
    store: StoreHandle,
    project_id: String,
    sid: Uuid,
    mut receiver: mpsc::UnboundedReceiver<TaggedStreamEvent>,
) {
    let metadata = SessionMetadata { sid, project_id, started_at: Utc::now() };
    if let Err(e) = persist_session(&store, &metadata) {
        warn!(sid = %sid, error = %e, "failed to persist session metadata");
    }

    let next_seq = AtomicU64::new(0);
    while let Some(event) = receiver.recv().await {
        let seq = next_seq.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = persist_event(&store, sid, seq, &event) {
            warn!(sid = %sid, seq, error = %e, "failed to persist stream event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_stream::StreamEvent;
    use serde_json::json;

    #[tokio::test]
    async fn writes_gap_free_sequence_and_session_metadata() {
        let (store, _dir) = StoreHandle::open_temporary().unwrap();
        let sid = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(run_session_event_writer(
            store.clone(),
            "proj-1".to_string(),
            sid,
            rx,
        ));

        for i in 0..5 {
            tx.send(TaggedStreamEvent {
                process_id: Uuid::new_v4(),
                task_id: format!("task-{i}"),
                event: StreamEvent::classify(json!({"type": "assistant", "text": i})),
            })
            .unwrap();
        }
        drop(tx);
        writer.await.unwrap();

        let keys = store.list_keys(&format!("agents/events/{sid}/")).unwrap();
        assert_eq!(keys.len(), 5);
        let mut seqs: Vec<u64> = keys
            .iter()
            .map(|k| k.rsplit('/').next().unwrap().parse().unwrap())
            .collect();
        seqs.sort_unstable();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);

        let bytes = store.read(&session_key(sid)).unwrap().unwrap();
        let metadata: SessionMetadata = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(metadata.sid, sid);
        assert_eq!(metadata.project_id, "proj-1");
    }
}
