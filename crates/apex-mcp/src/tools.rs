//! Tool implementations: async functions taking a [`StoreHandle`] and a
//! param struct, returning a JSON string. `server.rs` wires these to
//! the MCP tool-router macros.

use apex_shared::error::ApexError;
use apex_store::{Op, OpResult, StoreHandle};

use crate::helpers::{error_json, ok_json};
use crate::params::*;
use crate::watch;

fn value_to_string(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

pub async fn read(store: &StoreHandle, params: ReadParams) -> String {
    match store.read(&params.key) {
        Ok(value) => ok_json(&ReadResponse {
            found: value.is_some(),
            value: value.map(value_to_string),
        }),
        Err(e) => error_json(error_code(&e), &e.to_string()),
    }
}

pub async fn write(store: &StoreHandle, params: WriteParams) -> String {
    match store.write(&params.key, params.value.as_bytes()) {
        Ok(()) => ok_json(&WriteResponse { written: true }),
        Err(e) => error_json(error_code(&e), &e.to_string()),
    }
}

pub async fn delete(store: &StoreHandle, params: DeleteParams) -> String {
    match store.delete(&params.key) {
        Ok(()) => ok_json(&DeleteResponse { deleted: true }),
        Err(e) => error_json(error_code(&e), &e.to_string()),
    }
}

pub async fn list(store: &StoreHandle, params: ListParams) -> String {
    match store.list_keys(&params.prefix) {
        Ok(keys) => ok_json(&ListResponse { keys }),
        Err(e) => error_json(error_code(&e), &e.to_string()),
    }
}

pub async fn scan(store: &StoreHandle, params: ScanParams) -> String {
    match store.scan(&params.start, &params.end, params.limit) {
        Ok(rows) => ok_json(&ScanResponse {
            entries: rows
                .into_iter()
                .map(|(key, value)| ScanEntry {
                    key,
                    value: value_to_string(value),
                })
                .collect(),
        }),
        Err(e) => error_json(error_code(&e), &e.to_string()),
    }
}

pub async fn transaction(store: &StoreHandle, params: TransactionParams) -> String {
    let ops: Vec<Op> = params
        .ops
        .into_iter()
        .map(|op| match op.op {
            TxOpKind::Read => Op::Read(op.key),
            TxOpKind::Write => Op::Write(op.key, op.value.unwrap_or_default().into_bytes()),
            TxOpKind::Delete => Op::Delete(op.key),
        })
        .collect();

    match store.transact(ops) {
        Ok(results) => ok_json(&TransactionResponse {
            results: results
                .into_iter()
                .map(|r| match r {
                    OpResult::Value(v) => TxOpResultParam::Read {
                        value: v.map(value_to_string),
                    },
                    OpResult::Written => TxOpResultParam::Write,
                    OpResult::Deleted => TxOpResultParam::Delete,
                })
                .collect(),
        }),
        Err(e) => error_json(error_code(&e), &e.to_string()),
    }
}

pub async fn watch_prefix(store: &StoreHandle, params: WatchParams) -> String {
    match watch::watch(store, &params.prefix, params.timeout_seconds).await {
        Ok(diff) => ok_json(&WatchResponse {
            created: diff.created,
            modified: diff.modified,
            deleted: diff.deleted,
            timed_out: diff.timed_out,
        }),
        Err(e) => error_json(error_code(&e), &e.to_string()),
    }
}

/// Reads `projects/{pid}/config` and counts `tasks/briefings/index/*`
/// rows by status, decoding only the index entry's `status` field —
/// the index exists to make this query cheap even with many tasks.
pub async fn project_status(store: &StoreHandle, params: ProjectStatusParams) -> String {
    let config_key = format!("projects/{}/config", params.project_id);
    let config = match store.read(&config_key) {
        Ok(value) => value.map(value_to_string),
        Err(e) => return error_json(error_code(&e), &e.to_string()),
    };

    let index_prefix = format!("projects/{}/tasks/briefings/index/", params.project_id);
    let keys = match store.list_keys(&index_prefix) {
        Ok(keys) => keys,
        Err(e) => return error_json(error_code(&e), &e.to_string()),
    };

    let mut counts = std::collections::BTreeMap::new();
    for key in keys {
        let status = match store.read(&key) {
            Ok(Some(bytes)) => serde_json::from_slice::<serde_json::Value>(&bytes)
                .ok()
                .and_then(|v| v.get("status").and_then(|s| s.as_str()).map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string()),
            Ok(None) => continue,
            Err(e) => return error_json(error_code(&e), &e.to_string()),
        };
        *counts.entry(status).or_insert(0usize) += 1;
    }

    ok_json(&ProjectStatusResponse {
        project_id: params.project_id,
        config,
        task_counts_by_status: counts,
    })
}

fn error_code(err: &ApexError) -> &'static str {
    match err {
        ApexError::NotFound(_) => "not_found",
        ApexError::AlreadyExists(_) => "already_exists",
        ApexError::InvalidInput(_) => "invalid_input",
        ApexError::Conflict(_) => "conflict",
        ApexError::ResourceExhausted(_) => "resource_exhausted",
        ApexError::Timeout(_) => "timeout",
        ApexError::IoFailure(_) => "io_failure",
        ApexError::SubprocessFailure(_) => "subprocess_failure",
        ApexError::ProtocolViolation(_) => "protocol_violation",
        ApexError::Critical(_) => "critical",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_missing_key_reports_not_found_shape() {
        let (store, _dir) = StoreHandle::open_temporary().unwrap();
        let response = read(&store, ReadParams { key: "missing".into() }).await;
        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["found"], false);
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (store, _dir) = StoreHandle::open_temporary().unwrap();
        write(&store, WriteParams { key: "k".into(), value: "v".into() }).await;
        let response = read(&store, ReadParams { key: "k".into() }).await;
        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["value"], "v");
    }

    #[tokio::test]
    async fn transaction_applies_all_ops_atomically() {
        let (store, _dir) = StoreHandle::open_temporary().unwrap();
        let response = transaction(
            &store,
            TransactionParams {
                ops: vec![
                    TxOpParam { op: TxOpKind::Write, key: "a".into(), value: Some("1".into()) },
                    TxOpParam { op: TxOpKind::Read, key: "a".into(), value: None },
                ],
            },
        )
        .await;
        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["results"][1]["value"], "1");
    }

    #[tokio::test]
    async fn project_status_counts_by_index_status() {
        let (store, _dir) = StoreHandle::open_temporary().unwrap();
        store
            .write(
                "projects/p1/tasks/briefings/index/t1",
                br#"{"status":"completed"}"#,
            )
            .unwrap();
        store
            .write(
                "projects/p1/tasks/briefings/index/t2",
                br#"{"status":"in_progress"}"#,
            )
            .unwrap();

        let response = project_status(&store, ProjectStatusParams { project_id: "p1".into() }).await;
        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["task_counts_by_status"]["completed"], 1);
        assert_eq!(value["task_counts_by_status"]["in_progress"], 1);
    }
}
