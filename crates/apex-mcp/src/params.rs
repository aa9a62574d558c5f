//! MCP tool parameter and response types.
//!
//! Parameter structs derive `Deserialize + JsonSchema` for MCP tool
//! registration; response structs derive `Serialize` for JSON output.
//! Values are carried as UTF-8 strings on the wire — every value this
//! workspace ever stores (briefings, task graphs, snapshots, process
//! records) is itself JSON text, so there is no need for a
//! byte-oriented encoding here.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadParams {
    #[schemars(description = "Key to read")]
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub found: bool,
    pub value: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteParams {
    #[schemars(description = "Key to write")]
    pub key: String,
    #[schemars(description = "UTF-8 value to store at this key")]
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub written: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteParams {
    #[schemars(description = "Key to delete")]
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListParams {
    #[schemars(description = "Prefix to list keys under")]
    pub prefix: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub keys: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScanParams {
    #[schemars(description = "Inclusive start key")]
    pub start: String,
    #[schemars(description = "Exclusive end key")]
    pub end: String,
    #[schemars(description = "Maximum number of entries to return")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct ScanEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub entries: Vec<ScanEntry>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TxOpKind {
    Read,
    Write,
    Delete,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TxOpParam {
    pub op: TxOpKind,
    pub key: String,
    #[schemars(description = "Value for a write operation; ignored otherwise")]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TransactionParams {
    #[schemars(description = "Ordered batch of read/write/delete operations, applied atomically")]
    pub ops: Vec<TxOpParam>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TxOpResultParam {
    Read { value: Option<String> },
    Write,
    Delete,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub results: Vec<TxOpResultParam>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WatchParams {
    #[schemars(description = "Key prefix to watch for changes")]
    pub prefix: String,
    #[schemars(description = "Maximum seconds to poll before returning a timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct WatchResponse {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub timed_out: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProjectStatusParams {
    #[schemars(description = "Project identifier")]
    pub project_id: String,
}

#[derive(Debug, Serialize)]
pub struct ProjectStatusResponse {
    pub project_id: String,
    pub config: Option<String>,
    pub task_counts_by_status: std::collections::BTreeMap<String, usize>,
}
