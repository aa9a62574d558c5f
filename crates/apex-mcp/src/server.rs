//! MCP `ServerHandler` implementation (spec §4.B).
//!
//! Exposes `apex-store`'s six store operations plus `watch` and
//! `project_status` as MCP tools: the same `Parameters<T>` /
//! stringly-JSON shape the teacher's `TaskerMcpServer` uses, just
//! against a generic KV store instead of a workflow orchestrator's API.

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ServerHandler};

use apex_store::StoreHandle;

use crate::params::*;
use crate::tools;

/// MCP server handler exposing the embedded key-value store.
#[derive(Clone)]
pub struct ApexMcpServer {
    store: StoreHandle,
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for ApexMcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApexMcpServer").field("store", &self.store).finish()
    }
}

impl ApexMcpServer {
    pub fn new(store: StoreHandle) -> Self {
        Self {
            store,
            tool_router: Self::tool_router(),
        }
    }
}

/// Protocol-version and capability payload for the initialization
/// handshake (spec §4.B).
pub fn capability_block() -> ServerInfo {
    ServerInfo {
        protocol_version: ProtocolVersion::V_2025_03_26,
        capabilities: ServerCapabilities::builder().enable_tools().build(),
        server_info: Implementation {
            name: "apex-mcp".to_string(),
            title: Some("Apex Store MCP Server".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: Some(
                "MCP server exposing the Apex orchestration kernel's shared key-value store: \
                 read, write, delete, list, scan, transaction, watch, and project_status."
                    .to_string(),
            ),
            icons: None,
            website_url: None,
        },
        instructions: Some(
            "Apex coordinates worker and utility subprocesses entirely through this store. \
             Read your task briefing at `projects/{project_id}/tasks/briefings/{task_id}`, \
             write results under the output keys it names, and use `watch` to wait on a \
             prefix instead of polling in a tight loop."
                .to_string(),
        ),
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for ApexMcpServer {
    fn get_info(&self) -> ServerInfo {
        capability_block()
    }
}

#[tool_router(router = tool_router)]
impl ApexMcpServer {
    #[tool(name = "read", description = "Read the value stored at a key, if any.")]
    pub async fn read(&self, Parameters(params): Parameters<ReadParams>) -> String {
        tools::read(&self.store, params).await
    }

    #[tool(name = "write", description = "Write a UTF-8 value at a key, overwriting any existing value.")]
    pub async fn write(&self, Parameters(params): Parameters<WriteParams>) -> String {
        tools::write(&self.store, params).await
    }

    #[tool(name = "delete", description = "Delete the value stored at a key.")]
    pub async fn delete(&self, Parameters(params): Parameters<DeleteParams>) -> String {
        tools::delete(&self.store, params).await
    }

    #[tool(name = "list", description = "List, in lexicographic order, every key starting with a prefix.")]
    pub async fn list(&self, Parameters(params): Parameters<ListParams>) -> String {
        tools::list(&self.store, params).await
    }

    #[tool(name = "scan", description = "Return up to `limit` ordered key/value pairs in the half-open range [start, end).")]
    pub async fn scan(&self, Parameters(params): Parameters<ScanParams>) -> String {
        tools::scan(&self.store, params).await
    }

    #[tool(
        name = "transaction",
        description = "Apply an ordered batch of read/write/delete operations atomically."
    )]
    pub async fn transaction(&self, Parameters(params): Parameters<TransactionParams>) -> String {
        tools::transaction(&self.store, params).await
    }

    #[tool(
        name = "watch",
        description = "Snapshot a key prefix, then poll with exponential back-off until a created/modified/deleted diff appears or the timeout elapses."
    )]
    pub async fn watch(&self, Parameters(params): Parameters<WatchParams>) -> String {
        tools::watch_prefix(&self.store, params).await
    }

    #[tool(
        name = "project_status",
        description = "Aggregate a project's config and its task counts bucketed by briefing status."
    )]
    pub async fn project_status(&self, Parameters(params): Parameters<ProjectStatusParams>) -> String {
        tools::project_status(&self.store, params).await
    }
}
