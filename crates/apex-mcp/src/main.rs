//! Apex MCP Server
//!
//! Exposes the orchestration kernel's shared key-value store over the
//! Model Context Protocol on stdio, so worker and utility subprocesses
//! can read briefings and write results without a direct library
//! dependency on `apex-store`.

use apex_mcp::server::ApexMcpServer;
use apex_shared::config::ApexConfig;
use apex_store::StoreHandle;
use rmcp::ServiceExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("apex_mcp=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = ApexConfig::load(None)?;
    let store_path = std::env::var("LMDB_PATH").unwrap_or(config.store.path);
    let map_size_bytes = std::env::var("LMDB_MAP_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(config.store.map_size_bytes);

    tracing::info!(path = %store_path, "apex-mcp starting (stdio transport)");

    let store = StoreHandle::open(&store_path, map_size_bytes)?;
    let server = ApexMcpServer::new(store);
    let transport = rmcp::transport::io::stdio();

    let service = server.serve(transport).await?;
    service.waiting().await?;

    Ok(())
}
