//! Module B — MCP Server: exposes the embedded key-value store over
//! the Model Context Protocol on stdio (spec §4.B).

pub mod helpers;
pub mod params;
pub mod server;
pub mod tools;
pub mod watch;

pub use server::{capability_block, ApexMcpServer};
