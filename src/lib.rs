//! coinwatch: crypto top-N price poller and MCP tool server.
//!
//! Library crate exposing all modules for use by integration tests
//! and the two binaries.

pub mod config;
pub mod types;
pub mod logging;
pub mod market;
pub mod llm;
pub mod agent;
pub mod engine;
pub mod storage;
pub mod mcp;
