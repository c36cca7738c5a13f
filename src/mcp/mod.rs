//! MCP tool server.
//!
//! Exposes the `cryptocurrencies` table as five tools over JSON-RPC 2.0,
//! on stdio or HTTP.

pub mod http;
pub mod rpc;
pub mod server;
pub mod stdio;
pub mod tools;

pub use server::McpServer;
