//! MCP server exposing tours over stdio.

pub mod server;
pub mod tools;
