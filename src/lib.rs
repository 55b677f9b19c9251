//! # difftour: guided tours of a working-tree diff
//!
//! Splits uncommitted changes into definition, global and operation units,
//! attaches the unchanged code they lean on, and orders everything so each
//! step only uses what earlier steps introduced. Steps are explained by a
//! pluggable model and the explanations are cached across rebuilds.
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration loading, validation and defaults
//! - **[`sources`]**: Diff and file-version access (git CLI, disk, memory)
//! - **[`context`]**: Per-build file text and syntax analysis memo
//! - **[`analyzer`]**: Tree-sitter definition and call extraction (JS/TS/Python)
//! - **[`diff`]**: Unified diff parsing and hunk splitting into change units
//! - **[`tour`]**: Background resolution, grouping, dependency graph, ordering, tour assembly
//! - **[`explain`]**: Step explanations (offline placeholder or chat-completions endpoint)
//! - **[`cache`]**: Persisted explanations keyed by step type, file and lines
//! - **[`mcp`]**: MCP server exposing tours as tools (stdio transport via rmcp)

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod context;
pub mod diff;
pub mod explain;
pub mod mcp;
pub mod sources;
pub mod tour;
