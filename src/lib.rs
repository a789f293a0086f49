//! mcp-bridge: a command-line bridge to Model Context Protocol servers
//!
//! The crate talks JSON-RPC 2.0 to MCP servers in both directions:
//!
//! - **Client transports**: spawn a server as a subprocess and talk over its
//!   stdin/stdout, or call an MCP-style HTTP API
//! - **Responders**: serve the same protocol on stdin/stdout, either from an
//!   in-memory mock registry or by delegating tools to shell scripts
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: Protocol types, transports and responders

pub mod config;
pub mod error;
pub mod mcp;
