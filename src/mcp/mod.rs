//! Model Context Protocol (MCP) bridge implementation.
//!
//! The client side sends one request per [`Transport::execute`] call; the
//! server side runs a dispatch loop over stdin/stdout and hands each method
//! to a [`Handler`].
//!
//! # Architecture
//!
//! ```text
//!   client                                   responder
//! ┌──────────────────┐                    ┌──────────────────────────┐
//! │ Transport        │   JSON-RPC 2.0     │ Connection (stream decode)│
//! │  ├─ Stdio ───────┼──── stdin/stdout ─▶│ McpServer (dispatch loop) │
//! │  └─ Http ────────┼──▶ /v1/tools ...   │  ├─ MockResponder         │
//! └──────────────────┘                    │  └─ ProxyResponder        │
//!                                         └──────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05 by default.

pub mod connection;
pub mod log;
pub mod mock;
pub mod model;
pub mod protocol;
pub mod proxy;
pub mod server;
pub mod transport;

pub use connection::Connection;
pub use log::ProtocolLog;
pub use mock::MockResponder;
pub use protocol::{ErrorObject, Request, RequestId, Response, ResultMap, MCP_PROTOCOL_VERSION};
pub use proxy::{ProxyResponder, ProxyToolSpec};
pub use server::{Handler, McpServer};
pub use transport::{Transport, TransportKind};
