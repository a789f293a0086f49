//! Error types for mcp-bridge.
//!
//! Each concern gets its own enum: configuration loading, the client-side
//! transports, responder handlers, proxy tool registration and the
//! responder dispatch loop.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::mcp::protocol::{METHOD_NOT_FOUND, SERVER_ERROR};

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors returned by [`Transport::execute`](crate::mcp::transport::Transport::execute).
#[derive(Error, Debug)]
pub enum TransportError {
    /// The stdio transport was built without a command to run.
    #[error("no command configured for stdio transport")]
    NoCommand,

    /// The child process could not be started.
    #[error("failed to spawn '{program}'")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Reading from or writing to the child's pipes failed.
    #[error("{context}")]
    Io {
        /// What the transport was doing.
        context: &'static str,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The `initialize` handshake failed.
    #[error("initialization failed: {message}{}", stderr_suffix(.stderr))]
    Initialization {
        /// Description of the handshake failure.
        message: String,
        /// Captured stderr of the child, possibly empty.
        stderr: String,
    },

    /// The child closed its output without answering.
    #[error("no response from server{}", stderr_suffix(.stderr))]
    NoResponse {
        /// Captured stderr of the child, possibly empty.
        stderr: String,
    },

    /// The response line was not a valid JSON-RPC response.
    #[error("malformed response: {raw}")]
    MalformedResponse {
        /// The raw line received.
        raw: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The server answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// Remote error code.
        code: i64,
        /// Remote error message.
        message: String,
    },

    /// The child exited unsuccessfully and wrote diagnostics to stderr.
    #[error("server process exited with {status}: {}", .stderr.trim())]
    ProcessFailed {
        /// Exit status of the child.
        status: ExitStatus,
        /// Captured stderr of the child.
        stderr: String,
    },

    /// The HTTP transport has no endpoint for this method.
    #[error("unsupported method for HTTP transport: {0}")]
    UnsupportedMethod(String),

    /// Parameters were missing or had the wrong shape.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The base URL cannot carry the endpoint path.
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    /// The HTTP request itself failed.
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// The HTTP server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Numeric status code.
        status: u16,
        /// Response body.
        body: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(" (stderr: {trimmed})")
    }
}

/// Errors raised by responder handlers.
///
/// These never stop the dispatch loop; they become JSON-RPC error responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// No handler exists for the method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// The message is not a well-formed JSON-RPC 2.0 request.
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    /// A required parameter was absent.
    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),

    /// Parameters were present but unusable.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The named tool, prompt or resource is not registered.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Entity kind ("tool", "prompt", "resource").
        kind: &'static str,
        /// Name or URI requested.
        name: String,
    },

    /// A delegated script or command failed.
    #[error("execution failed: {0}")]
    Execution(String),
}

impl HandlerError {
    /// Returns the JSON-RPC error code for this error.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            _ => SERVER_ERROR,
        }
    }
}

/// Errors raised while registering a proxy tool.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// A parameter entry is not of the form `name:type`.
    #[error("malformed parameter entry '{0}', expected name:type")]
    MalformedParameter(String),

    /// A parameter entry has an empty name.
    #[error("parameter name cannot be empty in '{0}'")]
    EmptyParameterName(String),

    /// A parameter type is not one of string, int, float, bool.
    #[error("invalid parameter type '{ty}' for '{name}'; must be string, int, float or bool")]
    InvalidType {
        /// Parameter name.
        name: String,
        /// Type as written.
        ty: String,
    },

    /// Neither or both of script and command were given.
    #[error("exactly one of script or command must be provided for tool '{0}'")]
    ScriptOrCommand(String),

    /// The name (or URI) of an entry is empty.
    #[error("{0} name cannot be empty")]
    EmptyName(&'static str),

    /// An entry with this key is already registered.
    #[error("{kind} '{name}' is already registered")]
    Duplicate {
        /// Entity kind ("tool", "prompt", "resource").
        kind: &'static str,
        /// Name or URI.
        name: String,
    },

    /// The script path failed validation.
    #[error("invalid script '{path}': {reason}")]
    InvalidScript {
        /// Script path as given.
        path: PathBuf,
        /// Why the script was rejected.
        reason: String,
    },
}

/// Fatal errors that stop a responder's dispatch loop.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The input stream did not contain valid JSON-RPC.
    #[error("failed to decode request")]
    Decode(#[source] serde_json::Error),

    /// Reading input or writing output failed.
    #[error("transport I/O failed")]
    Io(#[from] std::io::Error),

    /// The protocol log could not be opened or written.
    #[error("protocol log at {path}")]
    Log {
        /// Log file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
