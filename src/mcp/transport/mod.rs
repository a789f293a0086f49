//! Client-side transports.
//!
//! Every transport offers the same capability: [`Transport::execute`] sends
//! one method call to an MCP endpoint and returns either its result object
//! or an error, never both.
//!
//! - [`StdioTransport`]: spawns the server as a child process per call and
//!   speaks newline-delimited JSON-RPC over its stdin/stdout
//! - [`HttpTransport`]: maps a fixed set of methods onto REST endpoints
//!
//! The caller picks the variant once through [`TransportKind`].

mod http;
mod stdio;

pub use http::HttpTransport;
pub use stdio::{debug_enabled, StdioTransport, DEBUG_ENV, TEARDOWN_GRACE};

use serde_json::Value;
use url::Url;

use crate::config::{ClientConfig, HttpConfig};
use crate::error::TransportError;
use crate::mcp::protocol::ResultMap;

/// Which transport to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    /// Spawn `command[0]` with the remaining elements as arguments.
    Stdio {
        /// Program and arguments.
        command: Vec<String>,
    },
    /// Talk to a REST-style server rooted at `base_url`.
    Http {
        /// Base URL of the server.
        base_url: Url,
    },
}

/// A connected transport.
#[derive(Debug)]
pub enum Transport {
    /// Subprocess transport.
    Stdio(StdioTransport),
    /// HTTP transport.
    Http(HttpTransport),
}

impl Transport {
    /// Builds the transport described by `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn connect(
        kind: TransportKind,
        client: &ClientConfig,
        http: &HttpConfig,
    ) -> Result<Self, TransportError> {
        match kind {
            TransportKind::Stdio { command } => {
                Ok(Self::Stdio(StdioTransport::new(command, client.clone())))
            }
            TransportKind::Http { base_url } => Ok(Self::Http(HttpTransport::new(base_url, http)?)),
        }
    }

    /// Sends `method` with optional `params` and returns the result object.
    ///
    /// # Errors
    ///
    /// Returns an error for setup failures, protocol failures, remote RPC
    /// errors and, on HTTP, unsupported methods or non-success statuses.
    pub async fn execute(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<ResultMap, TransportError> {
        match self {
            Self::Stdio(transport) => transport.execute(method, params).await,
            Self::Http(transport) => transport.execute(method, params).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_picks_variant() {
        let client = ClientConfig::default();
        let http = HttpConfig::default();

        let stdio = Transport::connect(
            TransportKind::Stdio {
                command: vec!["server".to_string()],
            },
            &client,
            &http,
        )
        .unwrap();
        assert!(matches!(stdio, Transport::Stdio(_)));

        let remote = Transport::connect(
            TransportKind::Http {
                base_url: Url::parse("http://localhost:8080").unwrap(),
            },
            &client,
            &http,
        )
        .unwrap();
        assert!(matches!(remote, Transport::Http(_)));
    }

    #[tokio::test]
    async fn empty_command_fails_fast() {
        let transport = Transport::connect(
            TransportKind::Stdio {
                command: Vec::new(),
            },
            &ClientConfig::default(),
            &HttpConfig::default(),
        )
        .unwrap();

        let err = transport.execute("tools/list", None).await.unwrap_err();
        assert!(matches!(err, TransportError::NoCommand));
    }
}
