//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::model::{Prompt, Resource, Tool};
use crate::mcp::protocol::MCP_PROTOCOL_VERSION;
use crate::mcp::proxy::ProxyToolSpec;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Identity and protocol version used by the client transports.
    #[serde(default)]
    pub client: ClientConfig,

    /// HTTP transport settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Entries served by the mock responder.
    #[serde(default)]
    pub mock: MockConfig,

    /// Tools served by the proxy responder.
    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        if self.http.timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "http.timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.client.protocol_version.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "client.protocol_version cannot be empty".to_string(),
            });
        }

        unique("mock tool", self.mock.tools.iter().map(|t| t.name.as_str()))?;
        unique("mock prompt", self.mock.prompts.iter().map(|p| p.name.as_str()))?;
        unique(
            "mock resource",
            self.mock.resources.iter().map(|r| r.uri.as_str()),
        )?;
        unique("proxy tool", self.proxy.tools.iter().map(|t| t.name.as_str()))?;

        Ok(())
    }
}

fn unique<'a>(kind: &str, keys: impl Iterator<Item = &'a str>) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(ConfigError::ValidationError {
                message: format!("Duplicate {kind} '{key}'"),
            });
        }
    }
    Ok(())
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Protocol log file for the responders.
    ///
    /// Defaults to `~/.mcp-bridge/logs/<responder>.log`.
    #[serde(default)]
    pub protocol_log: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            protocol_log: None,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Client identity sent during the `initialize` handshake.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Client name.
    #[serde(default = "default_client_name")]
    pub name: String,

    /// Client version.
    #[serde(default = "default_client_version")]
    pub version: String,

    /// Protocol version requested from servers.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            version: default_client_version(),
            protocol_version: default_protocol_version(),
        }
    }
}

fn default_client_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_protocol_version() -> String {
    MCP_PROTOCOL_VERSION.to_string()
}

/// HTTP transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

const fn default_timeout_secs() -> u64 {
    30
}

/// Mock responder registry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockConfig {
    /// Tools answered with canned text.
    #[serde(default)]
    pub tools: Vec<Tool>,

    /// Prompt templates.
    #[serde(default)]
    pub prompts: Vec<Prompt>,

    /// Static resources.
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// Proxy responder registry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Shell-backed tools.
    #[serde(default)]
    pub tools: Vec<ProxyToolSpec>,
}
