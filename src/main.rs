//! mcp-bridge: command-line bridge to MCP servers
//!
//! Sends single JSON-RPC calls to MCP servers over stdio or HTTP, and serves
//! the protocol itself through a mock or a shell-proxy responder.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;
use url::Url;

use mcp_bridge::config::{self, Config};
use mcp_bridge::mcp::log::ProtocolLog;
use mcp_bridge::mcp::mock::MockResponder;
use mcp_bridge::mcp::proxy::ProxyResponder;
use mcp_bridge::mcp::server::{Handler, McpServer};
use mcp_bridge::mcp::transport::{debug_enabled, Transport, TransportKind};

/// Command-line bridge for MCP servers.
///
/// Calls a server over stdio or HTTP, or serves the protocol on
/// stdin/stdout from a mock registry or shell-backed proxy tools.
#[derive(Parser, Debug)]
#[command(name = "mcp-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long, global = true, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one method call to an MCP server and print the result
    Call {
        /// Method name, e.g. tools/list
        method: String,

        /// Method parameters as a JSON object
        #[arg(long, value_name = "JSON")]
        params: Option<String>,

        /// Base URL of an HTTP server
        #[arg(long, conflicts_with = "server")]
        url: Option<Url>,

        /// Server command and arguments, after `--`
        #[arg(last = true, value_name = "COMMAND")]
        server: Vec<String>,
    },

    /// Serve the configured mock registry on stdin/stdout
    Mock,

    /// Serve the configured proxy tools on stdin/stdout
    Proxy,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    let level = match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // Wire tracing is emitted at debug
    if debug_enabled() {
        level.max(Level::DEBUG)
    } else {
        level
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Parses the `--params` argument.
fn parse_params(raw: Option<&str>) -> Result<Option<Value>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str(raw) {
        Ok(value @ (Value::Object(_) | Value::Null)) => Ok(Some(value)),
        Ok(_) => Err("--params must be a JSON object".to_string()),
        Err(e) => Err(format!("--params is not valid JSON: {e}")),
    }
}

/// Runs one call and prints its result.
async fn call(
    cfg: &Config,
    method: &str,
    params: Option<Value>,
    kind: TransportKind,
) -> Result<(), String> {
    let transport =
        Transport::connect(kind, &cfg.client, &cfg.http).map_err(|e| error_chain(&e))?;
    let result = transport
        .execute(method, params)
        .await
        .map_err(|e| error_chain(&e))?;

    let pretty = serde_json::to_string_pretty(&Value::Object(result)).map_err(|e| e.to_string())?;
    println!("{pretty}");
    Ok(())
}

/// Serves `handler` on stdin/stdout until input ends.
async fn serve<H: Handler>(cfg: &Config, responder: &str, handler: H) -> Result<(), String> {
    let log = match cfg
        .logging
        .protocol_log
        .clone()
        .or_else(|| config::default_protocol_log_path(responder))
    {
        Some(path) => ProtocolLog::open(path).map_err(|e| error_chain(&e))?,
        None => ProtocolLog::disabled(),
    };

    info!(
        responder,
        inventory = ?handler.inventory(),
        log = ?log.path(),
        "Responder ready, waiting for requests..."
    );

    let mut server = McpServer::new(handler, log);
    server.run().await.map_err(|e| error_chain(&e))
}

/// Formats an error with its sources.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Entry point for the mcp-bridge CLI.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", error_chain(&e));
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting mcp-bridge");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    let result = match args.command {
        Command::Call {
            method,
            params,
            url,
            server,
        } => {
            let kind = match url {
                Some(base_url) => TransportKind::Http { base_url },
                None => TransportKind::Stdio { command: server },
            };
            match parse_params(params.as_deref()) {
                Ok(params) => runtime.block_on(call(&cfg, &method, params, kind)),
                Err(e) => Err(e),
            }
        }
        Command::Mock => match MockResponder::from_config(&cfg.mock) {
            Ok(mock) => runtime.block_on(serve(&cfg, "mock", mock)),
            Err(e) => Err(e.to_string()),
        },
        Command::Proxy => match ProxyResponder::from_config(&cfg.proxy) {
            Ok(proxy) => runtime.block_on(serve(&cfg, "proxy", proxy)),
            Err(e) => Err(e.to_string()),
        },
    };

    match result {
        Ok(()) => {
            info!("Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "mcp-bridge failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn parse_call_with_trailing_command() {
        let args = Args::parse_from([
            "mcp-bridge",
            "-vv",
            "call",
            "tools/list",
            "--",
            "python3",
            "server.py",
            "--flag",
        ]);
        assert_eq!(args.verbose, 2);
        let Command::Call { method, server, url, .. } = args.command else {
            panic!("expected call");
        };
        assert_eq!(method, "tools/list");
        assert_eq!(server, vec!["python3", "server.py", "--flag"]);
        assert!(url.is_none());
    }

    #[test]
    fn url_conflicts_with_command() {
        let result = Args::try_parse_from([
            "mcp-bridge",
            "call",
            "tools/list",
            "--url",
            "http://localhost:8080",
            "--",
            "server",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn quiet_wins_over_config() {
        assert_eq!(get_log_level(0, true, "trace"), Level::ERROR);
    }

    #[test]
    fn params_must_be_an_object() {
        assert_eq!(parse_params(None), Ok(None));
        assert!(parse_params(Some(r#"{"name":"x"}"#)).unwrap().is_some());
        assert!(parse_params(Some("[1]")).is_err());
        assert!(parse_params(Some("{oops")).is_err());
    }
}
