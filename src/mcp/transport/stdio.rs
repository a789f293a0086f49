//! stdio transport for MCP clients.
//!
//! Each call to [`StdioTransport::execute`] runs a complete, private session:
//!
//! 1. Spawn the configured command with piped stdin/stdout/stderr
//! 2. `initialize` request, one response line, `notifications/initialized`
//! 3. The caller's request, one response line
//! 4. Close stdin, wait [`TEARDOWN_GRACE`] for exit, kill if still running
//!
//! Messages are single-line JSON terminated by `\n`. The child's stderr is
//! collected in memory and only surfaced when something goes wrong.
//!
//! Nothing survives between calls except the request id counter, so ids keep
//! increasing across processes spawned by the same transport.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::mcp::protocol::{methods, Request, RequestId, Response, ResultMap};

/// How long a child may take to exit after its stdin is closed.
pub const TEARDOWN_GRACE: Duration = Duration::from_secs(1);

/// Environment variable enabling wire-level tracing on stderr.
pub const DEBUG_ENV: &str = "MCP_DEBUG";

/// Upper bound on waiting for the stderr collector after teardown.
const STDERR_DRAIN: Duration = Duration::from_millis(100);

const WIRE_TARGET: &str = "mcp_bridge::wire";

/// Returns `true` if [`DEBUG_ENV`] is set to something other than an empty
/// string, `0` or `false`.
#[must_use]
pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV).is_ok_and(|value| is_truthy(&value))
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
}

/// A transport that runs the MCP server as a child process, once per call.
#[derive(Debug)]
pub struct StdioTransport {
    /// Program followed by its arguments.
    command: Vec<String>,
    /// Identity sent in the handshake.
    client: ClientConfig,
    /// Trace every line sent and received.
    debug: bool,
    /// Next JSON-RPC id.
    next_id: AtomicI64,
}

impl StdioTransport {
    /// Creates a transport for `command`.
    ///
    /// Wire tracing follows [`debug_enabled`].
    #[must_use]
    pub fn new(command: Vec<String>, client: ClientConfig) -> Self {
        Self {
            command,
            client,
            debug: debug_enabled(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Overrides wire tracing.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Spawns the server, performs the handshake, sends one request and
    /// returns its result.
    ///
    /// The child is gone when this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// See [`TransportError`]; handshake failures are reported as
    /// [`TransportError::Initialization`] with the child's stderr attached.
    pub async fn execute(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<ResultMap, TransportError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or(TransportError::NoCommand)?;

        let mut child = ChildProcess::spawn(program, args)?;
        debug!(program, pid = child.id(), method, "Spawned MCP server");

        let outcome = self.converse(&mut child, method, params).await;
        let exit = child.shutdown().await;
        let stderr = child.stderr.text().await;

        settle(outcome, exit, stderr)
    }

    async fn converse(
        &self,
        child: &mut ChildProcess,
        method: &str,
        params: Option<Value>,
    ) -> Result<ResultMap, TransportError> {
        self.handshake(child).await?;

        let request = Request::new(self.next_id(), method, params);
        self.send(child, &request).await?;
        let line = self.receive(child).await?;
        decode_response(&line, request.id.as_ref())
    }

    async fn handshake(&self, child: &mut ChildProcess) -> Result<(), TransportError> {
        let init_failed = |e: TransportError| TransportError::Initialization {
            message: describe(&e),
            stderr: String::new(),
        };

        let initialize = Request::new(
            self.next_id(),
            methods::INITIALIZE,
            Some(json!({
                "protocolVersion": self.client.protocol_version,
                "clientInfo": {
                    "name": self.client.name,
                    "version": self.client.version,
                },
                "capabilities": {},
            })),
        );
        self.send(child, &initialize).await.map_err(init_failed)?;

        let line = self.receive(child).await.map_err(init_failed)?;
        let result = decode_response(&line, initialize.id.as_ref()).map_err(init_failed)?;
        debug!(
            protocol_version = ?result.get("protocolVersion"),
            server = ?result.get("serverInfo"),
            "Handshake complete"
        );

        let initialized = Request::notification(methods::INITIALIZED, None);
        self.send(child, &initialized).await.map_err(init_failed)
    }

    async fn send(&self, child: &mut ChildProcess, message: &Request) -> Result<(), TransportError> {
        let line = serde_json::to_string(message).map_err(|e| TransportError::Io {
            context: "failed to encode request",
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        if self.debug {
            debug!(target: WIRE_TARGET, direction = "send", %line);
        }
        child.write_line(&line).await
    }

    async fn receive(&self, child: &mut ChildProcess) -> Result<String, TransportError> {
        let line = child.read_line().await?;
        if self.debug {
            debug!(target: WIRE_TARGET, direction = "recv", line = %line.trim_end());
        }
        Ok(line)
    }
}

/// Formats an error together with its sources.
fn describe(error: &TransportError) -> String {
    use std::error::Error as _;

    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Parses one response line into its result object.
fn decode_response(line: &str, expected: Option<&RequestId>) -> Result<ResultMap, TransportError> {
    let raw = line.trim();
    if raw.is_empty() {
        return Err(TransportError::NoResponse {
            stderr: String::new(),
        });
    }

    let response: Response =
        serde_json::from_str(raw).map_err(|source| TransportError::MalformedResponse {
            raw: raw.to_string(),
            source,
        })?;

    if response.id.as_ref() != expected {
        warn!(
            expected = ?expected,
            received = ?response.id,
            "Response id does not match request id"
        );
    }

    if let Some(error) = response.error {
        return Err(TransportError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    let result = response
        .result
        .ok_or_else(|| TransportError::MalformedResponse {
            raw: raw.to_string(),
            source: <serde_json::Error as serde::de::Error>::custom(
                "response has neither result nor error",
            ),
        })?;

    serde_json::from_value(result).map_err(|source| TransportError::MalformedResponse {
        raw: raw.to_string(),
        source,
    })
}

/// How the child ended.
#[derive(Debug, Clone, Copy)]
enum Exit {
    /// Exited on its own within the grace period.
    Exited(ExitStatus),
    /// Killed by the transport.
    Killed,
}

/// Combines the exchange outcome with the way the child ended.
fn settle(
    outcome: Result<ResultMap, TransportError>,
    exit: Exit,
    stderr: String,
) -> Result<ResultMap, TransportError> {
    let failed = match exit {
        Exit::Exited(status) if !status.success() && !stderr.trim().is_empty() => Some(status),
        _ => None,
    };

    match outcome {
        Ok(result) => match failed {
            Some(status) => Err(TransportError::ProcessFailed { status, stderr }),
            None => Ok(result),
        },
        Err(TransportError::Initialization { message, .. }) => {
            Err(TransportError::Initialization { message, stderr })
        }
        Err(TransportError::NoResponse { .. }) => Err(TransportError::NoResponse { stderr }),
        Err(err @ TransportError::Io { .. }) => match failed {
            Some(status) => Err(TransportError::ProcessFailed { status, stderr }),
            None => Err(err),
        },
        Err(err) => Err(err),
    }
}

/// A spawned server and its pipes, owned by a single `execute` call.
struct ChildProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    stderr: StderrBuffer,
}

impl ChildProcess {
    fn spawn(program: &str, args: &[String]) -> Result<Self, TransportError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| TransportError::Io {
            context: "child stdout was not captured",
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        })?;

        Ok(Self {
            stdin: child.stdin.take(),
            stdout: BufReader::new(stdout),
            stderr: StderrBuffer::collect(child.stderr.take()),
            child,
        })
    }

    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let stdin = self.stdin.as_mut().ok_or_else(|| TransportError::Io {
            context: "server stdin is closed",
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        })?;

        let write_failed = |source| TransportError::Io {
            context: "failed to write to server stdin",
            source,
        };
        stdin.write_all(line.as_bytes()).await.map_err(write_failed)?;
        stdin.write_all(b"\n").await.map_err(write_failed)?;
        stdin.flush().await.map_err(write_failed)
    }

    /// Reads one line; an empty string means the child closed stdout.
    async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut line = String::new();
        self.stdout
            .read_line(&mut line)
            .await
            .map_err(|source| TransportError::Io {
                context: "failed to read from server stdout",
                source,
            })?;
        Ok(line)
    }

    /// Closes stdin and reaps the child, killing it after the grace period.
    async fn shutdown(&mut self) -> Exit {
        drop(self.stdin.take());

        match tokio::time::timeout(TEARDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(%status, "MCP server exited");
                Exit::Exited(status)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to wait for MCP server, killing it");
                self.kill().await;
                Exit::Killed
            }
            Err(_) => {
                debug!(
                    grace_ms = TEARDOWN_GRACE.as_millis(),
                    "MCP server still running after grace period, killing it"
                );
                self.kill().await;
                Exit::Killed
            }
        }
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to kill MCP server");
        }
    }
}

/// In-memory copy of a child's stderr, filled by a background task so the
/// child never blocks on a full pipe.
struct StderrBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl StderrBuffer {
    fn collect(pipe: Option<ChildStderr>) -> Self {
        let bytes = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let sink = Arc::clone(&bytes);
            tokio::spawn(async move {
                let mut chunk = [0u8; 4096];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => sink
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { bytes, task }
    }

    /// Returns everything collected so far.
    ///
    /// Waits briefly for the collector to reach end-of-file; a grandchild
    /// still holding the pipe open does not stall the caller.
    async fn text(&mut self) -> String {
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(STDERR_DRAIN, &mut task).await.is_err() {
                task.abort();
            }
        }
        let bytes = self
            .bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
    }
}
