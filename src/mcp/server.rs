//! MCP responder: the dispatch loop shared by the mock and proxy servers.
//!
//! The loop decodes one JSON-RPC object at a time, routes it by method name
//! and writes exactly one response per request:
//!
//! 1. **Decode**: end-of-stream stops the loop cleanly, invalid JSON stops it
//!    with [`ServerError::Decode`]
//! 2. **Log**: every request and response goes to the [`ProtocolLog`]
//! 3. **Route**: `notifications/initialized` is acknowledged silently, known
//!    methods go to the [`Handler`], anything else is "method not found"
//! 4. **Reply**: handler errors become error responses (`-32601` for unknown
//!    methods, `-32000` otherwise) and the loop carries on
//!
//! Responders plug in by implementing [`Handler`].

use serde_json::{json, Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::{HandlerError, ServerError};
use crate::mcp::connection::Connection;
use crate::mcp::log::ProtocolLog;
use crate::mcp::protocol::{
    into_result_map, methods, ErrorObject, Implementation, InitializeParams, Request, RequestId,
    Response, ResultMap, MCP_PROTOCOL_VERSION,
};

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Input ended or a shutdown signal arrived.
    ShuttingDown,
}

/// How many entries of each kind a responder serves.
///
/// Drives the capabilities advertised in the `initialize` response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Inventory {
    /// Registered tools.
    pub tools: usize,
    /// Registered prompts.
    pub prompts: usize,
    /// Registered resources.
    pub resources: usize,
}

/// Parameters of a `tools/call` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    pub arguments: Map<String, Value>,
}

/// The responder-specific half of the dispatch loop.
///
/// Prompt and resource methods default to an empty registry.
#[allow(async_fn_in_trait)] // Responders run on a current-thread runtime; no Send bound needed
pub trait Handler {
    /// Name and version reported by `initialize`.
    fn server_info(&self) -> Implementation;

    /// Entry counts used for capability negotiation.
    fn inventory(&self) -> Inventory;

    /// Handles `tools/list`.
    fn list_tools(&self) -> ResultMap;

    /// Handles `tools/call`.
    async fn call_tool(&self, call: ToolCall) -> Result<ResultMap, HandlerError>;

    /// Handles `resources/list`.
    fn list_resources(&self) -> ResultMap {
        into_result_map(json!({ "resources": [] }))
    }

    /// Handles `resources/read`.
    fn read_resource(&self, uri: &str) -> Result<ResultMap, HandlerError> {
        Err(HandlerError::NotFound {
            kind: "resource",
            name: uri.to_string(),
        })
    }

    /// Handles `prompts/list`.
    fn list_prompts(&self) -> ResultMap {
        into_result_map(json!({ "prompts": [] }))
    }

    /// Handles `prompts/get`.
    fn get_prompt(
        &self,
        name: &str,
        _arguments: &Map<String, Value>,
    ) -> Result<ResultMap, HandlerError> {
        Err(HandlerError::NotFound {
            kind: "prompt",
            name: name.to_string(),
        })
    }
}

/// A JSON-RPC responder driving a [`Handler`].
pub struct McpServer<H> {
    /// Responder-specific behaviour.
    handler: H,
    /// Protocol log sink.
    log: ProtocolLog,
    /// Current server state.
    state: ServerState,
}

impl<H: Handler> McpServer<H> {
    /// Creates a server around `handler`, logging to `log`.
    #[must_use]
    pub const fn new(handler: H, log: ProtocolLog) -> Self {
        Self {
            handler,
            log,
            state: ServerState::AwaitingInit,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Serves stdin/stdout until end-of-input or a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or transport I/O fails.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let mut connection = Connection::stdio();
        self.run_with_shutdown(&mut connection).await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown<R, W>(
        &mut self,
        connection: &mut Connection<R, W>,
    ) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                value = connection.next_value() => {
                    if !self.handle_value(value?, connection).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown<R, W>(
        &mut self,
        connection: &mut Connection<R, W>,
    ) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                value = connection.next_value() => {
                    if !self.handle_value(value?, connection).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Serves `connection` until its input ends.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or transport I/O fails.
    pub async fn serve<R, W>(&mut self, connection: &mut Connection<R, W>) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        while self
            .handle_value(connection.next_value().await?, connection)
            .await?
        {}
        Ok(())
    }

    /// Handles one decoded value.
    ///
    /// Returns `false` once the input has ended.
    async fn handle_value<R, W>(
        &mut self,
        value: Option<Value>,
        connection: &mut Connection<R, W>,
    ) -> Result<bool, ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(value) = value else {
            debug!("Input closed");
            self.state = ServerState::ShuttingDown;
            return Ok(false);
        };

        let request: Request = serde_json::from_value(value).map_err(ServerError::Decode)?;
        if let Some(response) = self.dispatch(request).await {
            connection.write_message(&response).await?;
        }
        Ok(true)
    }

    /// Processes one request, returning the response to send, if any.
    ///
    /// Notifications never produce a response.
    pub async fn dispatch(&mut self, request: Request) -> Option<Response> {
        let notification = request.is_notification();
        let summary = match &request.id {
            Some(id) => format!("REQUEST {} (id {id})", request.method),
            None => format!("NOTIFICATION {}", request.method),
        };
        self.log.record(&summary, &request);

        if request.method == methods::INITIALIZED {
            if self.state == ServerState::Initialising {
                self.state = ServerState::Running;
            }
            debug!("Client finished initialisation");
            return None;
        }

        let outcome = match request.validate() {
            Some(problem) => Err(HandlerError::InvalidRequest(problem)),
            None => self.route(&request.method, request.params).await,
        };

        if notification {
            if let Err(e) = outcome {
                warn!(method = %request.method, error = %e, "Notification failed");
            }
            return None;
        }

        let id = request.id?;
        Some(self.respond(id, outcome))
    }

    fn respond(&mut self, id: RequestId, outcome: Result<ResultMap, HandlerError>) -> Response {
        let summary = format!("RESPONSE (id {id})");
        let response = match outcome {
            Ok(result) => Response::success(Some(id), result),
            Err(e) => {
                debug!(code = e.code(), error = %e, "Request failed");
                Response::failure(Some(id), ErrorObject::new(e.code(), e.to_string()))
            }
        };
        self.log.record(&summary, &response);
        response
    }

    async fn route(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<ResultMap, HandlerError> {
        match method {
            methods::INITIALIZE => Ok(self.initialize(params)),
            methods::PING => Ok(ResultMap::new()),
            methods::TOOLS_LIST => Ok(self.handler.list_tools()),
            methods::TOOLS_CALL => {
                let params = object_params(params)?;
                let call = ToolCall {
                    name: required_str(&params, "name")?.to_string(),
                    arguments: arguments(&params)?,
                };
                self.handler.call_tool(call).await
            }
            methods::RESOURCES_LIST => Ok(self.handler.list_resources()),
            methods::RESOURCES_READ => {
                let params = object_params(params)?;
                self.handler.read_resource(required_str(&params, "uri")?)
            }
            methods::PROMPTS_LIST => Ok(self.handler.list_prompts()),
            methods::PROMPTS_GET => {
                let params = object_params(params)?;
                let name = required_str(&params, "name")?;
                self.handler.get_prompt(name, &arguments(&params)?)
            }
            other => Err(HandlerError::MethodNotFound(other.to_string())),
        }
    }

    /// Handles the initialize request.
    fn initialize(&mut self, params: Option<Value>) -> ResultMap {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();

        if let Some(client) = &params.client_info {
            info!(client = %client.name, version = %client.version, "Client connected");
        }

        let protocol_version = params
            .protocol_version
            .unwrap_or_else(|| MCP_PROTOCOL_VERSION.to_string());

        let inventory = self.handler.inventory();
        let mut capabilities = Map::new();
        for (key, count) in [
            ("tools", inventory.tools),
            ("prompts", inventory.prompts),
            ("resources", inventory.resources),
        ] {
            if count > 0 {
                capabilities.insert(key.to_string(), json!({}));
            }
        }

        self.state = ServerState::Initialising;

        into_result_map(json!({
            "protocolVersion": protocol_version,
            "capabilities": capabilities,
            "serverInfo": self.handler.server_info(),
        }))
    }
}

/// Interprets absent params as an empty object.
fn object_params(params: Option<Value>) -> Result<Map<String, Value>, HandlerError> {
    match params {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(HandlerError::InvalidParams(
            "params must be an object".to_string(),
        )),
    }
}

fn required_str<'a>(
    params: &'a Map<String, Value>,
    key: &'static str,
) -> Result<&'a str, HandlerError> {
    match params.get(key) {
        None | Some(Value::Null) => Err(HandlerError::MissingParam(key)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(HandlerError::InvalidParams(format!(
            "'{key}' must be a string"
        ))),
    }
}

fn arguments(params: &Map<String, Value>) -> Result<Map<String, Value>, HandlerError> {
    match params.get("arguments") {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(args)) => Ok(args.clone()),
        Some(_) => Err(HandlerError::InvalidParams(
            "'arguments' must be an object".to_string(),
        )),
    }
}
