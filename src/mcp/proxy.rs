//! Shell-backed proxy responder.
//!
//! Each proxy tool runs a script or an inline shell command. Call arguments
//! are passed to the child as environment variables named after the
//! parameters; whatever the child writes to stdout becomes the tool result.
//! The child's stderr goes straight to ours.
//!
//! Scripts are checked when registered and again before every call, since
//! the file may have been removed or had its permissions changed meanwhile.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ProxyConfig;
use crate::error::{HandlerError, RegistrationError};
use crate::mcp::model::{display_value, Parameter, Tool};
use crate::mcp::protocol::{into_result_map, to_result_map, Implementation, ResultMap, ToolCallResult};
use crate::mcp::server::{Handler, Inventory, ToolCall};

/// Fallback when neither `bash` nor `sh` is on `PATH`.
const DEFAULT_SHELL: &str = "/bin/sh";

/// A proxy tool as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyToolSpec {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Comma-separated `name:type` list, e.g. `a:int,b:int`.
    #[serde(default)]
    pub parameters: String,
    /// Script to execute.
    #[serde(default)]
    pub script: Option<PathBuf>,
    /// Inline shell command to execute.
    #[serde(default)]
    pub command: Option<String>,
}

/// What a proxy tool runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// An executable script, by canonical path.
    Script(PathBuf),
    /// A command line passed to `shell -c`.
    Command(String),
}

/// A registered proxy tool.
#[derive(Debug, Clone)]
pub struct ProxyTool {
    /// Name, description and parameters.
    pub tool: Tool,
    /// What the tool runs.
    pub action: Action,
}

impl ProxyTool {
    /// Validates `spec` and turns it into a tool.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, the parameter list does not
    /// parse, not exactly one of script and command is given, or the script
    /// fails validation.
    pub fn register(spec: ProxyToolSpec) -> Result<Self, RegistrationError> {
        if spec.name.trim().is_empty() {
            return Err(RegistrationError::EmptyName("tool"));
        }
        let parameters = Parameter::parse_spec(&spec.parameters)?;

        let action = match (spec.script, spec.command) {
            (Some(script), None) => Action::Script(validate_script(&script)?),
            (None, Some(command)) if !command.trim().is_empty() => Action::Command(command),
            _ => return Err(RegistrationError::ScriptOrCommand(spec.name)),
        };

        Ok(Self {
            tool: Tool {
                name: spec.name,
                description: spec.description,
                parameters,
            },
            action,
        })
    }

    /// Checks `arguments` against the declared parameters.
    fn check_arguments(&self, arguments: &Map<String, Value>) -> Result<(), HandlerError> {
        for param in &self.tool.parameters {
            let value = arguments.get(&param.name).ok_or_else(|| {
                HandlerError::InvalidParams(format!("missing argument '{}'", param.name))
            })?;
            if !param.ty.accepts(value) {
                return Err(HandlerError::InvalidParams(format!(
                    "argument '{}' must be of type {}, got {value}",
                    param.name, param.ty
                )));
            }
        }

        if let Some(bad) = arguments.keys().find(|k| !is_env_name(k)) {
            return Err(HandlerError::InvalidParams(format!(
                "argument name '{bad}' cannot be used as an environment variable"
            )));
        }
        Ok(())
    }
}

fn is_env_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['=', '\0'])
}

/// Canonicalises `path` and checks it is an executable regular file.
///
/// # Errors
///
/// Returns [`RegistrationError::InvalidScript`] if the path does not exist,
/// is a directory, or has no executable bit set.
pub fn validate_script(path: &Path) -> Result<PathBuf, RegistrationError> {
    let invalid = |reason: String| RegistrationError::InvalidScript {
        path: path.to_path_buf(),
        reason,
    };

    let canonical = path
        .canonicalize()
        .map_err(|e| invalid(format!("cannot resolve path: {e}")))?;
    let metadata = canonical
        .metadata()
        .map_err(|e| invalid(format!("cannot read metadata: {e}")))?;

    if metadata.is_dir() {
        return Err(invalid("is a directory".to_string()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(invalid("is not executable".to_string()));
        }
    }

    Ok(canonical)
}

/// Finds a shell, preferring `bash` over `sh`.
#[must_use]
pub fn detect_shell() -> PathBuf {
    ["bash", "sh"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SHELL))
}

/// Registry of proxy tools.
#[derive(Debug)]
pub struct ProxyResponder {
    tools: Vec<ProxyTool>,
    shell: PathBuf,
}

impl Default for ProxyResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyResponder {
    /// Creates an empty responder using the detected shell.
    #[must_use]
    pub fn new() -> Self {
        Self::with_shell(detect_shell())
    }

    /// Creates an empty responder running tools through `shell`.
    #[must_use]
    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            tools: Vec::new(),
            shell: shell.into(),
        }
    }

    /// Builds a responder from the `proxy` section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first registration failure.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, RegistrationError> {
        let mut responder = Self::new();
        for spec in &config.tools {
            responder.register(spec.clone())?;
        }
        Ok(responder)
    }

    /// Validates and registers a tool.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the name is already taken.
    pub fn register(&mut self, spec: ProxyToolSpec) -> Result<(), RegistrationError> {
        if self.tools.iter().any(|t| t.tool.name == spec.name) {
            return Err(RegistrationError::Duplicate {
                kind: "tool",
                name: spec.name,
            });
        }
        let tool = ProxyTool::register(spec)?;
        info!(tool = %tool.tool.name, action = ?tool.action, "Registered proxy tool");
        self.tools.push(tool);
        Ok(())
    }

    async fn run(
        &self,
        tool: &ProxyTool,
        arguments: &Map<String, Value>,
    ) -> Result<String, HandlerError> {
        let mut command = Command::new(&self.shell);
        match &tool.action {
            Action::Script(path) => {
                let path =
                    validate_script(path).map_err(|e| HandlerError::Execution(e.to_string()))?;
                command.arg(path);
            }
            Action::Command(line) => {
                command.arg("-c").arg(line);
            }
        }

        command
            .envs(arguments.iter().map(|(k, v)| (k, display_value(v))))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        debug!(tool = %tool.tool.name, shell = %self.shell.display(), "Running proxy tool");
        let run_failed = |e: std::io::Error| {
            HandlerError::Execution(format!("failed to run {}: {e}", self.shell.display()))
        };
        // `output()` would re-pipe stderr; spawn keeps it inherited
        let child = command.spawn().map_err(run_failed)?;
        let output = child.wait_with_output().await.map_err(run_failed)?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            warn!(tool = %tool.tool.name, status = %output.status, "Proxy tool failed");
            return Err(HandlerError::Execution(format!(
                "'{}' exited with {}: {}",
                tool.tool.name,
                output.status,
                stdout.trim()
            )));
        }
        Ok(stdout)
    }
}

impl Handler for ProxyResponder {
    fn server_info(&self) -> Implementation {
        Implementation {
            name: format!("{} proxy", env!("CARGO_PKG_NAME")),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn inventory(&self) -> Inventory {
        Inventory {
            tools: self.tools.len(),
            ..Inventory::default()
        }
    }

    fn list_tools(&self) -> ResultMap {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.tool.name,
                    "description": t.tool.description,
                    "inputSchema": t.tool.input_schema(),
                })
            })
            .collect();
        into_result_map(json!({ "tools": tools }))
    }

    async fn call_tool(&self, call: ToolCall) -> Result<ResultMap, HandlerError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.tool.name == call.name)
            .ok_or_else(|| HandlerError::NotFound {
                kind: "tool",
                name: call.name.clone(),
            })?;

        tool.check_arguments(&call.arguments)?;
        let stdout = self.run(tool, &call.arguments).await?;
        Ok(to_result_map(&ToolCallResult::text(stdout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(name: &str, parameters: &str, command: &str) -> ProxyToolSpec {
        ProxyToolSpec {
            name: name.to_string(),
            description: format!("{name} tool"),
            parameters: parameters.to_string(),
            script: None,
            command: Some(command.to_string()),
        }
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments: arguments.as_object().cloned().unwrap_or_default(),
        }
    }

    fn text(result: &ResultMap) -> &str {
        result["content"][0]["text"].as_str().unwrap()
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn register_requires_exactly_one_action() {
        let mut spec = inline("t", "", "true");
        spec.script = Some(PathBuf::from("/bin/true"));
        assert!(matches!(
            ProxyTool::register(spec),
            Err(RegistrationError::ScriptOrCommand(_))
        ));

        let mut neither = inline("t", "", "true");
        neither.command = None;
        assert!(matches!(
            ProxyTool::register(neither),
            Err(RegistrationError::ScriptOrCommand(_))
        ));
    }

    #[test]
    fn register_rejects_bad_parameters_and_duplicates() {
        assert!(matches!(
            ProxyTool::register(inline("t", "a:list", "true")),
            Err(RegistrationError::InvalidType { .. })
        ));

        let mut proxy = ProxyResponder::with_shell(DEFAULT_SHELL);
        proxy.register(inline("t", "", "true")).unwrap();
        assert!(matches!(
            proxy.register(inline("t", "", "false")),
            Err(RegistrationError::Duplicate { .. })
        ));
    }

    #[test]
    fn register_rejects_missing_script_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = inline("t", "", "");
        spec.command = None;

        spec.script = Some(dir.path().join("absent.sh"));
        assert!(matches!(
            ProxyTool::register(spec.clone()),
            Err(RegistrationError::InvalidScript { .. })
        ));

        spec.script = Some(dir.path().to_path_buf());
        let err = ProxyTool::register(spec).unwrap_err();
        assert!(err.to_string().contains("directory"));
    }

    #[cfg(unix)]
    #[test]
    fn register_rejects_non_executable_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "plain.sh", "echo hi\n", 0o644);
        let err = validate_script(&path).unwrap_err();
        assert!(err.to_string().contains("not executable"));
    }

    #[test]
    fn list_tools_synthesises_schema() {
        let mut proxy = ProxyResponder::with_shell(DEFAULT_SHELL);
        proxy
            .register(inline("add", "a:int,b:float", "echo"))
            .unwrap();
        let list = proxy.list_tools();
        assert_eq!(
            list["tools"][0]["inputSchema"],
            json!({
                "type": "object",
                "properties": {
                    "a": { "type": "integer" },
                    "b": { "type": "number" }
                },
                "required": ["a", "b"]
            })
        );
        assert_eq!(proxy.inventory().tools, 1);
        assert_eq!(proxy.inventory().prompts, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_sums_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "sum.sh",
            "#!/bin/sh\necho $((a + b))\n",
            0o755,
        );

        let mut proxy = ProxyResponder::new();
        proxy
            .register(ProxyToolSpec {
                name: "sum".into(),
                description: "Adds a and b".into(),
                parameters: "a:int,b:int".into(),
                script: Some(script),
                command: None,
            })
            .unwrap();

        let result = proxy
            .call_tool(call("sum", json!({ "a": 3, "b": 4 })))
            .await
            .unwrap();
        assert!(text(&result).contains('7'));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn inline_command_sees_string_arguments() {
        let mut proxy = ProxyResponder::new();
        proxy
            .register(inline("greet", "who:string", "printf 'hi %s' \"$who\""))
            .unwrap();
        let result = proxy
            .call_tool(call("greet", json!({ "who": "there" })))
            .await
            .unwrap();
        assert_eq!(text(&result), "hi there");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stderr_alone_is_not_a_failure() {
        let mut proxy = ProxyResponder::new();
        proxy
            .register(inline("noisy", "", "echo warn >&2; echo ok"))
            .unwrap();
        let result = proxy.call_tool(call("noisy", json!({}))).await.unwrap();
        assert_eq!(text(&result), "ok\n");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn stderr_is_inherited_not_captured() {
        let mut proxy = ProxyResponder::new();
        proxy
            .register(inline(
                "where",
                "",
                "echo 'diagnostic line' >&2; readlink /proc/$$/fd/2",
            ))
            .unwrap();
        let result = proxy.call_tool(call("where", json!({}))).await.unwrap();

        let ours = std::fs::read_link("/proc/self/fd/2").unwrap();
        assert_eq!(text(&result).trim(), ours.display().to_string());
        assert!(!text(&result).contains("diagnostic line"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_execution_error() {
        let mut proxy = ProxyResponder::new();
        proxy
            .register(inline("fail", "", "echo partial; exit 3"))
            .unwrap();
        let err = proxy.call_tool(call("fail", json!({}))).await.unwrap_err();
        assert!(matches!(err, HandlerError::Execution(_)));
        let message = err.to_string();
        assert!(message.contains("partial"));
        assert!(message.contains('3'));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_is_revalidated_at_call_time() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "gone.sh", "#!/bin/sh\necho hi\n", 0o755);

        let mut proxy = ProxyResponder::new();
        proxy
            .register(ProxyToolSpec {
                name: "gone".into(),
                description: String::new(),
                parameters: String::new(),
                script: Some(script.clone()),
                command: None,
            })
            .unwrap();

        std::fs::remove_file(&script).unwrap();
        let err = proxy.call_tool(call("gone", json!({}))).await.unwrap_err();
        assert!(matches!(err, HandlerError::Execution(_)));
    }

    #[tokio::test]
    async fn arguments_are_checked_before_running() {
        let mut proxy = ProxyResponder::with_shell(DEFAULT_SHELL);
        proxy.register(inline("add", "a:int,b:int", "exit 9")).unwrap();

        let missing = proxy
            .call_tool(call("add", json!({ "a": 1 })))
            .await
            .unwrap_err();
        assert!(matches!(missing, HandlerError::InvalidParams(_)));

        let wrong_type = proxy
            .call_tool(call("add", json!({ "a": 1, "b": "two" })))
            .await
            .unwrap_err();
        assert!(wrong_type.to_string().contains("'b'"));

        let bad_name = proxy
            .call_tool(call("add", json!({ "a": 1, "b": 2, "x=y": 3 })))
            .await
            .unwrap_err();
        assert!(matches!(bad_name, HandlerError::InvalidParams(_)));

        let unknown = proxy.call_tool(call("nope", json!({}))).await.unwrap_err();
        assert!(matches!(unknown, HandlerError::NotFound { kind: "tool", .. }));
    }

    #[test]
    fn spec_parses_from_config_json() {
        let spec: ProxyToolSpec = serde_json::from_value(json!({
            "name": "sum",
            "parameters": "a:int",
            "script": "/usr/local/bin/sum.sh"
        }))
        .unwrap();
        assert_eq!(spec.script, Some(PathBuf::from("/usr/local/bin/sum.sh")));
        assert!(spec.command.is_none());
    }
}
