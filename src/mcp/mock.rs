//! In-memory mock responder.
//!
//! Answers every registered tool with a fixed confirmation line, serves
//! resources as `text/plain` and renders prompt templates. Useful for
//! checking that a client speaks MCP correctly without a real server.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::MockConfig;
use crate::error::{HandlerError, RegistrationError};
use crate::mcp::model::{Prompt, Resource, Tool};
use crate::mcp::protocol::{into_result_map, to_result_map, Implementation, ResultMap, ToolCallResult};
use crate::mcp::server::{Handler, Inventory, ToolCall};

/// MIME type reported for every mock resource.
pub const MIME_TYPE: &str = "text/plain";

/// Registry of mock tools, prompts and resources.
#[derive(Debug, Default)]
pub struct MockResponder {
    tools: Vec<Tool>,
    prompts: Vec<Prompt>,
    resources: Vec<Resource>,
}

impl MockResponder {
    /// Creates an empty responder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a responder from the `mock` section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry has an empty name or is registered twice.
    pub fn from_config(config: &MockConfig) -> Result<Self, RegistrationError> {
        let mut responder = Self::new();
        for tool in &config.tools {
            responder.add_tool(tool.clone())?;
        }
        for prompt in &config.prompts {
            responder.add_prompt(prompt.clone())?;
        }
        for resource in &config.resources {
            responder.add_resource(resource.clone())?;
        }
        Ok(responder)
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or already taken.
    pub fn add_tool(&mut self, tool: Tool) -> Result<(), RegistrationError> {
        check_key("tool", &tool.name, self.tools.iter().map(|t| t.name.as_str()))?;
        self.tools.push(tool);
        Ok(())
    }

    /// Registers a prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or already taken.
    pub fn add_prompt(&mut self, prompt: Prompt) -> Result<(), RegistrationError> {
        check_key(
            "prompt",
            &prompt.name,
            self.prompts.iter().map(|p| p.name.as_str()),
        )?;
        self.prompts.push(prompt);
        Ok(())
    }

    /// Registers a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is empty or already taken.
    pub fn add_resource(&mut self, resource: Resource) -> Result<(), RegistrationError> {
        check_key(
            "resource",
            &resource.uri,
            self.resources.iter().map(|r| r.uri.as_str()),
        )?;
        self.resources.push(resource);
        Ok(())
    }

    fn tool(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// Rejects empty keys and keys already present in `existing`.
fn check_key<'a>(
    kind: &'static str,
    key: &str,
    mut existing: impl Iterator<Item = &'a str>,
) -> Result<(), RegistrationError> {
    if key.trim().is_empty() {
        return Err(RegistrationError::EmptyName(kind));
    }
    if existing.any(|k| k == key) {
        return Err(RegistrationError::Duplicate {
            kind,
            name: key.to_string(),
        });
    }
    Ok(())
}

/// The fixed reply of a mock tool.
#[must_use]
pub fn confirmation(name: &str) -> String {
    format!("hello i am {name} mock tool and i confirm it's working")
}

impl Handler for MockResponder {
    fn server_info(&self) -> Implementation {
        Implementation {
            name: format!("{} mock", env!("CARGO_PKG_NAME")),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn inventory(&self) -> Inventory {
        Inventory {
            tools: self.tools.len(),
            prompts: self.prompts.len(),
            resources: self.resources.len(),
        }
    }

    fn list_tools(&self) -> ResultMap {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": { "type": "object", "properties": {} },
                })
            })
            .collect();
        into_result_map(json!({ "tools": tools }))
    }

    async fn call_tool(&self, call: ToolCall) -> Result<ResultMap, HandlerError> {
        let tool = self.tool(&call.name).ok_or_else(|| HandlerError::NotFound {
            kind: "tool",
            name: call.name.clone(),
        })?;
        debug!(tool = %tool.name, arguments = call.arguments.len(), "Mock tool called");
        Ok(to_result_map(&ToolCallResult::text(confirmation(&tool.name))))
    }

    fn list_resources(&self) -> ResultMap {
        let resources: Vec<Value> = self
            .resources
            .iter()
            .map(|r| {
                json!({
                    "uri": r.uri,
                    "name": r.uri,
                    "description": r.description,
                    "mimeType": MIME_TYPE,
                })
            })
            .collect();
        into_result_map(json!({ "resources": resources }))
    }

    fn read_resource(&self, uri: &str) -> Result<ResultMap, HandlerError> {
        let resource = self
            .resources
            .iter()
            .find(|r| r.uri == uri)
            .ok_or_else(|| HandlerError::NotFound {
                kind: "resource",
                name: uri.to_string(),
            })?;

        Ok(into_result_map(json!({
            "contents": [{
                "uri": resource.uri,
                "mimeType": MIME_TYPE,
                "text": resource.content,
            }]
        })))
    }

    fn list_prompts(&self) -> ResultMap {
        let prompts: Vec<Value> = self
            .prompts
            .iter()
            .map(|p| {
                let arguments: Vec<Value> = p
                    .arguments()
                    .into_iter()
                    .map(|name| json!({ "name": name, "required": true }))
                    .collect();
                json!({
                    "name": p.name,
                    "description": p.description,
                    "arguments": arguments,
                })
            })
            .collect();
        into_result_map(json!({ "prompts": prompts }))
    }

    fn get_prompt(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<ResultMap, HandlerError> {
        let prompt = self
            .prompts
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| HandlerError::NotFound {
                kind: "prompt",
                name: name.to_string(),
            })?;

        Ok(into_result_map(json!({
            "description": prompt.description,
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": prompt.render(arguments) },
            }]
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responder() -> MockResponder {
        let mut mock = MockResponder::new();
        mock.add_tool(Tool::new("weather", "Reports the weather")).unwrap();
        mock.add_prompt(Prompt::new(
            "greet",
            "Greets someone",
            "Hello {{name}}, welcome to {{ place }}. Bye {{name}}.",
        ))
        .unwrap();
        mock.add_resource(Resource::new("docs://readme", "Readme", "read me"))
            .unwrap();
        mock
    }

    fn call(name: &str) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments: Map::new(),
        }
    }

    #[tokio::test]
    async fn call_returns_confirmation() {
        let result = responder().call_tool(call("weather")).await.unwrap();
        assert_eq!(
            Value::Object(result),
            json!({
                "content": [{
                    "type": "text",
                    "text": "hello i am weather mock tool and i confirm it's working"
                }]
            })
        );
    }

    #[tokio::test]
    async fn call_unknown_tool_is_not_found() {
        let err = responder().call_tool(call("nope")).await.unwrap_err();
        assert_eq!(
            err,
            HandlerError::NotFound {
                kind: "tool",
                name: "nope".into()
            }
        );
    }

    #[test]
    fn tools_accept_any_arguments() {
        let list = responder().list_tools();
        assert_eq!(
            list["tools"][0]["inputSchema"],
            json!({ "type": "object", "properties": {} })
        );
    }

    #[test]
    fn resources_are_plain_text() {
        let mock = responder();
        assert_eq!(mock.list_resources()["resources"][0]["mimeType"], MIME_TYPE);

        let read = mock.read_resource("docs://readme").unwrap();
        assert_eq!(read["contents"][0]["text"], "read me");
        assert_eq!(read["contents"][0]["mimeType"], "text/plain");

        assert!(matches!(
            mock.read_resource("docs://missing"),
            Err(HandlerError::NotFound { kind: "resource", .. })
        ));
    }

    #[test]
    fn prompts_list_required_arguments() {
        let list = responder().list_prompts();
        assert_eq!(
            list["prompts"][0]["arguments"],
            json!([
                { "name": "name", "required": true },
                { "name": "place", "required": true }
            ])
        );
    }

    #[test]
    fn get_prompt_renders_single_user_message() {
        let mut args = Map::new();
        args.insert("name".into(), json!("Ada"));
        args.insert("place".into(), json!(42));

        let result = responder().get_prompt("greet", &args).unwrap();
        let messages = result["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(
            messages[0]["content"]["text"],
            "Hello Ada, welcome to 42. Bye Ada."
        );

        assert!(matches!(
            responder().get_prompt("missing", &args),
            Err(HandlerError::NotFound { kind: "prompt", .. })
        ));
    }

    #[test]
    fn duplicates_and_empty_names_are_rejected() {
        let mut mock = responder();
        assert!(matches!(
            mock.add_tool(Tool::new("weather", "again")),
            Err(RegistrationError::Duplicate { kind: "tool", .. })
        ));
        assert!(matches!(
            mock.add_resource(Resource::new(" ", "", "")),
            Err(RegistrationError::EmptyName("resource"))
        ));
    }

    #[test]
    fn inventory_counts_entries() {
        assert_eq!(
            responder().inventory(),
            Inventory {
                tools: 1,
                prompts: 1,
                resources: 1
            }
        );
    }

    #[test]
    fn from_config_registers_everything() {
        let config: MockConfig = serde_json::from_value(json!({
            "tools": [{ "name": "a" }, { "name": "b", "description": "B" }],
            "resources": [{ "uri": "mem://x", "content": "x" }]
        }))
        .unwrap();
        let mock = MockResponder::from_config(&config).unwrap();
        assert_eq!(mock.inventory().tools, 2);
        assert_eq!(mock.inventory().resources, 1);
        assert_eq!(mock.inventory().prompts, 0);
    }
}
