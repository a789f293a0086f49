//! HTTP transport.
//!
//! HTTP servers expose a REST-style subset of MCP without a JSON-RPC
//! envelope:
//!
//! | method           | request                        |
//! |------------------|--------------------------------|
//! | `tools/list`     | `GET /v1/tools`                |
//! | `resources/list` | `GET /v1/resources`            |
//! | `tools/call`     | `POST /v1/tools/{name}`        |
//!
//! The body of a successful response is the result object itself.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::config::HttpConfig;
use crate::error::TransportError;
use crate::mcp::protocol::{methods, ResultMap};

/// A transport talking to an MCP server's REST endpoints.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Creates a transport rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Url, config: &HttpConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, base_url })
    }

    /// Maps `method` onto its endpoint, performs the request and decodes the
    /// body as the result object.
    ///
    /// # Errors
    ///
    /// Returns an error for unsupported methods, bad `tools/call` params,
    /// network failures, non-2xx statuses and bodies that are not a JSON
    /// object. Method and params are checked before any network traffic.
    pub async fn execute(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<ResultMap, TransportError> {
        let endpoint = Endpoint::resolve(method, params.as_ref())?;
        let url = endpoint.url(&self.base_url)?;
        debug!(method, %url, "Sending HTTP request");

        let request = match &endpoint {
            Endpoint::ListTools | Endpoint::ListResources => self.http.get(url),
            Endpoint::CallTool { arguments, .. } => {
                let request = self.http.post(url);
                match arguments {
                    Some(arguments) => request.json(arguments),
                    None => request,
                }
            }
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|source| TransportError::MalformedResponse { raw: body, source })
    }
}

/// A resolved REST endpoint.
#[derive(Debug, Clone, PartialEq)]
enum Endpoint {
    ListTools,
    ListResources,
    CallTool {
        name: String,
        /// Request body; `None` when there are no arguments.
        arguments: Option<Map<String, Value>>,
    },
}

impl Endpoint {
    fn resolve(method: &str, params: Option<&Value>) -> Result<Self, TransportError> {
        match method {
            methods::TOOLS_LIST => Ok(Self::ListTools),
            methods::RESOURCES_LIST => Ok(Self::ListResources),
            methods::TOOLS_CALL => {
                let params = params.and_then(Value::as_object).ok_or_else(|| {
                    TransportError::InvalidParams("tools/call requires an object".to_string())
                })?;
                let name = params.get("name").and_then(Value::as_str).ok_or_else(|| {
                    TransportError::InvalidParams(
                        "tools/call requires a string 'name'".to_string(),
                    )
                })?;
                let arguments = match params.get("arguments") {
                    None | Some(Value::Null) => None,
                    Some(Value::Object(args)) if args.is_empty() => None,
                    Some(Value::Object(args)) => Some(args.clone()),
                    Some(_) => {
                        return Err(TransportError::InvalidParams(
                            "tools/call 'arguments' must be an object".to_string(),
                        ))
                    }
                };
                Ok(Self::CallTool {
                    name: name.to_string(),
                    arguments,
                })
            }
            other => Err(TransportError::UnsupportedMethod(other.to_string())),
        }
    }

    fn url(&self, base: &Url) -> Result<Url, TransportError> {
        let mut url = base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| TransportError::InvalidUrl(base.to_string()))?;
            segments.pop_if_empty();
            match self {
                Self::ListTools => segments.extend(["v1", "tools"]),
                Self::ListResources => segments.extend(["v1", "resources"]),
                Self::CallTool { name, .. } => segments.extend(["v1", "tools", name.as_str()]),
            };
        }
        Ok(url)
    }
}
