//! Tools, prompts and resources exposed by the responders.
//!
//! Parameter types accept the usual synonyms (`str`, `integer`, `double`,
//! `boolean`, ...) and are normalised to one of four canonical kinds.
//! Prompt templates use `{{name}}` placeholders.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::RegistrationError;

/// Canonical parameter type of a tool argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ParamType {
    /// Free-form text.
    String,
    /// Whole number.
    Int,
    /// Floating point number.
    Float,
    /// `true` / `false`.
    Bool,
}

impl ParamType {
    /// Normalises a type name, accepting common synonyms.
    ///
    /// Returns `None` for anything outside string, int, float and bool.
    #[must_use]
    pub fn normalize(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Some(Self::String),
            "int" | "integer" | "long" => Some(Self::Int),
            "float" | "double" | "number" | "decimal" => Some(Self::Float),
            "bool" | "boolean" => Some(Self::Bool),
            _ => None,
        }
    }

    /// Canonical name of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
        }
    }

    /// JSON Schema type keyword for this type.
    #[must_use]
    pub const fn json_schema_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "integer",
            Self::Float => "number",
            Self::Bool => "boolean",
        }
    }

    /// Returns `true` if `value` is acceptable for this type.
    ///
    /// Strings are accepted when they parse as the declared type, since
    /// arguments end up as environment variables either way.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, _) => true,
            (Self::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Float, Value::Number(_)) | (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::String(s)) => s.trim().parse::<i64>().is_ok(),
            (Self::Float, Value::String(s)) => s.trim().parse::<f64>().is_ok(),
            (Self::Bool, Value::String(s)) => s.trim().parse::<bool>().is_ok(),
            _ => false,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s).ok_or_else(|| format!("unknown parameter type '{s}'"))
    }
}

impl TryFrom<String> for ParamType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ParamType> for String {
    fn from(value: ParamType) -> Self {
        value.as_str().to_string()
    }
}

/// A named, typed tool parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name; also the environment variable name for proxy tools.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub ty: ParamType,
}

impl Parameter {
    /// Parses a comma-separated `name:type` list such as `a:int,b:int`.
    ///
    /// An empty or blank spec yields no parameters.
    ///
    /// # Errors
    ///
    /// Returns an error for entries without a colon, with an empty name, or
    /// with a type outside string, int, float and bool.
    pub fn parse_spec(spec: &str) -> Result<Vec<Self>, RegistrationError> {
        if spec.trim().is_empty() {
            return Ok(Vec::new());
        }

        spec.split(',')
            .map(|entry| {
                let (name, ty) = entry
                    .split_once(':')
                    .ok_or_else(|| RegistrationError::MalformedParameter(entry.to_string()))?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(RegistrationError::EmptyParameterName(entry.to_string()));
                }
                let ty = ParamType::normalize(ty).ok_or_else(|| RegistrationError::InvalidType {
                    name: name.to_string(),
                    ty: ty.trim().to_string(),
                })?;
                Ok(Self {
                    name: name.to_string(),
                    ty,
                })
            })
            .collect()
    }
}

/// A tool registered with a responder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Ordered parameter list.
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl Tool {
    /// Creates a tool without parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Builds a JSON Schema object describing this tool's input.
    ///
    /// Every declared parameter is required.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), json!({ "type": p.ty.json_schema_type() })))
            .collect();
        let required: Vec<&str> = self.parameters.iter().map(|p| p.name.as_str()).collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A prompt template registered with a responder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Prompt {
    /// Unique prompt name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Template text containing `{{argName}}` placeholders.
    pub template: String,
}

impl Prompt {
    /// Creates a prompt.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            template: template.into(),
        }
    }

    /// Names of the arguments the template requires.
    #[must_use]
    pub fn arguments(&self) -> Vec<String> {
        extract_arguments(&self.template)
    }

    /// Substitutes the supplied arguments into the template.
    #[must_use]
    pub fn render(&self, arguments: &Map<String, Value>) -> String {
        render_template(&self.template, arguments)
    }
}

/// A static resource registered with a responder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Resource {
    /// Unique resource URI.
    pub uri: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Resource body.
    #[serde(default)]
    pub content: String,
}

impl Resource {
    /// Creates a resource.
    #[must_use]
    pub fn new(
        uri: impl Into<String>,
        description: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            description: description.into(),
            content: content.into(),
        }
    }
}

/// One `{{...}}` occurrence in a template.
struct Placeholder<'a> {
    /// Byte range of the whole `{{...}}` marker.
    start: usize,
    end: usize,
    /// Trimmed name between the braces.
    name: &'a str,
}

/// Scans `template` left to right for paired `{{`/`}}` markers.
///
/// An opening marker without a closing one ends the scan.
fn placeholders(template: &str) -> Vec<Placeholder<'_>> {
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(open) = template[cursor..].find("{{") {
        let start = cursor + open;
        let inner = start + 2;
        let Some(close) = template[inner..].find("}}") else {
            break;
        };
        let end = inner + close + 2;
        found.push(Placeholder {
            start,
            end,
            name: template[inner..inner + close].trim(),
        });
        cursor = end;
    }

    found
}

/// Extracts the distinct placeholder names of a template, in order of first
/// occurrence. Blank placeholders are ignored.
#[must_use]
pub fn extract_arguments(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for placeholder in placeholders(template) {
        if !placeholder.name.is_empty() && !names.iter().any(|n| n == placeholder.name) {
            names.push(placeholder.name.to_string());
        }
    }
    names
}

/// Replaces every placeholder with the string form of its argument.
///
/// Placeholders without a supplied argument are left untouched.
#[must_use]
pub fn render_template(template: &str, arguments: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;

    for placeholder in placeholders(template) {
        if let Some(value) = arguments.get(placeholder.name) {
            out.push_str(&template[cursor..placeholder.start]);
            out.push_str(&display_value(value));
            cursor = placeholder.end;
        }
    }
    out.push_str(&template[cursor..]);
    out
}

/// Renders a JSON value as plain text: strings verbatim, everything else in
/// its JSON form.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
