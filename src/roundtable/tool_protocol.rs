//! Tool abstraction shared by tool-using agents.
//!
//! A [`Tool`] describes itself through [`ToolMetadata`] and executes against JSON
//! parameters. Tools are collected in a [`ToolRegistry`], which validates
//! parameters against the declared metadata before dispatching.
//!
//! ```text
//! ExpertAgent / ToolAgent → ToolRegistry → Tool (trait) → [Calculator | HttpTool | user-defined]
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use roundtable::tool_protocol::{ToolParameter, ToolParameterType};
//!
//! let param = ToolParameter::new("a", ToolParameterType::Number)
//!     .with_description("First operand")
//!     .required();
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Outcome of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// `false` when the tool ran but reports a failure.
    pub success: bool,
    pub output: serde_json::Value,
    pub error: Option<String>,
    /// Side information such as an HTTP status code.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolResult {
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Text form of the output as it is shown to a model or returned by a [`ToolAgent`](crate::tool_agent::ToolAgent).
    pub fn output_text(&self) -> String {
        match &self.output {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// JSON type a tool parameter must have.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ToolParameterType {
    fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match self {
            ToolParameterType::String => value.is_string(),
            ToolParameterType::Number => value.is_number(),
            ToolParameterType::Integer => value.is_i64() || value.is_u64(),
            ToolParameterType::Boolean => value.is_boolean(),
            ToolParameterType::Array => matches!(value, Value::Array(_)),
            ToolParameterType::Object => matches!(value, Value::Object(_)),
        }
    }
}

impl fmt::Display for ToolParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolParameterType::String => "string",
            ToolParameterType::Number => "number",
            ToolParameterType::Integer => "integer",
            ToolParameterType::Boolean => "boolean",
            ToolParameterType::Array => "array",
            ToolParameterType::Object => "object",
        };
        f.write_str(name)
    }
}

/// One named argument of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<serde_json::Value>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            default: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the argument as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Provide a default value used when the caller omits the parameter.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Name, purpose and argument list of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// One-paragraph description used in system prompts.
    pub fn describe(&self) -> String {
        let mut out = format!("- {}: {}\n", self.name, self.description);
        for param in &self.parameters {
            out.push_str(&format!(
                "  - {} ({}{}){}\n",
                param.name,
                param.param_type,
                if param.required { ", required" } else { "" },
                param
                    .description
                    .as_deref()
                    .map(|d| format!(": {}", d))
                    .unwrap_or_default()
            ));
        }
        out
    }

    /// Check `parameters` against the declared parameter list and fill in defaults.
    ///
    /// Unknown keys are passed through untouched.
    pub fn validate(&self, parameters: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let mut object = match parameters {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(ToolError::InvalidParameters(format!(
                    "expected a JSON object, got {}",
                    other
                )))
            }
        };

        for param in &self.parameters {
            match object.get(&param.name) {
                Some(value) if !value.is_null() => {
                    if !param.param_type.accepts(value) {
                        return Err(ToolError::InvalidParameters(format!(
                            "parameter '{}' must be of type {}",
                            param.name, param.param_type
                        )));
                    }
                }
                _ => {
                    if let Some(default) = &param.default {
                        object.insert(param.name.clone(), default.clone());
                    } else if param.required {
                        return Err(ToolError::InvalidParameters(format!(
                            "missing required parameter '{}'",
                            param.name
                        )));
                    }
                }
            }
        }

        Ok(serde_json::Value::Object(object))
    }
}

/// Why a tool could not produce a [`ToolResult`].
#[derive(Debug, Clone)]
pub enum ToolError {
    NotFound(String),
    ExecutionFailed(String),
    /// Parameters are not an object, miss a required key or have the wrong type.
    InvalidParameters(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool not found: {}", name),
            ToolError::ExecutionFailed(msg) => write!(f, "Tool execution failed: {}", msg),
            ToolError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// A capability an agent can invoke with JSON parameters.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static description of the tool interface.
    fn metadata(&self) -> &ToolMetadata;

    /// Execute the tool. Parameters have already been validated against
    /// [`metadata`](Tool::metadata) when called through a [`ToolRegistry`].
    async fn execute(&self, parameters: serde_json::Value) -> Result<ToolResult, ToolError>;
}

/// Named tools an agent may call.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tool, keyed by its metadata name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.metadata().name.clone();
        if self.tools.insert(name.clone(), tool).is_some() {
            log::debug!("tool '{}' replaced in registry", name);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Metadata of every registered tool, sorted by name.
    pub fn list(&self) -> Vec<&ToolMetadata> {
        let mut tools: Vec<&ToolMetadata> = self.tools.values().map(|t| t.metadata()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up `tool_name`, validate `parameters` against its metadata and run it.
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        let parameters = tool.metadata().validate(parameters)?;
        log::debug!("executing tool '{}'", tool_name);
        tool.execute(parameters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool {
        metadata: ToolMetadata,
    }

    impl EchoTool {
        fn new() -> Self {
            Self {
                metadata: ToolMetadata::new("echo", "Echoes its text parameter")
                    .with_parameter(ToolParameter::new("text", ToolParameterType::String).required())
                    .with_parameter(
                        ToolParameter::new("times", ToolParameterType::Integer)
                            .with_default(json!(1)),
                    ),
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn metadata(&self) -> &ToolMetadata {
            &self.metadata
        }

        async fn execute(&self, parameters: serde_json::Value) -> Result<ToolResult, ToolError> {
            let text = parameters["text"].as_str().unwrap_or_default();
            let times = parameters["times"].as_u64().unwrap_or(1) as usize;
            Ok(ToolResult::success(json!(text.repeat(times))))
        }
    }

    #[test]
    fn test_parameter_type_checks() {
        assert!(ToolParameterType::Number.accepts(&json!(2)));
        assert!(ToolParameterType::Number.accepts(&json!(2.5)));
        assert!(!ToolParameterType::Integer.accepts(&json!(2.5)));
        assert!(ToolParameterType::Array.accepts(&json!([])));
        assert!(!ToolParameterType::Object.accepts(&json!("{}")));
        assert_eq!(ToolParameterType::Boolean.to_string(), "boolean");
    }

    #[tokio::test]
    async fn test_registry_applies_defaults() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new()));

        let result = registry
            .execute_tool("echo", json!({"text": "hi"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output_text(), "hi");

        let result = registry
            .execute_tool("echo", json!({"text": "ab", "times": 2}))
            .await
            .unwrap();
        assert_eq!(result.output_text(), "abab");
    }

    #[tokio::test]
    async fn test_registry_rejects_bad_parameters() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new()));

        let missing = registry.execute_tool("echo", json!({})).await;
        assert!(matches!(missing, Err(ToolError::InvalidParameters(_))));

        let wrong_type = registry.execute_tool("echo", json!({"text": 5})).await;
        assert!(matches!(wrong_type, Err(ToolError::InvalidParameters(_))));

        let not_object = registry.execute_tool("echo", json!([1, 2])).await;
        assert!(matches!(not_object, Err(ToolError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_registry_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute_tool("nope", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Tool not found: nope");
    }

    #[test]
    fn test_describe_lists_parameters() {
        let description = EchoTool::new().metadata.describe();
        assert!(description.starts_with("- echo: Echoes its text parameter"));
        assert!(description.contains("text (string, required)"));
        assert!(description.contains("times (integer)"));
    }
}
