//! # Calculator Tool
//!
//! Binary arithmetic on two numbers: `add`, `subtract`, `multiply`, `divide`.
//!
//! ```rust
//! use roundtable::tool_protocol::Tool;
//! use roundtable::tools::Calculator;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let calc = Calculator::new();
//! let result = calc
//!     .execute(json!({"a": 6, "b": 7, "operation": "multiply"}))
//!     .await
//!     .unwrap();
//! assert_eq!(result.output, json!(42.0));
//! # }
//! ```

use crate::roundtable::tool_protocol::{
    Tool, ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolResult,
};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// Supported operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    pub fn apply(self, a: f64, b: f64) -> Result<f64, ToolError> {
        match self {
            Operation::Add => Ok(a + b),
            Operation::Subtract => Ok(a - b),
            Operation::Multiply => Ok(a * b),
            Operation::Divide if b == 0.0 => {
                Err(ToolError::ExecutionFailed("division by zero".to_string()))
            }
            Operation::Divide => Ok(a / b),
        }
    }
}

impl FromStr for Operation {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(Operation::Add),
            "subtract" => Ok(Operation::Subtract),
            "multiply" => Ok(Operation::Multiply),
            "divide" => Ok(Operation::Divide),
            other => Err(ToolError::InvalidParameters(format!(
                "unsupported operation: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Add => "add",
            Operation::Subtract => "subtract",
            Operation::Multiply => "multiply",
            Operation::Divide => "divide",
        };
        f.write_str(name)
    }
}

/// Two-operand calculator exposed as a [`Tool`].
pub struct Calculator {
    metadata: ToolMetadata,
}

impl Calculator {
    pub fn new() -> Self {
        let metadata = ToolMetadata::new("calculator", "Performs basic arithmetic on two numbers")
            .with_parameter(
                ToolParameter::new("a", ToolParameterType::Number)
                    .with_description("First number")
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("b", ToolParameterType::Number)
                    .with_description("Second number")
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("operation", ToolParameterType::String)
                    .with_description("One of add, subtract, multiply, divide")
                    .required(),
            );
        Self { metadata }
    }

    fn number(parameters: &serde_json::Value, name: &str) -> Result<f64, ToolError> {
        parameters.get(name).and_then(|v| v.as_f64()).ok_or_else(|| {
            ToolError::InvalidParameters(format!("invalid parameter '{}': must be a number", name))
        })
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for Calculator {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn execute(&self, parameters: serde_json::Value) -> Result<ToolResult, ToolError> {
        let a = Self::number(&parameters, "a")?;
        let b = Self::number(&parameters, "b")?;
        let operation: Operation = parameters
            .get("operation")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ToolError::InvalidParameters(
                    "invalid parameter 'operation': must be a string".to_string(),
                )
            })?
            .parse()?;

        let result = operation.apply(a, b)?;
        log::trace!("calculator: {} {} {} = {}", a, operation, b, result);
        Ok(ToolResult::success(serde_json::json!(result))
            .with_metadata("operation", serde_json::json!(operation.to_string())))
    }
}
