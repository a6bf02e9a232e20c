//! # HTTP Endpoint Tool
//!
//! Binds one HTTP endpoint (method + URL + fixed headers) as a [`Tool`]. Each call
//! may carry:
//!
//! - `body`: a JSON object, sent as the JSON request body
//! - `query_params`: a JSON object whose entries become URL query parameters
//!
//! The response body is decoded as JSON when possible and returned verbatim as a
//! string otherwise. Non-2xx statuses produce a failed [`ToolResult`] carrying the
//! status code in its metadata.
//!
//! ```rust,no_run
//! use roundtable::tools::HttpTool;
//! use std::time::Duration;
//!
//! let weather = HttpTool::new("weather", "https://weather.example.com/api/today", reqwest::Method::GET)
//!     .with_header("Authorization", "Bearer token")
//!     .with_timeout(Duration::from_secs(10));
//! ```

use crate::clients::common::get_http_client;
use crate::roundtable::tool_protocol::{
    Tool, ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolResult,
};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTool {
    metadata: ToolMetadata,
    url: String,
    method: reqwest::Method,
    headers: Vec<(String, String)>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpTool {
    pub fn new(name: impl Into<String>, url: impl Into<String>, method: reqwest::Method) -> Self {
        let url = url.into();
        let metadata = ToolMetadata::new(name, format!("HTTP {} tool for {}", method, url))
            .with_parameter(
                ToolParameter::new("body", ToolParameterType::Object)
                    .with_description("Request body"),
            )
            .with_parameter(
                ToolParameter::new("query_params", ToolParameterType::Object)
                    .with_description("URL query parameters"),
            );

        Self {
            metadata,
            client: get_http_client(&url),
            url,
            method,
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replace the generated description shown to models.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &reqwest::Method {
        &self.method
    }

    fn query_pairs(parameters: &Value) -> Result<Vec<(String, String)>, ToolError> {
        match parameters.get("query_params") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Object(map)) => Ok(map
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), value)
                })
                .collect()),
            Some(_) => Err(ToolError::InvalidParameters(
                "'query_params' must be an object".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Tool for HttpTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn execute(&self, parameters: Value) -> Result<ToolResult, ToolError> {
        let query = Self::query_pairs(&parameters)?;

        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .timeout(self.timeout);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !query.is_empty() {
            request = request.query(&query);
        }
        if let Some(body) = parameters.get("body").filter(|b| !b.is_null()) {
            request = request.json(body);
        }

        log::debug!("{} {}", self.method, self.url);
        let response = request
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to read response: {}", e)))?;
        let output = serde_json::from_str(&text).unwrap_or(Value::String(text));

        let result = if status.is_success() {
            ToolResult::success(output)
        } else {
            log::warn!("{} {} returned {}", self.method, self.url, status);
            let mut failed = ToolResult::failure(format!("HTTP {} from {}", status, self.url));
            failed.output = output;
            failed
        };
        Ok(result.with_metadata("status", serde_json::json!(status.as_u16())))
    }
}
