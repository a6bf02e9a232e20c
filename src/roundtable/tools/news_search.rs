//! # News Search Tool
//!
//! Searches the web for recent coverage of a query and hands the model a short
//! digest of the top results instead of the raw search payload.
//!
//! The tool POSTs `{"query": ...}` with a bearer key to a web search endpoint
//! that answers in the Bing-style `data.webPages.value[]` layout (Bocha by
//! default).
//!
//! ```rust,no_run
//! use roundtable::tool_protocol::ToolRegistry;
//! use roundtable::tools::NewsSearcher;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut registry = ToolRegistry::new();
//! registry.register(Arc::new(NewsSearcher::new(std::env::var("SEARCH_API_KEY").unwrap())));
//!
//! let result = registry
//!     .execute_tool("news_searcher", json!({"query": "rust 2024 edition"}))
//!     .await
//!     .unwrap();
//! println!("{}", result.output_text());
//! # }
//! ```

use crate::clients::common::get_http_client;
use crate::roundtable::tool_protocol::{
    Tool, ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolResult,
};
use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{json, Value};
use std::fmt::Write;
use std::time::Duration;

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.bochaai.com/v1/web-search";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_LISTED_RESULTS: usize = 5;

pub struct NewsSearcher {
    metadata: ToolMetadata,
    api_key: String,
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl NewsSearcher {
    pub fn new(api_key: impl Into<String>) -> Self {
        let metadata = ToolMetadata::new(
            "news_searcher",
            "Searches recent news and summarises the top results",
        )
        .with_parameter(
            ToolParameter::new("query", ToolParameterType::String)
                .with_description("Search keywords")
                .required(),
        );

        Self {
            metadata,
            api_key: api_key.into(),
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            client: get_http_client(DEFAULT_SEARCH_ENDPOINT),
        }
    }

    /// Point the tool at another endpoint speaking the same protocol.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self.client = get_http_client(&self.endpoint);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Digest of a search response: the result count, then name, crawl time and
    /// snippet of the first five pages.
    pub fn summarize(response: &Value) -> String {
        let pages = response
            .pointer("/data/webPages/value")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut summary = format!("Found {} related results:\n\n", pages.len());
        for (index, page) in pages.iter().take(MAX_LISTED_RESULTS).enumerate() {
            let field = |key: &str| page.get(key).and_then(Value::as_str).unwrap_or_default();
            let _ = writeln!(summary, "{}. {}", index + 1, field("name"));
            let _ = writeln!(summary, "   Published: {}", crawl_time(field("dateLastCrawled")));
            let _ = writeln!(summary, "   Summary: {}\n", field("snippet"));
        }
        summary
    }

    fn query(parameters: &Value) -> Result<&str, ToolError> {
        parameters
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .ok_or_else(|| {
                ToolError::InvalidParameters("invalid or missing query parameter".to_string())
            })
    }
}

/// RFC 3339 timestamps are shown as `YYYY-MM-DD HH:MM:SS`; anything else verbatim.
fn crawl_time(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

#[async_trait]
impl Tool for NewsSearcher {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn execute(&self, parameters: Value) -> Result<ToolResult, ToolError> {
        let query = Self::query(&parameters)?;
        log::debug!("news_searcher: searching '{}'", query);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("news_searcher: {} returned {}", self.endpoint, status);
            let failed = ToolResult::failure(format!("HTTP {} from {}", status, self.endpoint));
            return Ok(failed.with_metadata("status", json!(status.as_u16())));
        }

        let body: Value = response.json().await.map_err(|e| {
            ToolError::ExecutionFailed(format!("failed to decode search response: {}", e))
        })?;
        let summary = Self::summarize(&body);
        Ok(ToolResult::success(Value::String(summary)).with_metadata("status", json!(status.as_u16())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(name: &str, crawled: &str, snippet: &str) -> Value {
        json!({
            "name": name,
            "url": "https://news.example.com/article",
            "snippet": snippet,
            "dateLastCrawled": crawled,
        })
    }

    #[test]
    fn test_metadata_requires_query() {
        let tool = NewsSearcher::new("key");
        let meta = tool.metadata();
        assert_eq!(meta.name, "news_searcher");
        assert_eq!(meta.parameters.len(), 1);
        assert!(meta.parameters[0].required);
        assert_eq!(tool.endpoint(), DEFAULT_SEARCH_ENDPOINT);

        let err = meta.validate(json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[test]
    fn test_summary_lists_top_five() {
        let pages: Vec<Value> = (1..=7)
            .map(|i| {
                page(
                    &format!("Headline {}", i),
                    "2024-05-01T08:30:00Z",
                    &format!("Snippet {}", i),
                )
            })
            .collect();
        let response = json!({ "code": 200, "data": { "webPages": { "value": pages } } });

        let summary = NewsSearcher::summarize(&response);
        assert!(summary.starts_with("Found 7 related results:\n\n"));
        assert!(summary.contains(
            "1. Headline 1\n   Published: 2024-05-01 08:30:00\n   Summary: Snippet 1\n\n"
        ));
        assert!(summary.contains("5. Headline 5\n"));
        assert!(!summary.contains("Headline 6"));
    }

    #[test]
    fn test_summary_tolerates_missing_fields() {
        assert_eq!(
            NewsSearcher::summarize(&json!({ "code": 403, "msg": "quota" })),
            "Found 0 related results:\n\n"
        );

        let response = json!({ "data": { "webPages": { "value": [ { "name": "Only a name" } ] } } });
        assert_eq!(
            NewsSearcher::summarize(&response),
            "Found 1 related results:\n\n1. Only a name\n   Published: \n   Summary: \n\n"
        );
    }

    #[test]
    fn test_crawl_time_falls_back_to_raw_text() {
        assert_eq!(crawl_time("2024-05-01T08:30:00+08:00"), "2024-05-01 08:30:00");
        assert_eq!(crawl_time("yesterday"), "yesterday");
    }

    #[tokio::test]
    async fn test_blank_query_rejected_before_sending() {
        let tool = NewsSearcher::new("key").with_endpoint("http://127.0.0.1:9/search");
        for parameters in [json!({}), json!({"query": "   "}), json!({"query": 42})] {
            let err = tool.execute(parameters).await.unwrap_err();
            assert!(matches!(err, ToolError::InvalidParameters(_)));
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_execution_error() {
        let tool = NewsSearcher::new("key")
            .with_endpoint("http://127.0.0.1:9/search")
            .with_timeout(Duration::from_secs(2));
        let err = tool.execute(json!({"query": "rust"})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(msg) if msg.contains("search request failed")));
    }
}
