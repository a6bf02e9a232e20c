//! An agent that executes one tool directly, without a reasoning service.
//!
//! The input is parsed as a JSON object of tool parameters. Input that is not a
//! JSON object is passed as `{"input": "<text>"}`, which lets a tool take part in a
//! discussion or a [`ChainAgent`](crate::chain::ChainAgent) that hands it prose.

use crate::roundtable::agent::{until_cancelled, Agent, AgentError};
use crate::roundtable::callback::OutputCallback;
use crate::roundtable::tool_protocol::Tool;
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

pub struct ToolAgent {
    name: String,
    tool: Arc<dyn Tool>,
    capabilities: Vec<String>,
    callback: RwLock<Option<Arc<dyn OutputCallback>>>,
}

impl ToolAgent {
    pub fn new(name: impl Into<String>, tool: Arc<dyn Tool>) -> Self {
        Self {
            name: name.into(),
            tool,
            capabilities: Vec::new(),
            callback: RwLock::new(None),
        }
    }

    /// Domain tags used when this agent is ranked by capability.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn tool(&self) -> &Arc<dyn Tool> {
        &self.tool
    }

    fn parameters_from(input: &str) -> serde_json::Value {
        match serde_json::from_str::<serde_json::Value>(input.trim()) {
            Ok(value @ serde_json::Value::Object(_)) => value,
            _ => serde_json::json!({ "input": input }),
        }
    }

    fn callback(&self) -> Option<Arc<dyn OutputCallback>> {
        self.callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Agent for ToolAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    fn description(&self) -> Option<&str> {
        Some(self.tool.metadata().description.as_str())
    }

    fn set_output_callback(&self, callback: Arc<dyn OutputCallback>) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    async fn execute(&self, cancel: &CancellationToken, input: &str) -> Result<String, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let callback = self.callback();
        if let Some(cb) = &callback {
            cb.on_start(&self.name).await;
        }

        let parameters = self
            .tool
            .metadata()
            .validate(Self::parameters_from(input))?;
        let result = until_cancelled(cancel, self.tool.execute(parameters)).await??;
        if !result.success {
            return Err(AgentError::ExecutionFailed(format!(
                "tool '{}' failed: {}",
                self.tool.metadata().name,
                result.error.unwrap_or_default()
            )));
        }

        let output = result.output_text();
        if let Some(cb) = &callback {
            cb.on_content(&self.name, &output).await;
            cb.on_complete(&self.name).await;
        }
        Ok(output)
    }
}
