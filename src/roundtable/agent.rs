//! Agent System
//!
//! This module defines the [`Agent`] capability the discussion schedulers consume
//! and its main implementation, [`ExpertAgent`]: an LLM-backed domain expert with
//! its own system prompt, per-task memory and optional tool access.
//!
//! The schedulers only ever see `Arc<dyn Agent>`, so other participants can be mixed
//! into the same discussion:
//!
//! - [`ToolAgent`](crate::tool_agent::ToolAgent) executes a single tool directly
//! - [`ChainAgent`](crate::chain::ChainAgent) pipes its input through a list of agents
//!
//! # Tool calls
//!
//! When an [`ExpertAgent`] has a [`ToolRegistry`], its system prompt lists the tools
//! and asks the model to answer with
//!
//! ```json
//! {"tool_call": {"name": "calculator", "parameters": {"a": 1, "b": 2, "operation": "add"}}}
//! ```
//!
//! The agent executes the tool, feeds the result back as a [`Role::Tool`] message and
//! asks again, up to `max_tool_iterations` times.
//!
//! # Example
//!
//! ```rust,no_run
//! use roundtable::agent::{Agent, ExpertAgent};
//! use roundtable::clients::openai::OpenAIClient;
//! use roundtable::memory::{MemoryManager, TaskContext};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async {
//! let task = TaskContext::new(Arc::new(MemoryManager::new()));
//! let agent = ExpertAgent::new(
//!     "architect",
//!     "system_architecture",
//!     "You design scalable distributed systems",
//!     Arc::new(OpenAIClient::new("key", "gpt-4o-mini")),
//!     task,
//! );
//!
//! let answer = agent
//!     .execute(&CancellationToken::new(), "How should we shard the user table?")
//!     .await
//!     .unwrap();
//! println!("{}", answer);
//! # };
//! ```

use crate::client_wrapper::{ClientError, ClientWrapper, Message, Role};
use crate::roundtable::callback::OutputCallback;
use crate::roundtable::memory::TaskContext;
use crate::roundtable::tool_protocol::{ToolError, ToolRegistry};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

/// Tool round-trips an [`ExpertAgent`] performs before it returns the model's last reply.
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 5;

/// Errors produced by a single agent invocation.
#[derive(Debug, Clone)]
pub enum AgentError {
    /// The reasoning service or a tool failed.
    ExecutionFailed(String),
    /// The model asked for a tool that is not registered.
    ToolNotFound(String),
    /// Tool parameters failed validation.
    InvalidParameters(String),
    /// The invocation observed its cancellation token.
    Cancelled,
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::ExecutionFailed(msg) => write!(f, "Agent execution failed: {}", msg),
            AgentError::ToolNotFound(name) => write!(f, "Tool not found: {}", name),
            AgentError::InvalidParameters(msg) => write!(f, "Invalid tool parameters: {}", msg),
            AgentError::Cancelled => write!(f, "Agent execution cancelled"),
        }
    }
}

impl Error for AgentError {}

impl From<ToolError> for AgentError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotFound(name) => AgentError::ToolNotFound(name),
            ToolError::InvalidParameters(msg) => AgentError::InvalidParameters(msg),
            ToolError::ExecutionFailed(msg) => {
                AgentError::ExecutionFailed(format!("tool execution failed: {}", msg))
            }
        }
    }
}

impl AgentError {
    pub(crate) fn client(err: ClientError) -> Self {
        AgentError::ExecutionFailed(err.to_string())
    }
}

/// A discussion participant.
///
/// Implementations must be safe to share between tasks: the schedulers hold agents
/// as `Arc<dyn Agent>` and may invoke them from spawned tasks. A scheduler never
/// runs the same agent twice at the same time.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique name within a scheduler.
    fn name(&self) -> &str;

    /// Domain tags used for capability scoring, e.g. `"system_architecture"`.
    fn capabilities(&self) -> Vec<String>;

    fn expertise(&self) -> Option<&str> {
        None
    }

    /// Free-text description; its vocabulary feeds the expertise score.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Conversation history visible to this agent, oldest first.
    fn history(&self) -> Vec<Message> {
        Vec::new()
    }

    /// Install the callback that receives this agent's output.
    fn set_output_callback(&self, _callback: Arc<dyn OutputCallback>) {}

    /// Produce an answer for `input`. Must return [`AgentError::Cancelled`] promptly
    /// once `cancel` fires.
    async fn execute(&self, cancel: &CancellationToken, input: &str) -> Result<String, AgentError>;
}

/// Await `fut` unless `cancel` fires first.
pub(crate) async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, AgentError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        output = fut => Ok(output),
    }
}

/// A tool invocation requested by a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub parameters: serde_json::Value,
}

/// Find the first `{"tool_call": {...}}` fragment in a model response.
///
/// The fragment may be surrounded by prose; its end is located by brace counting
/// rather than by parsing the whole response.
pub fn parse_tool_call(response: &str) -> Option<ToolCall> {
    let start = response.find("{\"tool_call\"")?;

    let mut depth = 0usize;
    let mut end = None;
    for (offset, ch) in response[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    end = Some(start + offset + ch.len_utf8());
                    break;
                }
            }
            _ => {}
        }
    }

    let parsed: serde_json::Value = serde_json::from_str(&response[start..end?]).ok()?;
    let call = parsed.get("tool_call")?;
    Some(ToolCall {
        name: call.get("name")?.as_str()?.to_string(),
        parameters: call
            .get("parameters")
            .cloned()
            .unwrap_or(serde_json::Value::Null),
    })
}

/// An LLM-backed expert for one domain.
///
/// The agent's history lives in the memory of its [`TaskContext`]; agents built on
/// clones of the same context share one history, which is how every participant of
/// a discussion sees what was said before.
pub struct ExpertAgent {
    name: String,
    expertise: String,
    description: String,
    capabilities: Vec<String>,
    client: Arc<dyn ClientWrapper>,
    task: TaskContext,
    tools: Option<Arc<ToolRegistry>>,
    streaming: bool,
    max_tool_iterations: usize,
    callback: RwLock<Option<Arc<dyn OutputCallback>>>,
    // one in-flight execution per agent
    execution: tokio::sync::Mutex<()>,
}

impl ExpertAgent {
    pub fn new(
        name: impl Into<String>,
        expertise: impl Into<String>,
        description: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
        task: TaskContext,
    ) -> Self {
        let expertise = expertise.into();
        Self {
            name: name.into(),
            capabilities: vec![expertise.clone()],
            expertise,
            description: description.into(),
            client,
            task,
            tools: None,
            streaming: false,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            callback: RwLock::new(None),
            execution: tokio::sync::Mutex::new(()),
        }
    }

    /// Give the agent access to the tools in `registry`.
    pub fn with_tools(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.tools = Some(registry);
        self
    }

    /// Request streamed completions and emit one `on_content` per chunk.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_max_tool_iterations(mut self, iterations: usize) -> Self {
        self.max_tool_iterations = iterations;
        self
    }

    /// Add capability tags beyond the expertise.
    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = String>) -> Self {
        for capability in capabilities {
            if !self.capabilities.contains(&capability) {
                self.capabilities.push(capability);
            }
        }
        self
    }

    pub fn with_output_callback(self, callback: Arc<dyn OutputCallback>) -> Self {
        self.set_output_callback(callback);
        self
    }

    pub fn task_context(&self) -> &TaskContext {
        &self.task
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// The system prompt sent ahead of every request.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "You are an expert in {expertise}. {description}.\n\n\
             Your responsibilities:\n\
             1. Provide professional insight on the discussion topic based on your expertise\n\
             2. Keep your response coherent with the earlier discussion\n\
             3. Give concrete, actionable recommendations\n\
             4. Question or complement the views of the other experts where appropriate\n\
             5. Offer the perspective that is unique to your domain\n\n\
             Remember that you are an expert in {expertise}; every answer should reflect it.",
            expertise = self.expertise,
            description = self.description.trim_end_matches('.'),
        );

        if let Some(registry) = self.tools.as_ref().filter(|r| !r.is_empty()) {
            prompt.push_str(
                "\n\nYou can use the following tools. To call a tool, reply with only a JSON object \
                 of the form {\"tool_call\": {\"name\": \"<tool name>\", \"parameters\": {...}}}. \
                 Provide every required parameter with the declared type.\n\nAvailable tools:\n",
            );
            for metadata in registry.list() {
                prompt.push_str(&metadata.describe());
            }
        }

        prompt
    }

    fn callback(&self) -> Option<Arc<dyn OutputCallback>> {
        self.callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remember(&self, role: Role, content: &str) {
        self.task
            .memory()
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .append(Message::new(role, content));
    }

    async fn emit_content(&self, content: &str) {
        if let Some(callback) = self.callback() {
            callback.on_content(&self.name, content).await;
        }
    }

    /// One request to the reasoning service.
    async fn complete(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
    ) -> Result<String, AgentError> {
        if !self.streaming {
            let reply = until_cancelled(cancel, self.client.send_message(messages))
                .await?
                .map_err(AgentError::client)?;
            return Ok(reply.content.to_string());
        }

        let mut stream = until_cancelled(cancel, self.client.send_message_stream(messages))
            .await?
            .map_err(AgentError::client)?;
        let mut text = String::new();
        while let Some(chunk) = until_cancelled(cancel, stream.next()).await? {
            let chunk = chunk.map_err(AgentError::client)?;
            if !chunk.content.is_empty() {
                self.emit_content(&chunk.content).await;
                text.push_str(&chunk.content);
            }
            if chunk.is_final {
                break;
            }
        }
        Ok(text)
    }
}

#[async_trait]
impl Agent for ExpertAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    fn expertise(&self) -> Option<&str> {
        Some(self.expertise.as_str())
    }

    fn description(&self) -> Option<&str> {
        Some(self.description.as_str())
    }

    fn history(&self) -> Vec<Message> {
        self.task
            .memory()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history()
    }

    fn set_output_callback(&self, callback: Arc<dyn OutputCallback>) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    async fn execute(&self, cancel: &CancellationToken, input: &str) -> Result<String, AgentError> {
        let _running = until_cancelled(cancel, self.execution.lock()).await?;
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let callback = self.callback();
        if let Some(cb) = &callback {
            cb.on_start(&self.name).await;
        }

        let mut messages = Vec::with_capacity(2);
        messages.push(Message::new(Role::System, self.system_prompt()));
        messages.extend(self.history());
        messages.push(Message::new(Role::User, input));
        self.remember(Role::User, input);

        let mut tool_output = String::new();
        let mut iterations = 0;
        let answer = loop {
            let reply = self.complete(cancel, &messages).await?;

            let Some(registry) = self.tools.as_ref() else {
                break reply;
            };
            let Some(call) = parse_tool_call(&reply) else {
                break reply;
            };
            if iterations >= self.max_tool_iterations {
                log::warn!(
                    "agent '{}' reached the tool iteration limit ({})",
                    self.name,
                    self.max_tool_iterations
                );
                break reply;
            }
            iterations += 1;

            log::debug!("agent '{}' calling tool '{}'", self.name, call.name);
            let result =
                until_cancelled(cancel, registry.execute_tool(&call.name, call.parameters))
                    .await??;
            if !result.success {
                return Err(AgentError::ExecutionFailed(format!(
                    "tool '{}' failed: {}",
                    call.name,
                    result.error.unwrap_or_default()
                )));
            }

            let output = result.output_text();
            let note = format!("\nTool {} result:\n{}\n", call.name, output);
            if self.streaming {
                self.emit_content(&note).await;
            }
            tool_output.push_str(&note);

            messages.push(Message::new(Role::Assistant, &reply));
            messages.push(Message::new(
                Role::Tool,
                format!("Tool '{}' returned:\n{}", call.name, output),
            ));
        };

        let mut response = tool_output;
        response.push_str(&answer);
        self.remember(Role::Assistant, &response);

        if let Some(cb) = &callback {
            if !self.streaming {
                cb.on_content(&self.name, &response).await;
            }
            cb.on_complete(&self.name).await;
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tool_call_in_prose() {
        let response = "Let me compute that. {\"tool_call\": {\"name\": \"calculator\", \
                        \"parameters\": {\"a\": 1, \"b\": 2, \"operation\": \"add\"}}} Thanks.";
        let call = parse_tool_call(response).unwrap();
        assert_eq!(call.name, "calculator");
        assert_eq!(call.parameters, json!({"a": 1, "b": 2, "operation": "add"}));
    }

    #[test]
    fn test_parse_tool_call_after_multibyte_text() {
        let response = "计算一下：{\"tool_call\": {\"name\": \"calc\", \"parameters\": {}}}";
        let call = parse_tool_call(response).unwrap();
        assert_eq!(call.name, "calc");
    }

    #[test]
    fn test_parse_tool_call_rejects_incomplete_fragments() {
        assert!(parse_tool_call("no tools here").is_none());
        assert!(parse_tool_call("{\"tool_call\": {\"name\": \"calc\"").is_none());
        assert!(parse_tool_call("{\"tool_call\": {\"parameters\": {}}}").is_none());
    }

    #[test]
    fn test_tool_error_conversion() {
        assert!(matches!(
            AgentError::from(ToolError::NotFound("x".into())),
            AgentError::ToolNotFound(name) if name == "x"
        ));
        assert!(matches!(
            AgentError::from(ToolError::InvalidParameters("bad".into())),
            AgentError::InvalidParameters(_)
        ));
    }

    #[tokio::test]
    async fn test_until_cancelled_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = until_cancelled(&cancel, async { 1 }).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
    }
}
