use async_trait::async_trait;
use futures_util::stream;
use roundtable::agent::ExpertAgent;
use roundtable::callback::OutputCallback;
use roundtable::chain::ChainAgent;
use roundtable::client_wrapper::{
    ClientError, ClientWrapper, Message, MessageChunk, MessageChunkStream, Role,
};
use roundtable::memory::{MemoryManager, TaskContext};
use roundtable::selector::{AgentSelector, LlmSelector};
use roundtable::tool_agent::ToolAgent;
use roundtable::tool_protocol::ToolRegistry;
use roundtable::tools::Calculator;
use roundtable::{Agent, AgentError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Replays scripted replies and records every request it receives.
struct MockClient {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
    chunks: Option<Vec<&'static str>>,
    delay: Duration,
    fail: bool,
}

impl MockClient {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
            chunks: None,
            delay: Duration::ZERO,
            fail: false,
        }
    }

    fn streaming(chunks: Vec<&'static str>) -> Self {
        Self {
            chunks: Some(chunks),
            ..Self::new(&[])
        }
    }

    fn request(&self, index: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[index].clone()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ClientWrapper for MockClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ClientError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err("connection refused".into());
        }
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front().unwrap_or_default()
            } else {
                replies.front().cloned().unwrap_or_default()
            }
        };
        Ok(Message::new(Role::Assistant, reply))
    }

    async fn send_message_stream(
        &self,
        messages: &[Message],
    ) -> Result<MessageChunkStream, ClientError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let chunks = self.chunks.clone().unwrap_or_default();
        let last = chunks.len().saturating_sub(1);
        let items: Vec<Result<MessageChunk, ClientError>> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                Ok(MessageChunk {
                    content: text.to_string(),
                    is_final: i == last,
                })
            })
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

#[async_trait]
impl OutputCallback for RecordingCallback {
    async fn on_start(&self, agent_name: &str) {
        self.events.lock().unwrap().push(format!("start:{}", agent_name));
    }

    async fn on_content(&self, agent_name: &str, content: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("content:{}:{}", agent_name, content));
    }

    async fn on_complete(&self, agent_name: &str) {
        self.events.lock().unwrap().push(format!("complete:{}", agent_name));
    }
}

/// Appends a fixed suffix to its input.
struct SuffixAgent {
    name: String,
    suffix: &'static str,
    fail: bool,
}

#[async_trait]
impl Agent for SuffixAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<String> {
        vec![format!("{}_skill", self.name), "shared".to_string()]
    }

    async fn execute(&self, _cancel: &CancellationToken, input: &str) -> Result<String, AgentError> {
        if self.fail {
            return Err(AgentError::ExecutionFailed("out of ideas".to_string()));
        }
        Ok(format!("{}{}", input, self.suffix))
    }
}

fn suffix(name: &str, suffix: &'static str) -> Arc<dyn Agent> {
    Arc::new(SuffixAgent {
        name: name.to_string(),
        suffix,
        fail: false,
    })
}

fn task() -> TaskContext {
    TaskContext::new(Arc::new(MemoryManager::new()))
}

fn calculator_registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(Calculator::new()));
    Arc::new(registry)
}

#[tokio::test]
async fn test_expert_agent_builds_request_and_records_history() {
    let client = Arc::new(MockClient::new(&["Use a read replica."]));
    let agent = ExpertAgent::new(
        "dba",
        "data_science",
        "Tunes analytical databases",
        client.clone(),
        task(),
    );

    let answer = agent
        .execute(&CancellationToken::new(), "Reports are slow")
        .await
        .unwrap();
    assert_eq!(answer, "Use a read replica.");

    let request = client.request(0);
    assert_eq!(request.len(), 2);
    assert_eq!(request[0].role, Role::System);
    assert!(request[0].content.contains("expert in data_science"));
    assert!(request[0].content.contains("Tunes analytical databases"));
    assert_eq!(request[1].role, Role::User);
    assert_eq!(&*request[1].content, "Reports are slow");

    let history = agent.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(&*history[1].content, "Use a read replica.");
    assert_eq!(agent.capabilities(), vec!["data_science"]);
    assert_eq!(agent.expertise(), Some("data_science"));
}

#[tokio::test]
async fn test_agents_on_one_task_share_history() {
    let task = task();
    let client = Arc::new(MockClient::new(&["first opinion", "second opinion"]));
    let first = ExpertAgent::new("a", "security", "Threat modelling", client.clone(), task.clone());
    let second = ExpertAgent::new("b", "testing", "Load testing", client.clone(), task.clone());

    first.execute(&CancellationToken::new(), "topic").await.unwrap();
    second.execute(&CancellationToken::new(), "topic").await.unwrap();

    // system prompt, the first exchange, then the new question
    let request = client.request(1);
    assert_eq!(request.len(), 4);
    assert_eq!(&*request[2].content, "first opinion");
    assert_eq!(second.history().len(), 4);
    assert_eq!(first.history(), second.history());

    // a different task starts from scratch
    let other = ExpertAgent::new("c", "testing", "Load testing", client, task.renew());
    assert!(other.history().is_empty());
}

#[tokio::test]
async fn test_expert_agent_runs_tools() {
    let client = Arc::new(MockClient::new(&[
        r#"{"tool_call": {"name": "calculator", "parameters": {"a": 2, "b": 3, "operation": "add"}}}"#,
        "The sum is 5.",
    ]));
    let agent = ExpertAgent::new("math", "data_science", "Checks numbers", client.clone(), task())
        .with_tools(calculator_registry());
    assert!(agent.system_prompt().contains("calculator"));

    let answer = agent
        .execute(&CancellationToken::new(), "What is 2 + 3?")
        .await
        .unwrap();

    assert_eq!(answer, "\nTool calculator result:\n5.0\nThe sum is 5.");
    assert_eq!(client.request_count(), 2);
    let follow_up = client.request(1);
    let tool_message = follow_up.last().unwrap();
    assert_eq!(tool_message.role, Role::Tool);
    assert!(tool_message.content.contains("5.0"));
}

#[tokio::test]
async fn test_tool_loop_is_bounded() {
    let call = r#"{"tool_call": {"name": "calculator", "parameters": {"a": 1, "b": 1, "operation": "add"}}}"#;
    let client = Arc::new(MockClient::new(&[call]));
    let agent = ExpertAgent::new("loop", "testing", "Keeps calling tools", client.clone(), task())
        .with_tools(calculator_registry())
        .with_max_tool_iterations(2);

    let answer = agent.execute(&CancellationToken::new(), "go").await.unwrap();
    assert_eq!(client.request_count(), 3);
    assert!(answer.ends_with(call));
}

#[tokio::test]
async fn test_unknown_tool_fails_the_invocation() {
    let client = Arc::new(MockClient::new(&[
        r#"{"tool_call": {"name": "weather", "parameters": {}}}"#,
    ]));
    let agent = ExpertAgent::new("x", "testing", "desc", client, task())
        .with_tools(calculator_registry());

    let err = agent.execute(&CancellationToken::new(), "go").await.unwrap_err();
    assert!(matches!(err, AgentError::ToolNotFound(name) if name == "weather"));
}

#[tokio::test]
async fn test_streaming_emits_each_chunk() {
    let client = Arc::new(MockClient::streaming(vec!["Cache ", "the ", "hot keys."]));
    let callback = Arc::new(RecordingCallback::default());
    let agent = ExpertAgent::new("perf", "system_architecture", "Performance work", client, task())
        .with_streaming(true)
        .with_output_callback(callback.clone());
    assert!(agent.is_streaming());

    let answer = agent.execute(&CancellationToken::new(), "topic").await.unwrap();
    assert_eq!(answer, "Cache the hot keys.");
    assert_eq!(
        *callback.events.lock().unwrap(),
        vec![
            "start:perf",
            "content:perf:Cache ",
            "content:perf:the ",
            "content:perf:hot keys.",
            "complete:perf",
        ]
    );
}

#[tokio::test]
async fn test_non_streaming_emits_full_answer_once() {
    let client = Arc::new(MockClient::new(&["All good."]));
    let callback = Arc::new(RecordingCallback::default());
    let agent = ExpertAgent::new("qa", "testing", "Release checks", client, task());
    agent.set_output_callback(callback.clone());

    agent.execute(&CancellationToken::new(), "topic").await.unwrap();
    assert_eq!(
        *callback.events.lock().unwrap(),
        vec!["start:qa", "content:qa:All good.", "complete:qa"]
    );
}

#[tokio::test]
async fn test_expert_agent_cancellation_and_errors() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let client = Arc::new(MockClient::new(&["never"]));
    let agent = ExpertAgent::new("a", "testing", "desc", client.clone(), task());
    assert!(matches!(
        agent.execute(&cancel, "topic").await,
        Err(AgentError::Cancelled)
    ));
    assert_eq!(client.request_count(), 0);

    let slow = Arc::new(MockClient {
        delay: Duration::from_secs(30),
        ..MockClient::new(&["late"])
    });
    let agent = ExpertAgent::new("b", "testing", "desc", slow, task());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    assert!(matches!(
        agent.execute(&cancel, "topic").await,
        Err(AgentError::Cancelled)
    ));

    let broken = Arc::new(MockClient {
        fail: true,
        ..MockClient::new(&[])
    });
    let agent = ExpertAgent::new("c", "testing", "desc", broken, task());
    let err = agent.execute(&CancellationToken::new(), "topic").await.unwrap_err();
    assert!(matches!(err, AgentError::ExecutionFailed(msg) if msg.contains("connection refused")));
}

#[tokio::test]
async fn test_tool_agent_executes_json_input() {
    let agent = ToolAgent::new("calc", Arc::new(Calculator::new()))
        .with_capabilities(vec!["data_science".to_string()]);
    assert_eq!(agent.capabilities(), vec!["data_science"]);

    let output = agent
        .execute(
            &CancellationToken::new(),
            r#"{"a": 6, "b": 7, "operation": "multiply"}"#,
        )
        .await
        .unwrap();
    assert_eq!(output, "42.0");

    let err = agent
        .execute(&CancellationToken::new(), "six times seven")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidParameters(_)));
}

#[tokio::test]
async fn test_chain_agent_pipes_outputs() {
    let chain = ChainAgent::new("pipeline", 2, vec![suffix("draft", "+d"), suffix("review", "+r")]);
    assert_eq!(chain.members().len(), 2);
    assert_eq!(chain.capabilities(), vec!["draft_skill", "shared", "review_skill"]);

    let output = chain.execute(&CancellationToken::new(), "draft").await.unwrap();
    assert_eq!(output, "draft+d+r+d+r");

    assert_eq!(ChainAgent::new("zero", 0, Vec::new()).rounds(), 1);
}

#[tokio::test]
async fn test_chain_agent_stops_on_failure() {
    let failing: Arc<dyn Agent> = Arc::new(SuffixAgent {
        name: "critic".to_string(),
        suffix: "",
        fail: true,
    });
    let chain = ChainAgent::new("pipeline", 1, vec![suffix("draft", "+d"), failing]);

    let err = chain.execute(&CancellationToken::new(), "draft").await.unwrap_err();
    match err {
        AgentError::ExecutionFailed(msg) => {
            assert!(msg.contains("chain member 'critic' failed"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_llm_selector_picks_by_index() {
    let candidates = vec![suffix("zero", ""), suffix("one", "")];
    let cancel = CancellationToken::new();

    let selector = LlmSelector::new(Arc::new(MockClient::new(&["1"])));
    let picked = selector.select_agents(&cancel, "topic", &candidates, 1).await;
    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0].name(), "one");

    let confused = LlmSelector::new(Arc::new(MockClient::new(&["I would pick the second one"])));
    assert!(confused
        .select_agents(&cancel, "topic", &candidates, 1)
        .await
        .is_empty());

    let out_of_range = LlmSelector::new(Arc::new(MockClient::new(&["7"])));
    assert!(out_of_range
        .select_agents(&cancel, "topic", &candidates, 1)
        .await
        .is_empty());
}
