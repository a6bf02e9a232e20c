//! # Roundtable
//!
//! Roundtable runs structured, multi-round discussions between LLM-backed agents.
//! Each round every selected agent answers the same topic; the answers are rendered
//! into a transcript that becomes part of the next round's input, so later rounds
//! build on, correct and extend what was said before.
//!
//! The crate provides:
//!
//! * **Agents**: the [`Agent`] trait and its implementations,
//!   [`ExpertAgent`](agent::ExpertAgent) (a domain expert backed by a
//!   [`ClientWrapper`]), [`ToolAgent`](tool_agent::ToolAgent) and
//!   [`ChainAgent`](chain::ChainAgent)
//! * **Two schedulers**: [`DependencyGraph`](dependency_graph::DependencyGraph) orders the
//!   first round by declared dependencies; [`Group`](group::Group) ranks agents by
//!   capability and can run them through a hand-off task pipeline or defer to an
//!   [`AgentSelector`](selector::AgentSelector)
//! * **Heuristic scoring**: [`scoring`] ranks agents by domain, track record and
//!   description, and judges answers by their relevance to the question
//! * **Per-task memory**: [`memory::TaskContext`] binds agents to a bounded,
//!   per-discussion message history that is cleared when a group run ends
//! * **Tools**: [`tool_protocol::ToolRegistry`] with a [`tools::Calculator`], an
//!   [`tools::HttpTool`] and a [`tools::NewsSearcher`]
//! * **Observability**: [`callback::OutputCallback`] for streaming output and round
//!   progress, plus `log` records throughout (enable them with [`init_logger`])
//!
//! ## A two-round discussion
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roundtable::agent::ExpertAgent;
//! use roundtable::callback::LoggingCallback;
//! use roundtable::clients::openai::OpenAIClient;
//! use roundtable::config::ClientConfig;
//! use roundtable::group::Group;
//! use roundtable::memory::{MemoryManager, TaskContext};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     roundtable::init_logger();
//!
//!     let config = ClientConfig::from_env().ok_or("ROUNDTABLE_API_KEY not set")?;
//!     let client = Arc::new(OpenAIClient::from_config(&config));
//!     let task = TaskContext::new(Arc::new(MemoryManager::new()));
//!
//!     let mut group = Group::new(2, false, Some(Arc::new(LoggingCallback::new())), task.clone());
//!     group.add_agent(Arc::new(ExpertAgent::new(
//!         "security",
//!         "security",
//!         "Reviews threat models and authentication flows",
//!         client.clone(),
//!         task.clone(),
//!     )));
//!     group.add_agent(Arc::new(ExpertAgent::new(
//!         "data",
//!         "data_science",
//!         "Builds recommendation and forecasting pipelines",
//!         client,
//!         task,
//!     )));
//!
//!     let transcript = group
//!         .execute(&CancellationToken::new(), "How do we personalise the home feed safely?")
//!         .await?;
//!
//!     for (round, results) in transcript.iter().enumerate() {
//!         for (agent, output) in results.iter() {
//!             println!("round {} [{}]: {}", round + 1, agent, output);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding roundtable can opt in to `RUST_LOG` driven diagnostics
/// without choosing a logging backend upfront. Calling it again is a no-op, and an
/// already installed logger is left alone.
///
/// ```rust
/// roundtable::init_logger();
/// roundtable::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::try_init();
    });
}

// Import the top-level `roundtable` module.
pub mod roundtable;

// Re-exporting key items for easier external access.
pub use roundtable::agent;
pub use roundtable::agent::{Agent, AgentError};
pub use roundtable::callback;
pub use roundtable::chain;
pub use roundtable::client_wrapper;
pub use roundtable::client_wrapper::{ClientWrapper, Message, MessageChunk, MessageChunkStream, Role};
pub use roundtable::clients;
pub use roundtable::config;
pub use roundtable::dependency_graph;
pub use roundtable::group;
pub use roundtable::memory;
pub use roundtable::orchestration;
pub use roundtable::orchestration::{OrchestrationError, RoundResult, Transcript};
pub use roundtable::scoring;
pub use roundtable::selector;
pub use roundtable::tool_agent;
pub use roundtable::tool_protocol;
pub use roundtable::tools;
