//! Output callback system for agents and discussions.
//!
//! Implement [`OutputCallback`] to observe a discussion as it happens:
//!
//! - **Agent output**: when an agent starts, each piece of content it produces,
//!   and when it finishes
//! - **Discussion progress**: the complete results of every round, then the full
//!   transcript once the run ends
//!
//! Every method has a default no-op implementation, so you only override what you
//! care about. The callback is shared as `Arc<dyn OutputCallback>`; a
//! [`Group`](crate::group::Group) or
//! [`DependencyGraph`](crate::dependency_graph::DependencyGraph) hands it to every
//! agent it schedules.
//!
//! Callbacks are awaited inline by the emitting agent or scheduler and must return
//! promptly.
//!
//! # Example
//!
//! ```rust,no_run
//! use roundtable::callback::OutputCallback;
//! use roundtable::orchestration::RoundResult;
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl OutputCallback for Printer {
//!     async fn on_content(&self, agent_name: &str, content: &str) {
//!         print!("[{}] {}", agent_name, content);
//!     }
//!
//!     async fn on_round_complete(&self, round: usize, results: &RoundResult) {
//!         println!("round {} done, {} speakers", round + 1, results.len());
//!     }
//! }
//! ```

use crate::roundtable::orchestration::{RoundResult, Transcript};
use async_trait::async_trait;

/// Receives progress notifications from agents and schedulers.
///
/// Agent-level methods are emitted by [`Agent::execute`](crate::Agent::execute)
/// implementations; round-level methods by the schedulers.
///
/// ```text
/// round 0
///   on_start(a) ─ on_content(a, ..)* ─ on_complete(a)
///   on_start(b) ─ on_content(b, ..)* ─ on_complete(b)
/// on_round_complete(0, {a, b})
/// round 1
///   ...
/// on_round_complete(1, {..})
/// on_all_complete(transcript)
/// ```
#[async_trait]
pub trait OutputCallback: Send + Sync {
    /// An agent started working on its input.
    async fn on_start(&self, _agent_name: &str) {}

    /// A piece of agent output. Streaming agents emit one call per chunk,
    /// non-streaming agents one call with the full answer.
    async fn on_content(&self, _agent_name: &str, _content: &str) {}

    /// An agent finished successfully.
    async fn on_complete(&self, _agent_name: &str) {}

    /// A round finished; `round` is 0-based.
    async fn on_round_complete(&self, _round: usize, _results: &RoundResult) {}

    /// The whole run finished.
    async fn on_all_complete(&self, _transcript: &Transcript) {}
}

/// Writes every notification to the `log` facade.
///
/// Agent lifecycle goes to `debug`, round boundaries to `info`. Content is logged at
/// `trace` because streamed chunks are frequent.
#[derive(Debug, Clone, Default)]
pub struct LoggingCallback {
    target: Option<String>,
}

impl LoggingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every log line with `target`, e.g. the discussion name.
    pub fn with_target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
        }
    }

    fn prefix(&self) -> &str {
        self.target.as_deref().unwrap_or("roundtable")
    }
}

#[async_trait]
impl OutputCallback for LoggingCallback {
    async fn on_start(&self, agent_name: &str) {
        log::debug!("[{}] agent '{}' started", self.prefix(), agent_name);
    }

    async fn on_content(&self, agent_name: &str, content: &str) {
        log::trace!(
            "[{}] agent '{}' produced {} chars",
            self.prefix(),
            agent_name,
            content.len()
        );
    }

    async fn on_complete(&self, agent_name: &str) {
        log::debug!("[{}] agent '{}' completed", self.prefix(), agent_name);
    }

    async fn on_round_complete(&self, round: usize, results: &RoundResult) {
        log::info!(
            "[{}] round {} complete: {}",
            self.prefix(),
            round + 1,
            results.names().join(", ")
        );
    }

    async fn on_all_complete(&self, transcript: &Transcript) {
        log::info!(
            "[{}] discussion complete after {} round(s)",
            self.prefix(),
            transcript.len()
        );
    }
}
