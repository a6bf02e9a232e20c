//! Shared building blocks of the round-based discussion engines.
//!
//! Both schedulers, the [`DependencyGraph`](crate::dependency_graph::DependencyGraph)
//! and the [`Group`](crate::group::Group), drive agents through a fixed number of
//! rounds and produce the same output shape:
//!
//! - a [`RoundResult`] per round, mapping each participating agent's name to its output;
//! - a [`Transcript`], the ordered list of round results of one run.
//!
//! After every round the transcript is rendered back into text and appended to the
//! original topic, so agents in round *N* always see the full discussion of rounds
//! `0..N`, not only the latest round.
//!
//! # Example
//!
//! ```
//! use roundtable::orchestration::{RoundResult, Transcript};
//!
//! let mut first = RoundResult::new();
//! first.insert("architect", "Split the service in two.");
//! first.insert("security", "Add mTLS between them.");
//!
//! let mut transcript = Transcript::new();
//! transcript.push(first);
//!
//! let context = transcript.render();
//! assert!(context.contains("[architect]: Split the service in two."));
//! ```

use crate::roundtable::agent::{Agent, AgentError};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outputs of one round, keyed by agent name.
///
/// Each agent contributes at most one output per round; inserting a second output
/// for the same name replaces the first. Entries are kept in the order they were
/// recorded so that rendered transcripts are stable, but consumers should look
/// results up by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundResult {
    entries: Vec<(String, String)>,
}

impl RoundResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `output` for `agent_name`, returning the previous output if any.
    pub fn insert(&mut self, agent_name: impl Into<String>, output: impl Into<String>) -> Option<String> {
        let agent_name = agent_name.into();
        let output = output.into();
        match self.entries.iter_mut().find(|(name, _)| *name == agent_name) {
            Some((_, existing)) => Some(std::mem::replace(existing, output)),
            None => {
                self.entries.push((agent_name, output));
                None
            }
        }
    }

    pub fn get(&self, agent_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == agent_name)
            .map(|(_, output)| output.as_str())
    }

    pub fn contains(&self, agent_name: &str) -> bool {
        self.get(agent_name).is_some()
    }

    /// Names of the agents that spoke this round, in recording order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, output)| (name.as_str(), output.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert into a plain name → output map.
    pub fn into_map(self) -> HashMap<String, String> {
        self.entries.into_iter().collect()
    }

    fn render_entries(&self, out: &mut String) {
        for (name, output) in &self.entries {
            out.push_str(&format!("[{}]: {}\n", name, output));
        }
    }
}

impl FromIterator<(String, String)> for RoundResult {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut result = RoundResult::new();
        for (name, output) in iter {
            result.insert(name, output);
        }
        result
    }
}

/// The ordered round results of one discussion run. Index = round number (0-based).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    rounds: Vec<RoundResult>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the results of the next round.
    pub fn push(&mut self, round: RoundResult) {
        self.rounds.push(round);
    }

    pub fn rounds(&self) -> &[RoundResult] {
        &self.rounds
    }

    pub fn round(&self, index: usize) -> Option<&RoundResult> {
        self.rounds.get(index)
    }

    pub fn last(&self) -> Option<&RoundResult> {
        self.rounds.last()
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoundResult> {
        self.rounds.iter()
    }

    pub fn into_rounds(self) -> Vec<RoundResult> {
        self.rounds
    }

    /// Render the discussion so far as prompt context.
    ///
    /// Every round but the latest is listed under a summary header with its round
    /// number; the latest round follows under its own header.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let Some((current, previous)) = self.rounds.split_last() else {
            return out;
        };

        if !previous.is_empty() {
            out.push_str("Summary of the previous discussion:\n");
            for (index, round) in previous.iter().enumerate() {
                out.push_str(&format!("\nRound {}:\n", index + 1));
                round.render_entries(&mut out);
            }
            out.push_str("\nBased on the discussion above, please continue:\n");
        }

        out.push_str("\nThis round's discussion:\n");
        current.render_entries(&mut out);
        out
    }

    /// The topic followed by the rendered discussion; used as the next round's input.
    pub fn running_input(&self, topic: &str) -> String {
        format!("{}\n\n{}", topic, self.render())
    }
}

/// Errors that can occur during discussion configuration or execution.
///
/// # Examples
///
/// ```
/// use roundtable::orchestration::OrchestrationError;
///
/// let err = OrchestrationError::AgentNotFound("missing-agent".into());
/// assert_eq!(err.to_string(), "Agent not found: missing-agent");
/// ```
#[derive(Debug, Clone)]
pub enum OrchestrationError {
    /// An agent name referenced by a dependency edge is not registered.
    AgentNotFound(String),

    /// The dependency edge is structurally invalid (an agent depending on itself).
    InvalidDependency { dependent: String, dependency: String },

    /// The dependency relation contains a cycle. Holds the cycle path, first
    /// element repeated at the end.
    CircularDependency(Vec<String>),

    /// An agent failed while producing its output; the whole run is aborted.
    ExecutionFailed { agent: String, source: AgentError },

    /// The run was cancelled through its [`CancellationToken`].
    Cancelled,

    /// `execute` was called before any agents were added.
    NoAgents,
}

impl fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestrationError::AgentNotFound(name) => write!(f, "Agent not found: {}", name),
            OrchestrationError::InvalidDependency {
                dependent,
                dependency,
            } => write!(
                f,
                "Invalid dependency: '{}' cannot depend on '{}'",
                dependent, dependency
            ),
            OrchestrationError::CircularDependency(path) => {
                write!(f, "Circular dependency detected: {}", path.join(" -> "))
            }
            OrchestrationError::ExecutionFailed { agent, source } => {
                write!(f, "Agent {} execution failed: {}", agent, source)
            }
            OrchestrationError::Cancelled => write!(f, "Discussion cancelled"),
            OrchestrationError::NoAgents => write!(f, "No agents registered"),
        }
    }
}

impl Error for OrchestrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OrchestrationError::ExecutionFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Wrap an agent failure with the failing agent's name.
pub(crate) fn agent_failure(agent: &str, err: AgentError) -> OrchestrationError {
    match err {
        AgentError::Cancelled => OrchestrationError::Cancelled,
        other => OrchestrationError::ExecutionFailed {
            agent: agent.to_string(),
            source: other,
        },
    }
}

/// Run one agent on `input`, honouring cancellation before the call starts.
pub(crate) async fn invoke_agent(
    agent: &Arc<dyn Agent>,
    cancel: &CancellationToken,
    input: &str,
) -> Result<String, OrchestrationError> {
    if cancel.is_cancelled() {
        return Err(OrchestrationError::Cancelled);
    }
    log::debug!("invoking agent '{}'", agent.name());
    agent.execute(cancel, input).await.map_err(|e| {
        log::warn!("agent '{}' failed: {}", agent.name(), e);
        agent_failure(agent.name(), e)
    })
}

/// Framing for the first round of a multi-round discussion.
pub(crate) fn first_round_prompt(topic: &str) -> String {
    format!(
        "This is the first round of a multi-round discussion.\n\n\
         Discussion topic:\n{}\n\n\
         Please share your view from your professional perspective.",
        topic
    )
}

/// Framing for round `round` (0-based) of a multi-round discussion.
pub(crate) fn follow_up_round_prompt(round: usize, context: &str) -> String {
    format!(
        "This is round {} of a multi-round discussion.\n\n\
         {}\n\n\
         Building on the discussion above, offer new insights or additions from your \
         professional perspective. In particular:\n\
         1. Avoid repeating points that have already been made\n\
         2. Complete and refine the earlier discussion\n\
         3. If you find problems in the earlier discussion, point them out and suggest improvements",
        round + 1,
        context
    )
}

/// How many agents take part in every round after the first.
pub(crate) fn follow_up_participants(total: usize) -> usize {
    total / 2 + 1
}
