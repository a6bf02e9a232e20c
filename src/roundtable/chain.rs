//! Sequential pipeline of agents exposed as a single agent.
//!
//! A [`ChainAgent`] feeds its input to the first member, that member's output to the
//! next, and so on; the whole pass repeats `rounds` times. Any member failure stops
//! the chain.
//!
//! ```rust,no_run
//! use roundtable::chain::ChainAgent;
//! use roundtable::Agent;
//! use std::sync::Arc;
//!
//! # fn build(drafter: Arc<dyn Agent>, reviewer: Arc<dyn Agent>) {
//! let pipeline = ChainAgent::new("draft-and-review", 2, vec![drafter, reviewer]);
//! # }
//! ```

use crate::client_wrapper::Message;
use crate::roundtable::agent::{Agent, AgentError};
use crate::roundtable::callback::OutputCallback;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ChainAgent {
    name: String,
    agents: Vec<Arc<dyn Agent>>,
    rounds: usize,
}

impl ChainAgent {
    /// `rounds` below one are treated as one.
    pub fn new(name: impl Into<String>, rounds: usize, agents: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            name: name.into(),
            agents,
            rounds: rounds.max(1),
        }
    }

    pub fn members(&self) -> &[Arc<dyn Agent>] {
        &self.agents
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }
}

#[async_trait]
impl Agent for ChainAgent {
    fn name(&self) -> &str {
        &self.name
    }

    /// Union of the members' capabilities, first occurrence first.
    fn capabilities(&self) -> Vec<String> {
        let mut capabilities: Vec<String> = Vec::new();
        for capability in self.agents.iter().flat_map(|a| a.capabilities()) {
            if !capabilities.contains(&capability) {
                capabilities.push(capability);
            }
        }
        capabilities
    }

    /// The last member's history; it holds the chain's final outputs.
    fn history(&self) -> Vec<Message> {
        self.agents
            .last()
            .map(|agent| agent.history())
            .unwrap_or_default()
    }

    fn set_output_callback(&self, callback: Arc<dyn OutputCallback>) {
        for agent in &self.agents {
            agent.set_output_callback(Arc::clone(&callback));
        }
    }

    async fn execute(&self, cancel: &CancellationToken, input: &str) -> Result<String, AgentError> {
        let mut result = input.to_string();

        for round in 0..self.rounds {
            for agent in &self.agents {
                if cancel.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                log::debug!(
                    "chain '{}' round {}: running '{}'",
                    self.name,
                    round + 1,
                    agent.name()
                );
                result = agent.execute(cancel, &result).await.map_err(|err| match err {
                    AgentError::ExecutionFailed(msg) => AgentError::ExecutionFailed(format!(
                        "chain member '{}' failed: {}",
                        agent.name(),
                        msg
                    )),
                    other => other,
                })?;
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Suffix(&'static str);

    #[async_trait]
    impl Agent for Suffix {
        fn name(&self) -> &str {
            self.0
        }

        fn capabilities(&self) -> Vec<String> {
            vec!["testing".to_string(), self.0.to_string()]
        }

        async fn execute(&self, _cancel: &CancellationToken, input: &str) -> Result<String, AgentError> {
            if self.0 == "fail" {
                return Err(AgentError::ExecutionFailed("boom".into()));
            }
            Ok(format!("{}{}", input, self.0))
        }
    }

    #[tokio::test]
    async fn test_chain_pipes_output_through_rounds() {
        let chain = ChainAgent::new("c", 2, vec![Arc::new(Suffix("a")), Arc::new(Suffix("b"))]);
        let output = chain.execute(&CancellationToken::new(), ">").await.unwrap();
        assert_eq!(output, ">abab");
        assert_eq!(chain.capabilities(), vec!["testing", "a", "b"]);
    }

    #[tokio::test]
    async fn test_chain_stops_on_failure() {
        let chain = ChainAgent::new(
            "c",
            1,
            vec![Arc::new(Suffix("fail")), Arc::new(Suffix("never"))],
        );
        let err = chain.execute(&CancellationToken::new(), "x").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Agent execution failed: chain member 'fail' failed: boom"
        );
    }

    #[test]
    fn test_zero_rounds_clamped() {
        assert_eq!(ChainAgent::new("c", 0, Vec::new()).rounds(), 1);
    }
}
