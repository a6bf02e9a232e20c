//! Dependency-ordered multi-round discussion.
//!
//! A [`DependencyGraph`] holds agents as nodes with "depends on" edges and a
//! capability score per node.
//!
//! - **Round 0** runs every agent once. With edges, agents run in post-order
//!   (dependencies before dependents, registration order among independent nodes);
//!   without edges, in descending capability order.
//! - **Later rounds** run the top `len / 2 + 1` nodes by capability on the running
//!   input (topic plus rendered transcript). After each invocation the node's score
//!   becomes the mean of its old score and the relevance of its answer.
//!
//! Edges only order round 0; outputs are shared through the transcript, not passed
//! along edges. Execution is serial and the first failure aborts the run.
//!
//! # Example
//!
//! ```rust,no_run
//! use roundtable::dependency_graph::DependencyGraph;
//! use roundtable::Agent;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(pm: Arc<dyn Agent>, architect: Arc<dyn Agent>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = DependencyGraph::new(2, None);
//! graph.add_agent(pm);
//! graph.add_agent(architect);
//! graph.add_dependency("architect", "pm")?;
//!
//! let transcript = graph
//!     .execute(&CancellationToken::new(), "Design a ride-sharing backend")
//!     .await?;
//! println!("{}", transcript.render());
//! # Ok(())
//! # }
//! ```

use crate::config::DiscussionConfig;
use crate::roundtable::agent::Agent;
use crate::roundtable::callback::OutputCallback;
use crate::roundtable::orchestration::{
    first_round_prompt, follow_up_participants, follow_up_round_prompt, invoke_agent,
    OrchestrationError, RoundResult, Transcript,
};
use crate::roundtable::scoring::{relevance, score_agent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct Node {
    agent: Arc<dyn Agent>,
    dependencies: Vec<String>,
    capability: f64,
}

pub struct DependencyGraph {
    nodes: HashMap<String, Node>,
    // registration order
    order: Vec<String>,
    max_rounds: usize,
    callback: Option<Arc<dyn OutputCallback>>,
}

impl DependencyGraph {
    /// `max_rounds` below one is treated as one.
    pub fn new(max_rounds: usize, callback: Option<Arc<dyn OutputCallback>>) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            max_rounds: max_rounds.max(1),
            callback,
        }
    }

    pub fn from_config(config: &DiscussionConfig, callback: Option<Arc<dyn OutputCallback>>) -> Self {
        Self::new(config.max_rounds, callback)
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Add an agent, scoring it now. Re-adding a name replaces the node and drops
    /// its outgoing edges; edges of other nodes pointing at the name stay valid.
    pub fn add_agent(&mut self, agent: Arc<dyn Agent>) {
        let name = agent.name().to_string();
        let capability = score_agent(agent.as_ref());
        log::debug!("graph: agent '{}' added with capability {:.3}", name, capability);

        let node = Node {
            agent,
            dependencies: Vec::new(),
            capability,
        };
        if self.nodes.insert(name.clone(), node).is_none() {
            self.order.push(name);
        }
    }

    /// Declare that `dependent` must run after `dependency` in round 0.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) -> Result<(), OrchestrationError> {
        for name in [dependent, dependency] {
            if !self.nodes.contains_key(name) {
                return Err(OrchestrationError::AgentNotFound(name.to_string()));
            }
        }
        if dependent == dependency {
            return Err(OrchestrationError::InvalidDependency {
                dependent: dependent.to_string(),
                dependency: dependency.to_string(),
            });
        }
        if self
            .dependencies(dependent)
            .is_some_and(|deps| deps.iter().any(|d| d == dependency))
        {
            return Ok(());
        }

        // The new edge closes a cycle iff `dependency` already reaches `dependent`.
        if let Some(path) = self.path_between(dependency, dependent) {
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(dependent.to_string());
            cycle.extend(path);
            return Err(OrchestrationError::CircularDependency(cycle));
        }

        if let Some(node) = self.nodes.get_mut(dependent) {
            node.dependencies.push(dependency.to_string());
        }
        Ok(())
    }

    pub fn dependencies(&self, name: &str) -> Option<&[String]> {
        self.nodes.get(name).map(|n| n.dependencies.as_slice())
    }

    pub fn capability(&self, name: &str) -> Option<f64> {
        self.nodes.get(name).map(|n| n.capability)
    }

    /// Agent names in registration order.
    pub fn agent_names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn has_any_dependencies(&self) -> bool {
        self.nodes.values().any(|n| !n.dependencies.is_empty())
    }

    /// Dependencies-first order over every node, starting points taken in
    /// registration order.
    pub fn topological_order(&self) -> Result<Vec<String>, OrchestrationError> {
        let mut done = HashSet::new();
        let mut stack = Vec::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for name in &self.order {
            self.visit(name, &mut done, &mut stack, &mut order)?;
        }
        Ok(order)
    }

    /// Node names sorted by capability, highest first. Ties keep registration order.
    pub fn by_capability(&self) -> Vec<String> {
        let mut names = self.order.clone();
        names.sort_by(|a, b| {
            let a = self.capability(a).unwrap_or_default();
            let b = self.capability(b).unwrap_or_default();
            b.total_cmp(&a)
        });
        names
    }

    fn visit(
        &self,
        name: &str,
        done: &mut HashSet<String>,
        stack: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<(), OrchestrationError> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(OrchestrationError::CircularDependency(cycle));
        }
        let node = self
            .nodes
            .get(name)
            .ok_or_else(|| OrchestrationError::AgentNotFound(name.to_string()))?;

        stack.push(name.to_string());
        for dependency in &node.dependencies {
            self.visit(dependency, done, stack, order)?;
        }
        stack.pop();

        done.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    /// A dependency path `from → … → to`, if one exists.
    fn path_between(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let mut seen = HashSet::new();
        let mut path = vec![from.to_string()];
        self.search(to, &mut seen, &mut path).then_some(path)
    }

    fn search(&self, target: &str, seen: &mut HashSet<String>, path: &mut Vec<String>) -> bool {
        let Some(current) = path.last().cloned() else {
            return false;
        };
        if current == target {
            return true;
        }
        if !seen.insert(current.clone()) {
            return false;
        }
        let Some(node) = self.nodes.get(&current) else {
            return false;
        };
        for next in &node.dependencies {
            path.push(next.clone());
            if self.search(target, seen, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    fn agent(&self, name: &str) -> Result<Arc<dyn Agent>, OrchestrationError> {
        self.nodes
            .get(name)
            .map(|n| Arc::clone(&n.agent))
            .ok_or_else(|| OrchestrationError::AgentNotFound(name.to_string()))
    }

    /// Run the discussion and return its transcript.
    pub async fn execute(
        &mut self,
        cancel: &CancellationToken,
        input: &str,
    ) -> Result<Transcript, OrchestrationError> {
        if self.nodes.is_empty() {
            return Err(OrchestrationError::NoAgents);
        }
        if let Some(callback) = &self.callback {
            for node in self.nodes.values() {
                node.agent.set_output_callback(Arc::clone(callback));
            }
        }
        log::info!(
            "graph: starting {} round(s) with {} agent(s)",
            self.max_rounds,
            self.nodes.len()
        );

        let mut transcript = Transcript::new();
        let first = self.execute_first_round(cancel, input).await?;
        self.round_complete(0, &first).await;
        transcript.push(first);

        for round in 1..self.max_rounds {
            let running_input = transcript.running_input(input);
            let results = self.execute_subsequent_round(cancel, &running_input, round).await?;
            self.round_complete(round, &results).await;
            transcript.push(results);
        }

        if let Some(callback) = &self.callback {
            callback.on_all_complete(&transcript).await;
        }
        Ok(transcript)
    }

    async fn execute_first_round(
        &self,
        cancel: &CancellationToken,
        input: &str,
    ) -> Result<RoundResult, OrchestrationError> {
        let order = if self.has_any_dependencies() {
            self.topological_order()?
        } else {
            self.by_capability()
        };
        let prompt = if self.max_rounds > 1 {
            first_round_prompt(input)
        } else {
            input.to_string()
        };

        let mut results = RoundResult::new();
        for name in order {
            let agent = self.agent(&name)?;
            let output = invoke_agent(&agent, cancel, &prompt).await?;
            results.insert(name, output);
        }
        Ok(results)
    }

    async fn execute_subsequent_round(
        &mut self,
        cancel: &CancellationToken,
        running_input: &str,
        round: usize,
    ) -> Result<RoundResult, OrchestrationError> {
        let prompt = follow_up_round_prompt(round, running_input);
        let selected: Vec<String> = self
            .by_capability()
            .into_iter()
            .take(follow_up_participants(self.nodes.len()))
            .collect();
        log::debug!("graph round {}: selected {:?}", round + 1, selected);

        let mut results = RoundResult::new();
        for name in selected {
            let agent = self.agent(&name)?;
            let output = invoke_agent(&agent, cancel, &prompt).await?;
            if let Some(node) = self.nodes.get_mut(&name) {
                node.capability = (node.capability + relevance(&prompt, &output)) / 2.0;
            }
            results.insert(name, output);
        }
        Ok(results)
    }

    async fn round_complete(&self, round: usize, results: &RoundResult) {
        log::info!("graph: round {} complete ({} answer(s))", round + 1, results.len());
        if let Some(callback) = &self.callback {
            callback.on_round_complete(round, results).await;
        }
    }
}
