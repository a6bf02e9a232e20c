//! Capability-ranked multi-round discussion.
//!
//! A [`Group`] keeps an ordered list of agents and, for every round:
//!
//! 1. asks its [`AgentSelector`] (if one is set) for the best agent; a non-empty
//!    selection means only that agent answers, on the unframed input
//! 2. otherwise ranks the agents by freshly computed capability score and runs all
//!    of them in round 0, the top `len / 2 + 1` afterwards
//!
//! Selected agents run either serially or through the hand-off scheduler
//! ([`parallel`](Group::new) mode): every agent gets its own task, but a one-slot
//! token passed from task to task keeps the start order equal to the ranking and
//! allows a single active invocation at a time.
//!
//! When the run ends the memory of the group's task is cleared, whether the run
//! succeeded, failed or was dropped half way. Dropping a run also aborts the tasks
//! of its current round.
//!
//! # Example
//!
//! ```rust,no_run
//! use roundtable::agent::ExpertAgent;
//! use roundtable::clients::openai::OpenAIClient;
//! use roundtable::group::Group;
//! use roundtable::memory::{MemoryManager, TaskContext};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(OpenAIClient::new("key", "gpt-4o-mini"));
//! let task = TaskContext::new(Arc::new(MemoryManager::new()));
//!
//! let mut group = Group::new(3, false, None, task.clone());
//! group.add_agent(Arc::new(ExpertAgent::new(
//!     "pm", "product_management", "Owns the roadmap", client.clone(), task.clone(),
//! )));
//! group.add_agent(Arc::new(ExpertAgent::new(
//!     "architect", "system_architecture", "Designs the platform", client, task,
//! )));
//!
//! let transcript = group
//!     .execute(&CancellationToken::new(), "Should we build a plugin marketplace?")
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::DiscussionConfig;
use crate::roundtable::agent::{Agent, AgentError};
use crate::roundtable::callback::OutputCallback;
use crate::roundtable::memory::TaskContext;
use crate::roundtable::orchestration::{
    first_round_prompt, follow_up_participants, follow_up_round_prompt, invoke_agent,
    OrchestrationError, RoundResult, Transcript,
};
use crate::roundtable::scoring::score_agent;
use crate::roundtable::selector::AgentSelector;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Clears the task memory when dropped, including when the run future is dropped.
struct ClearTaskOnDrop(TaskContext);

impl Drop for ClearTaskOnDrop {
    fn drop(&mut self) {
        if self.0.clear() {
            log::debug!("group: cleared memory of task '{}'", self.0.task_id());
        }
    }
}

pub struct Group {
    agents: Vec<Arc<dyn Agent>>,
    max_rounds: usize,
    parallel: bool,
    pacing_delay: Duration,
    callback: Option<Arc<dyn OutputCallback>>,
    selector: Option<Arc<dyn AgentSelector>>,
    task: TaskContext,
}

impl Group {
    /// `max_rounds` below one is treated as one. `task` names the memory that is
    /// cleared after every run; agents sharing the discussion should be built on
    /// clones of the same context.
    pub fn new(
        max_rounds: usize,
        parallel: bool,
        callback: Option<Arc<dyn OutputCallback>>,
        task: TaskContext,
    ) -> Self {
        Self {
            agents: Vec::new(),
            max_rounds: max_rounds.max(1),
            parallel,
            pacing_delay: Duration::ZERO,
            callback,
            selector: None,
            task,
        }
    }

    pub fn from_config(
        config: &DiscussionConfig,
        callback: Option<Arc<dyn OutputCallback>>,
        task: TaskContext,
    ) -> Self {
        Self::new(config.max_rounds, config.parallel, callback, task)
            .with_pacing_delay(config.pacing_delay)
    }

    /// Sleep this long after every successful invocation.
    pub fn with_pacing_delay(mut self, delay: Duration) -> Self {
        self.pacing_delay = delay;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn AgentSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn set_selector(&mut self, selector: Option<Arc<dyn AgentSelector>>) {
        self.selector = selector;
    }

    /// Append an agent and hand it the group's callback.
    pub fn add_agent(&mut self, agent: Arc<dyn Agent>) {
        if let Some(callback) = &self.callback {
            agent.set_output_callback(Arc::clone(callback));
        }
        log::debug!("group: agent '{}' added", agent.name());
        self.agents.push(agent);
    }

    pub fn agents(&self) -> &[Arc<dyn Agent>] {
        &self.agents
    }

    pub fn task_context(&self) -> &TaskContext {
        &self.task
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// The `count` best agents by freshly computed score, best first. Ties keep
    /// registration order.
    pub fn select_top_agents(&self, count: usize) -> Vec<Arc<dyn Agent>> {
        let mut scored: Vec<(f64, &Arc<dyn Agent>)> = self
            .agents
            .iter()
            .map(|agent| (score_agent(agent.as_ref()), agent))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .take(count)
            .map(|(_, agent)| Arc::clone(agent))
            .collect()
    }

    /// Run the discussion and return its transcript.
    pub async fn execute(
        &mut self,
        cancel: &CancellationToken,
        input: &str,
    ) -> Result<Transcript, OrchestrationError> {
        if self.agents.is_empty() {
            return Err(OrchestrationError::NoAgents);
        }
        log::info!(
            "group: starting {} round(s) with {} agent(s), task '{}'",
            self.max_rounds,
            self.agents.len(),
            self.task.task_id()
        );

        let _clear_on_exit = ClearTaskOnDrop(self.task.clone());
        self.run_rounds(cancel, input).await
    }

    async fn run_rounds(
        &self,
        cancel: &CancellationToken,
        input: &str,
    ) -> Result<Transcript, OrchestrationError> {
        let mut transcript = Transcript::new();

        for round in 0..self.max_rounds {
            let running_input = if round == 0 {
                input.to_string()
            } else {
                transcript.running_input(input)
            };
            let results = self.execute_round(cancel, round, &running_input).await?;

            log::info!("group: round {} complete ({} answer(s))", round + 1, results.len());
            if let Some(callback) = &self.callback {
                callback.on_round_complete(round, &results).await;
            }
            transcript.push(results);
        }

        if let Some(callback) = &self.callback {
            callback.on_all_complete(&transcript).await;
        }
        Ok(transcript)
    }

    async fn execute_round(
        &self,
        cancel: &CancellationToken,
        round: usize,
        input: &str,
    ) -> Result<RoundResult, OrchestrationError> {
        if let Some(agent) = self.select(cancel, input).await {
            log::debug!("group round {}: selector chose '{}'", round + 1, agent.name());
            let output = invoke_agent(&agent, cancel, input).await?;
            let mut results = RoundResult::new();
            results.insert(agent.name(), output);
            return Ok(results);
        }

        let (agents, prompt) = if round == 0 {
            let prompt = if self.max_rounds > 1 {
                first_round_prompt(input)
            } else {
                input.to_string()
            };
            (self.select_top_agents(self.agents.len()), prompt)
        } else {
            (
                self.select_top_agents(follow_up_participants(self.agents.len())),
                follow_up_round_prompt(round, input),
            )
        };

        if self.parallel {
            self.execute_parallel(cancel, agents, &prompt).await
        } else {
            self.execute_serial(cancel, &agents, &prompt).await
        }
    }

    async fn select(&self, cancel: &CancellationToken, input: &str) -> Option<Arc<dyn Agent>> {
        let selector = self.selector.as_ref()?;
        selector
            .select_agents(cancel, input, &self.agents, 1)
            .await
            .into_iter()
            .next()
    }

    async fn pace(&self) {
        if !self.pacing_delay.is_zero() {
            tokio::time::sleep(self.pacing_delay).await;
        }
    }

    /// Run `agents` one after another; the first error aborts the round.
    pub async fn execute_serial(
        &self,
        cancel: &CancellationToken,
        agents: &[Arc<dyn Agent>],
        input: &str,
    ) -> Result<RoundResult, OrchestrationError> {
        let mut results = RoundResult::new();
        for agent in agents {
            let output = invoke_agent(agent, cancel, input).await?;
            results.insert(agent.name(), output);
            self.pace().await;
        }
        Ok(results)
    }

    /// Run `agents` as one task each, chained by a hand-off token.
    ///
    /// Task *i* waits for task *i − 1* to release the token, so invocations start in
    /// the given order and never overlap. The token is released after the
    /// invocation whatever its outcome; a task that dies without releasing it drops
    /// its sender, which releases it as well. Every task runs to completion and the
    /// first recorded error is returned. Dropping the returned future aborts the
    /// tasks that are still pending.
    pub async fn execute_parallel(
        &self,
        cancel: &CancellationToken,
        agents: Vec<Arc<dyn Agent>>,
        input: &str,
    ) -> Result<RoundResult, OrchestrationError> {
        let results = Arc::new(Mutex::new(RoundResult::new()));
        let first_error: Arc<Mutex<Option<OrchestrationError>>> = Arc::new(Mutex::new(None));
        let input: Arc<str> = Arc::from(input);

        let (seed, mut turn) = oneshot::channel::<()>();
        // the first task may start right away
        let _ = seed.send(());

        let mut tasks = JoinSet::new();
        let mut names = HashMap::with_capacity(agents.len());
        for agent in agents {
            let (release, next_turn) = oneshot::channel::<()>();
            let my_turn = std::mem::replace(&mut turn, next_turn);

            let name = agent.name().to_string();
            let cancel = cancel.clone();
            let input = Arc::clone(&input);
            let results = Arc::clone(&results);
            let first_error = Arc::clone(&first_error);
            let pacing = self.pacing_delay;

            let handle = tasks.spawn(async move {
                // Err means the predecessor dropped its sender; the token is ours either way.
                let _ = my_turn.await;

                match invoke_agent(&agent, &cancel, &input).await {
                    Ok(output) => {
                        results.lock().await.insert(agent.name(), output);
                        if !pacing.is_zero() {
                            tokio::time::sleep(pacing).await;
                        }
                    }
                    Err(err) => {
                        first_error.lock().await.get_or_insert(err);
                    }
                }

                let _ = release.send(());
            });
            names.insert(handle.id(), name);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(join_error) = joined {
                let name = names.remove(&join_error.id()).unwrap_or_default();
                log::error!("group: task for agent '{}' did not complete: {}", name, join_error);
                first_error
                    .lock()
                    .await
                    .get_or_insert(OrchestrationError::ExecutionFailed {
                        agent: name,
                        source: AgentError::ExecutionFailed(join_error.to_string()),
                    });
            }
        }

        if let Some(err) = first_error.lock().await.take() {
            return Err(err);
        }
        let round = std::mem::take(&mut *results.lock().await);
        Ok(round)
    }
}
