//! Agent selection for [`Group`](crate::group::Group).
//!
//! A selector picks which agents should handle an input. When a group has a selector
//! and it returns at least one agent, only the first selected agent answers that
//! round; an empty selection falls back to capability ranking.
//!
//! [`LlmSelector`] asks a reasoning service to choose by index.

use crate::client_wrapper::{ClientWrapper, Message, Role};
use crate::roundtable::agent::{until_cancelled, Agent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Chooses the agents best suited to an input.
#[async_trait]
pub trait AgentSelector: Send + Sync {
    /// Return at most `limit` agents from `candidates`, best first. An empty result
    /// means "no opinion".
    async fn select_agents(
        &self,
        cancel: &CancellationToken,
        input: &str,
        candidates: &[Arc<dyn Agent>],
        limit: usize,
    ) -> Vec<Arc<dyn Agent>>;
}

/// Delegates the choice to a language model.
///
/// The model sees every candidate's index, name, expertise and description and must
/// answer with a single index. Any failure (transport error, unparsable reply, index
/// out of range) yields an empty selection.
pub struct LlmSelector {
    client: Arc<dyn ClientWrapper>,
}

impl LlmSelector {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self { client }
    }

    pub fn handoff_prompt(input: &str, candidates: &[Arc<dyn Agent>]) -> String {
        let mut descriptions = String::new();
        for (index, agent) in candidates.iter().enumerate() {
            descriptions.push_str(&format!(
                "{}. Name: {}\n   Expertise: {}\n   Description: {}\n\n",
                index,
                agent.name(),
                agent.expertise().unwrap_or("general"),
                agent.description().unwrap_or(""),
            ));
        }

        format!(
            "As an AI coordinator, analyze the user input and select the most suitable agent \
             based on their expertise and capabilities.\n\n\
             User Input: {}\n\n\
             Available Agents:\n{}\
             Your task:\n\
             1. Analyze the input characteristics (language, content, requirements)\n\
             2. Review each agent's expertise and capabilities\n\
             3. Select the most suitable agent for handling this input\n\
             4. Return ONLY the index number (0-{}) of the selected agent\n\n\
             Response format: Single number representing the selected agent's index",
            input,
            descriptions,
            candidates.len().saturating_sub(1)
        )
    }
}

/// Read the leading integer of a model reply and check it against `count`.
pub fn parse_selection_index(reply: &str, count: usize) -> Option<usize> {
    let reply = reply.trim_start();
    let end = reply
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(reply.len());
    let index: i64 = reply[..end].parse().ok()?;
    usize::try_from(index).ok().filter(|&i| i < count)
}

#[async_trait]
impl AgentSelector for LlmSelector {
    async fn select_agents(
        &self,
        cancel: &CancellationToken,
        input: &str,
        candidates: &[Arc<dyn Agent>],
        limit: usize,
    ) -> Vec<Arc<dyn Agent>> {
        if candidates.is_empty() || limit == 0 {
            return Vec::new();
        }

        let messages = [
            Message::new(
                Role::System,
                "You are an AI coordinator responsible for selecting the most suitable agent for handling user inputs.",
            ),
            Message::new(Role::User, Self::handoff_prompt(input, candidates)),
        ];

        let reply = match until_cancelled(cancel, self.client.send_message(&messages)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                log::warn!("agent selection failed: {}", err);
                return Vec::new();
            }
            Err(_) => return Vec::new(),
        };

        match parse_selection_index(&reply.content, candidates.len()) {
            Some(index) => {
                log::debug!("selector picked '{}'", candidates[index].name());
                vec![Arc::clone(&candidates[index])]
            }
            None => {
                log::warn!("selector returned an unusable answer: {:?}", reply.content);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection_index() {
        assert_eq!(parse_selection_index("1", 3), Some(1));
        assert_eq!(parse_selection_index("  2\n", 3), Some(2));
        assert_eq!(parse_selection_index("0. The architect", 3), Some(0));
        assert_eq!(parse_selection_index("3", 3), None);
        assert_eq!(parse_selection_index("-1", 3), None);
        assert_eq!(parse_selection_index("agent 1", 3), None);
        assert_eq!(parse_selection_index("", 3), None);
    }
}
