//! Configuration for roundtable.
//!
//! Two plain structs, both constructed by the caller. No config files are read
//! here; [`ClientConfig`] derives serde traits so an embedding application can load
//! it from whatever format it already uses.
//!
//! - [`ClientConfig`]: endpoint, key and model for the reasoning client
//! - [`DiscussionConfig`]: round count, scheduling mode, pacing and memory size for
//!   a [`Group`](crate::group::Group) or
//!   [`DependencyGraph`](crate::dependency_graph::DependencyGraph)
//!
//! # Example
//!
//! ```rust
//! use roundtable::config::{ClientConfig, DiscussionConfig};
//! use std::time::Duration;
//!
//! let client = ClientConfig::new("sk-...").with_model("gpt-4o-mini");
//! assert_eq!(client.base_url, "https://api.openai.com");
//!
//! let discussion = DiscussionConfig::default()
//!     .with_max_rounds(3)
//!     .with_parallel(true)
//!     .with_pacing_delay(Duration::from_millis(200));
//! assert_eq!(discussion.max_rounds, 3);
//! ```

use crate::memory::{MemoryManager, DEFAULT_MEMORY_CAPACITY};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_CHAT_PATH: &str = "/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const ENV_API_KEY: &str = "ROUNDTABLE_API_KEY";
const ENV_BASE_URL: &str = "ROUNDTABLE_BASE_URL";
const ENV_MODEL: &str = "ROUNDTABLE_MODEL";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_chat_path() -> String {
    DEFAULT_CHAT_PATH.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Connection settings for an OpenAI-compatible chat endpoint.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the chat completions route, appended to `base_url`.
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    #[serde(default = "default_model")]
    pub model: String,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            chat_path: default_chat_path(),
            model: default_model(),
        }
    }

    /// Read `ROUNDTABLE_API_KEY`, and optionally `ROUNDTABLE_BASE_URL` and
    /// `ROUNDTABLE_MODEL`. Returns `None` when no API key is set.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var(ENV_API_KEY).ok().filter(|k| !k.trim().is_empty())?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = env::var(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Ok(model) = env::var(ENV_MODEL) {
            config.model = model;
        }
        Some(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_chat_path(mut self, chat_path: impl Into<String>) -> Self {
        self.chat_path = chat_path.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("")
    }
}

// Keeps the key out of logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("chat_path", &self.chat_path)
            .field("model", &self.model)
            .finish()
    }
}

/// Settings shared by the discussion schedulers.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscussionConfig {
    /// Number of rounds; values below one are treated as one.
    pub max_rounds: usize,
    /// Group only: run the selected agents through the hand-off scheduler.
    pub parallel: bool,
    /// Sleep after each successful agent invocation. Zero disables pacing.
    pub pacing_delay: Duration,
    /// Messages each agent memory keeps before evicting the oldest.
    pub memory_capacity: usize,
}

impl Default for DiscussionConfig {
    fn default() -> Self {
        Self {
            max_rounds: 1,
            parallel: false,
            pacing_delay: Duration::ZERO,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl DiscussionConfig {
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_pacing_delay(mut self, pacing_delay: Duration) -> Self {
        self.pacing_delay = pacing_delay;
        self
    }

    pub fn with_memory_capacity(mut self, memory_capacity: usize) -> Self {
        self.memory_capacity = memory_capacity;
        self
    }

    /// Round count after clamping to at least one.
    pub fn effective_rounds(&self) -> usize {
        self.max_rounds.max(1)
    }

    /// A memory manager sized for this discussion.
    pub fn memory_manager(&self) -> MemoryManager {
        MemoryManager::with_capacity(self.memory_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_deserialize_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"api_key": "k"}"#).unwrap();
        assert_eq!(config.api_key, "k");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.chat_path, DEFAULT_CHAT_PATH);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", ClientConfig::new("sk-secret"));
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_discussion_config_clamps_rounds() {
        let config = DiscussionConfig::default().with_max_rounds(0);
        assert_eq!(config.effective_rounds(), 1);
        assert_eq!(config.memory_manager().capacity(), DEFAULT_MEMORY_CAPACITY);
        assert!(config.pacing_delay.is_zero());
    }
}
