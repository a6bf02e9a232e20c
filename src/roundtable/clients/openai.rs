//! The `OpenAIClient` struct implements `ClientWrapper` for any OpenAI-compatible
//! chat completions endpoint, capturing the assistant response and the token usage
//! of the last call. Streamed replies are read as server-sent events, one
//! [`MessageChunk`](crate::client_wrapper::MessageChunk) per content delta.
//!
//! # Example
//!
//! ```rust,no_run
//! use roundtable::clients::openai::OpenAIClient;
//! use roundtable::client_wrapper::{ClientWrapper, Message, Role};
//! use roundtable::config::ClientConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClientConfig::from_env().expect("ROUNDTABLE_API_KEY not set");
//!     let client = OpenAIClient::from_config(&config);
//!
//!     let reply = client
//!         .send_message(&[
//!             Message::new(Role::System, "You are an assistant."),
//!             Message::new(Role::User, "Hello!"),
//!         ])
//!         .await
//!         .unwrap();
//!     println!("Assistant: {}", reply.content);
//!
//!     if let Some(usage) = client.last_usage() {
//!         println!("tokens: {} in / {} out", usage.input_tokens, usage.output_tokens);
//!     }
//! }
//! ```

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use openai_rust::chat;
use openai_rust2 as openai_rust;

use crate::client_wrapper::{ClientError, ClientWrapper, Message, MessageChunkStream, Role, TokenUsage};
use crate::clients::common::{get_http_client, send_and_stream, send_and_track};
use crate::config::ClientConfig;

/// Client for OpenAI-compatible chat completion APIs.
pub struct OpenAIClient {
    client: openai_rust::Client,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    chat_path: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    /// Build a client for the endpoint, key and model described by `config`.
    pub fn from_config(config: &ClientConfig) -> Self {
        let http = get_http_client(&config.base_url);
        OpenAIClient {
            client: openai_rust::Client::new_with_client_and_base_url(
                &config.api_key,
                http.clone(),
                &config.base_url,
            ),
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            chat_path: config.chat_path.clone(),
            token_usage: Mutex::new(None),
        }
    }

    /// Shorthand for the default OpenAI endpoint with an explicit model.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::from_config(&ClientConfig::new(api_key).with_model(model))
    }

    /// Full URL of the chat completions endpoint; the path replaces any path of
    /// the base URL, as for non-streamed calls.
    fn chat_url(&self) -> Result<reqwest::Url, ClientError> {
        let mut url = reqwest::Url::parse(&self.base_url)?;
        url.set_path(&self.chat_path);
        Ok(url)
    }

    fn format_messages(messages: &[Message]) -> Vec<chat::Message> {
        messages
            .iter()
            .map(|msg| chat::Message {
                role: match msg.role {
                    Role::System => "system".to_owned(),
                    Role::Assistant => "assistant".to_owned(),
                    // tool output goes back to the model as a user turn
                    Role::User | Role::Tool => "user".to_owned(),
                },
                content: msg.content.to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ClientError> {
        let formatted_messages = Self::format_messages(messages);
        log::debug!(
            "sending {} message(s) to model '{}'",
            formatted_messages.len(),
            self.model
        );

        let content = send_and_track(
            &self.client,
            &self.model,
            formatted_messages,
            Some(self.chat_path.clone()),
            &self.token_usage,
        )
        .await?;

        Ok(Message::new(Role::Assistant, content))
    }

    async fn send_message_stream(
        &self,
        messages: &[Message],
    ) -> Result<MessageChunkStream, ClientError> {
        let formatted_messages = Self::format_messages(messages);
        let url = self.chat_url()?;
        log::debug!(
            "streaming {} message(s) from model '{}' at {}",
            formatted_messages.len(),
            self.model,
            url
        );

        send_and_stream(&self.http, url.as_str(), &self.api_key, &self.model, &formatted_messages).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn last_usage(&self) -> Option<TokenUsage> {
        self.token_usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
