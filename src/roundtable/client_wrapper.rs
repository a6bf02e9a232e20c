//! A ClientWrapper is a wrapper around a reasoning service (usually a cloud LLM).
//! It provides a common interface the agents use to obtain completions.
//! It does not keep track of the conversation; agents keep their own history
//! in a [`Memory`](crate::memory::Memory) and pass the full message list on every call.

use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use std::error::Error;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

/// Author of a [`Message`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role {
    // instructions that frame the agent
    System,
    // a message sent by a human user (or the orchestrator)
    User,
    // lets the model know the content was generated as a response to a user message
    Assistant,
    // output of a tool invocation fed back to the model
    Tool,
}

impl Role {
    /// Wire name used by OpenAI-compatible chat endpoints.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token accounting reported by the service for one request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// One entry of a conversation.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    /// The actual content of the message. Stored as `Arc<str>` so cloning history is cheap.
    pub content: Arc<str>,
}

impl Message {
    pub fn new(role: Role, content: impl AsRef<str>) -> Self {
        Self {
            role,
            content: Arc::from(content.as_ref()),
        }
    }
}

/// A piece of a streamed reply.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageChunk {
    pub content: String,
    /// Set on the last chunk.
    pub is_final: bool,
}

/// Error type shared by every reasoning-service call.
pub type ClientError = Box<dyn Error + Send + Sync>;

/// A boxed stream of [`MessageChunk`]s.
pub type MessageChunkStream = Pin<Box<dyn Stream<Item = Result<MessageChunk, ClientError>> + Send>>;

/// Trait defining the interface to interact with a reasoning service.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send the full message list to the LLM and get the assistant reply.
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ClientError>;

    /// Like [`send_message`](ClientWrapper::send_message) but yields the reply in chunks.
    ///
    /// The default implementation performs a regular [`send_message`](ClientWrapper::send_message)
    /// call and yields the whole reply as one final chunk, so clients without a
    /// streaming transport still work with agents that request streaming.
    async fn send_message_stream(
        &self,
        messages: &[Message],
    ) -> Result<MessageChunkStream, ClientError> {
        let reply = self.send_message(messages).await?;
        let chunk = MessageChunk {
            content: reply.content.to_string(),
            is_final: true,
        };
        let chunks: MessageChunkStream = Box::pin(stream::iter(vec![Ok(chunk)]));
        Ok(chunks)
    }

    /// Identifier of the model behind this client.
    fn model_name(&self) -> &str;

    /// Hook to retrieve usage from the *last* send_message() call.
    /// Default impl returns None so clients that do not track usage don't have to.
    fn last_usage(&self) -> Option<TokenUsage> {
        None
    }
}
