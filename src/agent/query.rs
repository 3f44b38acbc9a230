//! The query stream interface.
//!
//! The agent is reached through one call: hand it a prompt plus options and
//! get back a lazy, single-pass stream of messages. Everything behind that
//! call (transport, framing, tool execution) belongs to the agent.

use crate::credentials::Credential;
use crate::error::QueryError;
use crate::models::Message;
use futures::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Boxed stream of decoded messages. Ends on close or after the first error.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<Message, QueryError>> + Send>>;

/// Options forwarded to the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub model: String,
    pub max_turns: Option<u32>,
    pub system_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
    /// Extra arguments passed through untouched.
    pub extra_args: Vec<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            model: crate::config::DEFAULT_MODEL.to_string(),
            max_turns: None,
            system_prompt: None,
            allowed_tools: Vec::new(),
            extra_args: Vec::new(),
        }
    }
}

/// One query: the prompt, its options, and the credential to run it with.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub prompt: String,
    pub options: QueryOptions,
    /// Forwarded to the agent in its own environment variable.
    pub credential: Option<Credential>,
}

impl QueryRequest {
    pub fn new(prompt: impl Into<String>, options: QueryOptions) -> Self {
        Self {
            prompt: prompt.into(),
            options,
            credential: None,
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }
}

/// Something that can open a message stream for a prompt.
///
/// Every call opens a fresh stream; streams are never restarted or replayed.
/// Implementations should stop yielding once `cancel` fires.
pub trait QuerySource: Send + Sync {
    fn query(&self, request: QueryRequest, cancel: CancellationToken) -> MessageStream;
}

impl<T: QuerySource + ?Sized> QuerySource for &T {
    fn query(&self, request: QueryRequest, cancel: CancellationToken) -> MessageStream {
        (**self).query(request, cancel)
    }
}

impl<T: QuerySource + ?Sized> QuerySource for Box<T> {
    fn query(&self, request: QueryRequest, cancel: CancellationToken) -> MessageStream {
        (**self).query(request, cancel)
    }
}
