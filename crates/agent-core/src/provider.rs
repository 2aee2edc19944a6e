//! Streaming completion backend used by [`crate::LlmAgent`].

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::error::Result;
use super::types::Message;

/// One completion call: system prompt, history and the new user turn.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

/// Text deltas of a completion.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name shown in the agent announcement.
    fn name(&self) -> &'static str;

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream>;
}
