//! Unified LLM provider using the `llm` crate.
//!
//! Wraps multiple providers (Anthropic, `OpenAI`, Google, Groq, Mistral)
//! behind a common interface.

use async_trait::async_trait;
use futures::StreamExt;
use llm::LLMProvider;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{ChatMessage, StreamChunk};

use crate::error::{AgentError, Result};
use crate::provider::{CompletionRequest, CompletionStream, LlmProvider};
use crate::types::{Message, MessageRole};

/// Backend family a model id resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Google,
    Groq,
    Mistral,
}

impl ProviderKind {
    /// Resolve a model id such as `anthropic/claude-sonnet-4-5` or `gpt-4o`.
    ///
    /// Returns the provider and the model name with any provider prefix removed.
    #[must_use]
    pub fn resolve(model: &str) -> Option<(Self, &str)> {
        if let Some((prefix, name)) = model.split_once('/') {
            let kind = match prefix {
                "anthropic" => Self::Anthropic,
                "openai" => Self::OpenAi,
                "google" | "gemini" => Self::Google,
                "groq" => Self::Groq,
                "mistral" => Self::Mistral,
                _ => return None,
            };
            return Some((kind, name));
        }

        let kind = if model.starts_with("claude") {
            Self::Anthropic
        } else if model.starts_with("gpt") || model.starts_with("o1") || model.starts_with("o3") {
            Self::OpenAi
        } else if model.starts_with("gemini") {
            Self::Google
        } else if model.starts_with("mistral") || model.starts_with("codestral") {
            Self::Mistral
        } else {
            return None;
        };
        Some((kind, model))
    }

    /// Provider name used for credential lookup.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Groq => "groq",
            Self::Mistral => "mistral",
        }
    }

    /// Environment variable consulted when no key was supplied at runtime.
    #[must_use]
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Google => "GEMINI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::Mistral => "MISTRAL_API_KEY",
        }
    }

    /// Edit format a model of this family handles best.
    #[must_use]
    pub const fn native_edit_format(self) -> &'static str {
        match self {
            Self::Anthropic | Self::OpenAi => "diff",
            Self::Google | Self::Groq | Self::Mistral => "whole",
        }
    }

    const fn backend(self) -> LLMBackend {
        match self {
            Self::Anthropic => LLMBackend::Anthropic,
            Self::OpenAi => LLMBackend::OpenAI,
            Self::Google => LLMBackend::Google,
            Self::Groq => LLMBackend::Groq,
            Self::Mistral => LLMBackend::Mistral,
        }
    }
}

/// Unified LLM provider supporting multiple backends.
pub struct UnifiedProvider {
    inner: Box<dyn LLMProvider>,
    name: &'static str,
}

impl std::fmt::Debug for UnifiedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedProvider")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl UnifiedProvider {
    /// Build a provider for one model.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] for an empty key and
    /// [`AgentError::Provider`] if the backend rejects the configuration.
    pub fn new(kind: ProviderKind, api_key: &str, model: &str, max_tokens: u32) -> Result<Self> {
        if api_key.is_empty() {
            return Err(AgentError::ApiKeyMissing(kind.name().to_string()));
        }

        let provider = LLMBuilder::new()
            .backend(kind.backend())
            .api_key(api_key)
            .model(model)
            .max_tokens(max_tokens)
            .build()
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        Ok(Self {
            inner: provider,
            name: kind.name(),
        })
    }
}

/// Convert our messages to the llm crate format.
fn convert_messages(messages: &[Message], system: Option<&str>) -> Vec<ChatMessage> {
    let mut result = Vec::with_capacity(messages.len() + 1);

    // System context travels as a leading user message
    if let Some(sys) = system {
        result.push(
            ChatMessage::user()
                .content(format!("[System]\n{sys}"))
                .build(),
        );
    }

    for msg in messages {
        let chat_msg = match msg.role {
            MessageRole::User => ChatMessage::user().content(msg.content.clone()).build(),
            MessageRole::Assistant => ChatMessage::assistant()
                .content(msg.content.clone())
                .build(),
        };
        result.push(chat_msg);
    }

    result
}

#[async_trait]
impl LlmProvider for UnifiedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let messages = convert_messages(&request.messages, request.system.as_deref());

        let stream_result = self
            .inner
            .chat_stream_with_tools(&messages, None)
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        let stream = async_stream::stream! {
            futures::pin_mut!(stream_result);

            while let Some(chunk) = stream_result.next().await {
                match chunk {
                    Ok(StreamChunk::Text(text)) => yield Ok(text),
                    Ok(StreamChunk::Done { .. }) => break,
                    Ok(_) => {}
                    Err(e) => {
                        yield Err(AgentError::Provider(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
