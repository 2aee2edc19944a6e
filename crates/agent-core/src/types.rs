//! Core agent types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A message exchanged with the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role: "user" or "assistant".
    pub role: MessageRole,

    /// Message text.
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Model-facing message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Role of a transcript entry shown to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Prompt typed by the user.
    User,
    /// Model response.
    Assistant,
    /// Status line produced by the server (file added, mode switched, ...).
    Info,
    /// Context text injected into the chat, e.g. a scraped web page.
    Text,
}

/// One entry of the client-visible transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

impl TranscriptEntry {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A commit made by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
}

/// Operating mode of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Primary code-editing mode.
    #[default]
    Code,
    /// Architect proposes, an editor model applies.
    Architect,
    /// Questions only, no edits.
    Ask,
    /// Identify which files need to change.
    Context,
}

impl ChatMode {
    /// Only the code-editing mode re-submits self-directed follow-ups.
    #[must_use]
    pub const fn allows_reflections(self) -> bool {
        matches!(self, Self::Code)
    }

    /// Edit format used by an agent in this mode.
    ///
    /// Code mode inherits the model's native format; every other mode uses
    /// its own name.
    #[must_use]
    pub fn edit_format(self, native: &str) -> String {
        match self {
            Self::Code => native.to_string(),
            other => other.as_str().to_string(),
        }
    }

    /// Whether a switch into this mode condenses the prior transcript.
    #[must_use]
    pub const fn summarizes_history(self) -> bool {
        !matches!(self, Self::Code | Self::Ask)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Architect => "architect",
            Self::Ask => "ask",
            Self::Context => "context",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "code" => Ok(Self::Code),
            "architect" => Ok(Self::Architect),
            "ask" => Ok(Self::Ask),
            "context" => Ok(Self::Context),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Reasoning effort level for thinking-capable models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Non-default parameters carried by a mode switch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchOptions {
    /// Editor model used by architect mode.
    pub architect_model: Option<String>,
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Thinking-token budget for models that support it.
    pub thinking_tokens: Option<u32>,
}

impl SwitchOptions {
    /// Human-readable description of the non-default parameters.
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        let mut parts = Vec::new();
        if let Some(model) = &self.architect_model {
            parts.push(format!("architect model: {model}"));
        }
        if let Some(effort) = self.reasoning_effort {
            parts.push(format!("reasoning effort: {effort}"));
        }
        if let Some(tokens) = self.thinking_tokens {
            parts.push(format!("thinking tokens: {tokens}"));
        }
        parts
    }
}
