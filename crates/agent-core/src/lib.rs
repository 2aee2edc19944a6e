//! Agent capability contract and the default LLM-backed coding agent.
//!
//! The session core talks to agents only through [`CodingAgent`] and builds
//! them through [`AgentFactory`].

pub mod agent;
pub mod error;
pub mod git;
pub mod llm_agent;
pub mod provider;
pub mod providers;
pub mod transcript;
pub mod types;

pub use agent::{AgentFactory, AgentSpec, ChunkStream, CodingAgent, DeriveSpec};
pub use error::{AgentError, Result};
pub use llm_agent::{LlmAgent, LlmAgentFactory};
pub use transcript::Transcript;
pub use types::{
    ChatMode, CommitInfo, Message, MessageRole, ReasoningEffort, Role, SwitchOptions,
    TranscriptEntry,
};
