//! Capability contract between the session core and a coding agent.
//!
//! The session layer never inspects an agent's internals. Everything it needs
//! (the streamed response, self-directed follow-ups, edited files and the last
//! commit) is read through [`CodingAgent`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::types::{CommitInfo, Message, SwitchOptions};

/// Stream of response chunks borrowed from the agent that produces them.
pub type ChunkStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// A live, process-local coding agent bound to one repository.
#[async_trait]
pub trait CodingAgent: Send + Sync {
    /// Stream the response to `prompt` chunk by chunk.
    ///
    /// The agent may only be inspected again once the stream is dropped.
    fn run_stream(&mut self, prompt: String) -> ChunkStream<'_>;

    /// Follow-up prompt the agent produced for itself during the last round.
    fn reflected_message(&self) -> Option<String>;

    /// Files edited during the last round, repository-relative.
    fn edited_files(&self) -> Vec<String>;

    /// The most recent commit made by the agent.
    fn last_commit(&self) -> Option<CommitInfo>;

    /// Files currently in the agent's editing context.
    fn inchat_files(&self) -> Vec<String>;

    /// Every tracked file in the repository.
    async fn all_files(&self) -> Result<Vec<String>>;

    /// Add a repository-relative file to the editing context.
    fn add_file(&mut self, path: &str) -> Result<()>;

    /// Drop a file from the editing context. Returns whether it was present.
    fn drop_file(&mut self, path: &str) -> bool;

    /// Startup lines describing the agent (model, repository, ...).
    fn announcements(&self) -> Vec<String>;

    /// Forget the model-facing message history.
    fn clear_history(&mut self);

    /// Revert the agent's last commit, returning the captured output lines.
    async fn undo_last_commit(&mut self) -> Result<Vec<String>>;

    /// Diff between two revisions.
    async fn diff_commits(&self, from: &str, to: &str) -> Result<String>;

    /// Model identifier.
    fn model(&self) -> &str;

    /// Edit format in use.
    fn edit_format(&self) -> &str;

    /// Repository root the agent works in.
    fn root(&self) -> &Path;

    /// Model-facing message history, used to seed a replacement agent.
    fn messages(&self) -> Vec<Message>;
}

/// Parameters for building a fresh agent.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    /// Project root; must be inside a git repository.
    pub root: PathBuf,
    pub model: String,
    /// Edit format override. `None` selects the model's native format.
    pub edit_format: Option<String>,
    pub options: SwitchOptions,
}

/// Parameters for deriving an agent from an outgoing one.
#[derive(Debug, Clone)]
pub struct DeriveSpec {
    pub edit_format: String,
    /// Condense the outgoing message history instead of copying it.
    pub summarize_from: bool,
    pub options: SwitchOptions,
}

/// Builds agent handles.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    /// Build a fresh agent rooted at `spec.root`.
    async fn create(&self, spec: AgentSpec) -> Result<Box<dyn CodingAgent>>;

    /// Build an agent seeded from `from`: same model, messages and files.
    async fn derive(&self, from: &dyn CodingAgent, spec: DeriveSpec)
    -> Result<Box<dyn CodingAgent>>;

    /// Edit format the model handles best, used by code mode.
    fn native_edit_format(&self, model: &str) -> String;

    /// Replace provider credentials (provider name to API key).
    fn set_credentials(&self, keys: HashMap<String, String>);

    /// Models this factory can build agents for.
    fn models(&self) -> Vec<String>;
}
