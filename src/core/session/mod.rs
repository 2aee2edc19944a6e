//! Session state and its persisted snapshot.
//!
//! A [`Session`] owns the live agent handle. Everything except the handle is
//! mirrored to disk as a [`SessionSnapshot`] so a session can be rebuilt after
//! a restart or an idle eviction.

mod store;

use std::path::{Path, PathBuf};

use agent_core::{ChatMode, CodingAgent, Role, SwitchOptions, Transcript};
use serde::{Deserialize, Serialize};

pub use store::{SessionHandle, SessionStore};

/// Greeting shown after the agent announcement in a fresh transcript.
pub const GREETING: &str = "How can I help you?";

/// Persisted form of a session. Never contains the agent handle or credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub transcript: Transcript,
    /// In-chat files, repository-relative.
    pub files: Vec<String>,
    pub last_commit: Option<String>,
    pub input_history: Vec<String>,
    /// Creation time, Unix milliseconds.
    pub created_at: i64,
    #[serde(default)]
    pub mode: ChatMode,
    #[serde(default)]
    pub options: SwitchOptions,
    pub project_root: PathBuf,
    pub model: String,
}

/// Live session: transcript, bookkeeping and the active agent handle.
pub struct Session {
    id: String,
    pub(crate) transcript: Transcript,
    last_commit: Option<String>,
    input_history: Vec<String>,
    created_at: i64,
    mode: ChatMode,
    options: SwitchOptions,
    project_root: PathBuf,
    model: String,
    agent: Box<dyn CodingAgent>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("model", &self.model)
            .field("transcript_len", &self.transcript.len())
            .field("last_commit", &self.last_commit)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a session around a freshly created agent.
    ///
    /// The transcript is seeded with the agent announcement and the greeting.
    #[must_use]
    pub fn fresh(id: impl Into<String>, agent: Box<dyn CodingAgent>) -> Self {
        let transcript = Transcript::seeded(&agent.announcements(), GREETING);
        Self {
            id: id.into(),
            transcript,
            last_commit: agent.last_commit().map(|c| c.hash),
            input_history: Vec::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
            mode: ChatMode::default(),
            options: SwitchOptions::default(),
            project_root: agent.root().to_path_buf(),
            model: agent.model().to_string(),
            agent,
        }
    }

    /// Rebuild a session from its snapshot around a new agent handle.
    ///
    /// Files the agent refuses (deleted since the snapshot) are dropped.
    #[must_use]
    pub fn restore(snapshot: SessionSnapshot, mut agent: Box<dyn CodingAgent>) -> Self {
        for file in &snapshot.files {
            if let Err(e) = agent.add_file(file) {
                tracing::warn!(session_id = %snapshot.id, file = %file, error = %e, "dropping file from restored session");
            }
        }

        Self {
            id: snapshot.id,
            transcript: snapshot.transcript,
            last_commit: snapshot.last_commit,
            input_history: snapshot.input_history,
            created_at: snapshot.created_at,
            mode: snapshot.mode,
            options: snapshot.options,
            project_root: snapshot.project_root,
            model: snapshot.model,
            agent,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            transcript: self.transcript.clone(),
            files: self.files(),
            last_commit: self.last_commit.clone(),
            input_history: self.input_history.clone(),
            created_at: self.created_at,
            mode: self.mode,
            options: self.options.clone(),
            project_root: self.project_root.clone(),
            model: self.model.clone(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Files currently in chat.
    #[must_use]
    pub fn files(&self) -> Vec<String> {
        self.agent.inchat_files()
    }

    /// Last commit reported to the client.
    #[must_use]
    pub fn last_commit(&self) -> Option<&str> {
        self.last_commit.as_deref()
    }

    /// Only reconciliation advances the cached commit; only undo clears it.
    pub(crate) fn set_last_commit(&mut self, hash: Option<String>) {
        self.last_commit = hash;
    }

    #[must_use]
    pub fn input_history(&self) -> &[String] {
        &self.input_history
    }

    pub fn record_input(&mut self, prompt: impl Into<String>) {
        self.input_history.push(prompt.into());
    }

    #[must_use]
    pub const fn created_at(&self) -> i64 {
        self.created_at
    }

    #[must_use]
    pub const fn mode(&self) -> ChatMode {
        self.mode
    }

    #[must_use]
    pub const fn options(&self) -> &SwitchOptions {
        &self.options
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn agent(&self) -> &dyn CodingAgent {
        self.agent.as_ref()
    }

    pub fn agent_mut(&mut self) -> &mut dyn CodingAgent {
        self.agent.as_mut()
    }

    /// Install a new agent handle for a mode switch.
    pub(crate) fn set_agent_mode(
        &mut self,
        agent: Box<dyn CodingAgent>,
        mode: ChatMode,
        options: SwitchOptions,
    ) {
        self.agent = agent;
        self.mode = mode;
        self.options = options;
    }

    /// Install a new agent handle for a model switch.
    pub(crate) fn set_agent_model(&mut self, agent: Box<dyn CodingAgent>) {
        self.model = agent.model().to_string();
        self.agent = agent;
    }

    pub(crate) fn info(&mut self, content: impl Into<String>) {
        self.transcript.push(Role::Info, content);
    }
}
