//! Scripted coding agent shared by the integration tests.
//!
//! Every agent built by one [`ScriptedFactory`] shares a [`Repo`], so a mode
//! or model switch sees the same commits and queued rounds.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use agent_core::{
    AgentError, AgentFactory, AgentSpec, ChunkStream, CodingAgent, CommitInfo, DeriveSpec, Message,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use pairline::core::driver::{self, TurnOutcome};
use pairline::core::{CancelRegister, SessionStore, StreamEvent, StreamHub};
use pairline::core::storage::Storage;

/// One scripted response round.
#[derive(Debug, Clone, Default)]
pub struct Round {
    pub chunks: Vec<String>,
    /// Pause before each chunk.
    pub delay: Duration,
    pub reflection: Option<String>,
    pub edited: Vec<String>,
    pub commit: Option<CommitInfo>,
    /// Yield this error after the chunks.
    pub error: Option<String>,
}

impl Round {
    pub fn text(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn slow(chunks: &[&str], delay: Duration) -> Self {
        Self {
            delay,
            ..Self::text(chunks)
        }
    }

    pub fn reflecting(mut self, message: &str) -> Self {
        self.reflection = Some(message.to_string());
        self
    }

    pub fn editing(mut self, files: &[&str]) -> Self {
        self.edited = files.iter().map(ToString::to_string).collect();
        self
    }

    pub fn committing(mut self, hash: &str, message: &str) -> Self {
        self.commit = Some(CommitInfo {
            hash: hash.to_string(),
            message: message.to_string(),
        });
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }
}

/// Repository state shared by every agent of a factory.
#[derive(Debug, Default)]
pub struct Repo {
    pub rounds: VecDeque<Round>,
    pub tracked: Vec<String>,
    pub head: Option<CommitInfo>,
    pub fail_diff: bool,
    pub undone: Vec<String>,
    pub prompts: Vec<String>,
    pub credentials: HashMap<String, String>,
    pub created: usize,
    pub derived: Vec<DeriveSpec>,
}

pub struct ScriptedAgent {
    repo: Arc<Mutex<Repo>>,
    root: PathBuf,
    model: String,
    edit_format: String,
    files: Vec<String>,
    messages: Vec<Message>,
    reflection: Option<String>,
    edited: Vec<String>,
}

#[async_trait]
impl CodingAgent for ScriptedAgent {
    fn run_stream(&mut self, prompt: String) -> ChunkStream<'_> {
        let round = {
            let mut repo = self.repo.lock();
            repo.prompts.push(prompt.clone());
            repo.rounds
                .pop_front()
                .unwrap_or_else(|| Round::text(&["ok"]))
        };
        self.reflection = None;
        self.edited.clear();
        self.messages.push(Message::user(prompt));

        Box::pin(async_stream::stream! {
            let mut text = String::new();
            for chunk in round.chunks {
                if !round.delay.is_zero() {
                    tokio::time::sleep(round.delay).await;
                }
                text.push_str(&chunk);
                yield Ok(chunk);
            }
            if let Some(message) = round.error {
                yield Err(AgentError::Provider(message));
                return;
            }
            self.messages.push(Message::assistant(text));
            self.reflection = round.reflection;
            self.edited = round.edited;
            if let Some(commit) = round.commit {
                self.repo.lock().head = Some(commit);
            }
        })
    }

    fn reflected_message(&self) -> Option<String> {
        self.reflection.clone()
    }

    fn edited_files(&self) -> Vec<String> {
        self.edited.clone()
    }

    fn last_commit(&self) -> Option<CommitInfo> {
        self.repo.lock().head.clone()
    }

    fn inchat_files(&self) -> Vec<String> {
        self.files.clone()
    }

    async fn all_files(&self) -> agent_core::Result<Vec<String>> {
        Ok(self.repo.lock().tracked.clone())
    }

    fn add_file(&mut self, path: &str) -> agent_core::Result<()> {
        if !self.repo.lock().tracked.iter().any(|f| f == path) {
            return Err(AgentError::FileNotFound(path.to_string()));
        }
        if !self.files.iter().any(|f| f == path) {
            self.files.push(path.to_string());
        }
        Ok(())
    }

    fn drop_file(&mut self, path: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f != path);
        self.files.len() != before
    }

    fn announcements(&self) -> Vec<String> {
        vec![
            format!("Model: {} with {} edit format", self.model, self.edit_format),
            format!("Repo: {}", self.root.display()),
        ]
    }

    fn clear_history(&mut self) {
        self.messages.clear();
    }

    async fn undo_last_commit(&mut self) -> agent_core::Result<Vec<String>> {
        let mut repo = self.repo.lock();
        let commit = repo
            .head
            .take()
            .ok_or_else(|| AgentError::Undo("nothing to undo".to_string()))?;
        repo.undone.push(commit.hash.clone());
        Ok(vec![
            format!("Removed: {} {}", commit.hash, commit.message),
            "Now at: previous commit".to_string(),
        ])
    }

    async fn diff_commits(&self, from: &str, to: &str) -> agent_core::Result<String> {
        if self.repo.lock().fail_diff {
            return Err(AgentError::Provider("diff failed".to_string()));
        }
        Ok(format!("diff {from}..{to}"))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn edit_format(&self) -> &str {
        &self.edit_format
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn messages(&self) -> Vec<Message> {
        self.messages.clone()
    }
}

/// Factory handing out [`ScriptedAgent`]s over one shared [`Repo`].
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    pub repo: Arc<Mutex<Repo>>,
}

impl ScriptedFactory {
    pub fn new(tracked: &[&str]) -> Self {
        let factory = Self::default();
        factory.repo.lock().tracked = tracked.iter().map(ToString::to_string).collect();
        factory
    }

    /// Queue rounds for the next `run_stream` calls.
    pub fn script(&self, rounds: impl IntoIterator<Item = Round>) {
        self.repo.lock().rounds.extend(rounds);
    }

    pub fn set_head(&self, hash: &str, message: &str) {
        self.repo.lock().head = Some(CommitInfo {
            hash: hash.to_string(),
            message: message.to_string(),
        });
    }
}

#[async_trait]
impl AgentFactory for ScriptedFactory {
    async fn create(&self, spec: AgentSpec) -> agent_core::Result<Box<dyn CodingAgent>> {
        if !spec.root.is_dir() {
            return Err(AgentError::NoRepository(spec.root.display().to_string()));
        }
        self.repo.lock().created += 1;
        Ok(Box::new(ScriptedAgent {
            repo: Arc::clone(&self.repo),
            root: spec.root,
            edit_format: spec
                .edit_format
                .unwrap_or_else(|| self.native_edit_format(&spec.model)),
            model: spec.model,
            files: Vec::new(),
            messages: Vec::new(),
            reflection: None,
            edited: Vec::new(),
        }))
    }

    async fn derive(
        &self,
        from: &dyn CodingAgent,
        spec: DeriveSpec,
    ) -> agent_core::Result<Box<dyn CodingAgent>> {
        self.repo.lock().derived.push(spec.clone());
        Ok(Box::new(ScriptedAgent {
            repo: Arc::clone(&self.repo),
            root: from.root().to_path_buf(),
            model: from.model().to_string(),
            edit_format: spec.edit_format,
            files: from.inchat_files(),
            messages: from.messages(),
            reflection: None,
            edited: Vec::new(),
        }))
    }

    fn native_edit_format(&self, _model: &str) -> String {
        "diff".to_string()
    }

    fn set_credentials(&self, keys: HashMap<String, String>) {
        self.repo.lock().credentials = keys;
    }

    fn models(&self) -> Vec<String> {
        vec!["test/alpha".to_string(), "test/beta".to_string()]
    }
}

/// A store bound to a temporary project, with snapshots in a second tempdir.
pub struct Fixture {
    pub store: Arc<SessionStore>,
    pub factory: ScriptedFactory,
    pub project: tempfile::TempDir,
    pub data: tempfile::TempDir,
}

impl Fixture {
    pub fn new(tracked: &[&str]) -> Self {
        let project = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(tracked);
        let store = Self::store_for(&factory, data.path(), Some(project.path().to_path_buf()));
        Self {
            store: Arc::new(store),
            factory,
            project,
            data,
        }
    }

    /// A store with no bound project.
    pub fn deferred(tracked: &[&str]) -> Self {
        let fixture = Self::new(tracked);
        let store = Self::store_for(&fixture.factory, fixture.data.path(), None);
        Self {
            store: Arc::new(store),
            ..fixture
        }
    }

    /// A second store over the same snapshots, as after a restart.
    pub fn restarted(&self) -> SessionStore {
        Self::store_for(
            &self.factory,
            self.data.path(),
            Some(self.project.path().to_path_buf()),
        )
    }

    fn store_for(factory: &ScriptedFactory, data: &Path, project: Option<PathBuf>) -> SessionStore {
        SessionStore::new(
            Storage::with_root(data.join("sessions")),
            Arc::new(factory.clone()),
            project,
            "test/alpha",
        )
    }
}

/// Start a turn the way `send_message` does.
pub async fn start_turn(
    store: &Arc<SessionStore>,
    hub: &Arc<StreamHub>,
    cancel: &CancelRegister,
    session_id: &str,
    prompt: &str,
) -> tokio::task::JoinHandle<TurnOutcome> {
    let handle = store.get_or_create(session_id).await.unwrap();
    let mut session = handle.try_lock_owned().unwrap();
    session.record_input(prompt);
    let flag = cancel.begin_turn(session_id);
    hub.create(session_id);
    driver::spawn_turn(
        Arc::clone(store),
        Arc::clone(hub),
        session,
        flag,
        prompt.to_string(),
    )
}

/// Every event queued for `session_id`, stopping once the queue stays empty.
pub async fn drain(hub: &StreamHub, session_id: &str) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = hub.consume(session_id, Duration::from_millis(50)).await {
        events.push(event);
    }
    events
}

pub fn names(events: &[StreamEvent]) -> Vec<&'static str> {
    events.iter().map(StreamEvent::name).collect()
}
