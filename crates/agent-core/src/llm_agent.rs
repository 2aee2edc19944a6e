//! Default [`CodingAgent`] backed by an LLM provider.
//!
//! This agent converses about the files in chat and answers repository
//! questions through git. It applies no edits of its own, so it never reports
//! edited files or reflections. A commit that lands in the repository while a
//! turn runs becomes its last commit and can be undone.

use std::collections::HashMap;
use std::path::{Component, Path};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;

use crate::agent::{AgentFactory, AgentSpec, ChunkStream, CodingAgent, DeriveSpec};
use crate::error::{AgentError, Result};
use crate::git::GitRepo;
use crate::provider::{CompletionRequest, LlmProvider};
use crate::providers::{ProviderKind, UnifiedProvider};
use crate::types::{CommitInfo, Message, MessageRole, SwitchOptions};

/// Upper bound on the condensed history carried into a summarizing switch.
const SUMMARY_MAX_CHARS: usize = 8_000;

/// Coding agent that streams responses from an [`LlmProvider`].
pub struct LlmAgent {
    provider: Arc<dyn LlmProvider>,
    repo: GitRepo,
    model: String,
    edit_format: String,
    max_tokens: u32,
    options: SwitchOptions,
    messages: Vec<Message>,
    inchat: Vec<String>,
    head: Option<CommitInfo>,
}

impl LlmAgent {
    /// Create an agent over an existing repository handle.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        repo: GitRepo,
        model: impl Into<String>,
        edit_format: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            repo,
            model: model.into(),
            edit_format: edit_format.into(),
            max_tokens,
            options: SwitchOptions::default(),
            messages: Vec::new(),
            inchat: Vec::new(),
            head: None,
        }
    }

    /// The HEAD commit if it differs from `before`.
    async fn new_commit(&self, before: Option<&str>) -> Result<Option<CommitInfo>> {
        let Some(hash) = self.repo.head().await? else {
            return Ok(None);
        };
        if before == Some(hash.as_str()) {
            return Ok(None);
        }
        let message = self.repo.commit_message(&hash).await?;
        Ok(Some(CommitInfo { hash, message }))
    }

    fn system_prompt(&self) -> String {
        let role = match self.edit_format.as_str() {
            "ask" => "Answer questions about the code. Do not propose edits.",
            "context" => {
                "Identify which files in the repository need to change for the request. \
                 List them with a one-line reason each."
            }
            "architect" => {
                "Act as a software architect. Describe the changes an editor engineer \
                 should make, file by file, without writing the full code."
            }
            _ => {
                "Act as an expert software developer. Propose precise changes to the \
                 files in chat."
            }
        };

        let mut prompt = format!(
            "You are {}, pair programming inside the git repository at {}.\n{role}",
            self.model,
            self.repo.root().display()
        );
        if let Some(effort) = self.options.reasoning_effort {
            prompt.push_str(&format!("\nReasoning effort: {effort}."));
        }
        prompt
    }

    async fn file_context(repo: &GitRepo, files: &[String]) -> String {
        let mut context = String::new();
        for file in files {
            match tokio::fs::read_to_string(repo.root().join(file)).await {
                Ok(contents) => {
                    context.push_str(&format!("{file}\n```\n{contents}\n```\n\n"));
                }
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "failed to read file in chat");
                }
            }
        }
        context
    }

    /// Condense a message history into a single synthetic exchange.
    fn summarize(messages: &[Message]) -> Vec<Message> {
        if messages.is_empty() {
            return Vec::new();
        }

        let mut summary = String::new();
        for msg in messages {
            let speaker = match msg.role {
                MessageRole::User => "USER",
                MessageRole::Assistant => "ASSISTANT",
            };
            summary.push_str(&format!("{speaker}: {}\n", msg.content.trim()));
        }

        if summary.len() > SUMMARY_MAX_CHARS {
            let mut start = summary.len() - SUMMARY_MAX_CHARS;
            while !summary.is_char_boundary(start) {
                start += 1;
            }
            summary = format!("...{}", &summary[start..]);
        }

        vec![
            Message::user(format!(
                "Summary of the previous conversation:\n{summary}"
            )),
            Message::assistant("Ok."),
        ]
    }
}

/// Reject absolute paths and parent traversal.
fn is_repo_relative(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[async_trait]
impl CodingAgent for LlmAgent {
    fn run_stream(&mut self, prompt: String) -> ChunkStream<'_> {
        let this = self;
        Box::pin(async_stream::try_stream! {
            let before = this.repo.head().await?;
            let files = LlmAgent::file_context(&this.repo, &this.inchat).await;
            let user_content = if files.is_empty() {
                prompt.clone()
            } else {
                format!("Files in chat:\n\n{files}{prompt}")
            };

            let mut messages = this.messages.clone();
            messages.push(Message::user(user_content));

            let request = CompletionRequest {
                max_tokens: this.max_tokens,
                messages,
                system: Some(this.system_prompt()),
            };

            let mut stream = this.provider.stream(request).await?;
            let mut reply = String::new();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                reply.push_str(&chunk);
                yield chunk;
            }

            this.messages.push(Message::user(prompt));
            this.messages.push(Message::assistant(reply));

            match this.new_commit(before.as_deref()).await {
                Ok(Some(commit)) => {
                    tracing::debug!(hash = %commit.hash, "commit landed during turn");
                    this.head = Some(commit);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "failed to read HEAD after turn"),
            }
        })
    }

    fn reflected_message(&self) -> Option<String> {
        None
    }

    fn edited_files(&self) -> Vec<String> {
        Vec::new()
    }

    fn last_commit(&self) -> Option<CommitInfo> {
        self.head.clone()
    }

    fn inchat_files(&self) -> Vec<String> {
        self.inchat.clone()
    }

    async fn all_files(&self) -> Result<Vec<String>> {
        self.repo.tracked_files().await
    }

    fn add_file(&mut self, path: &str) -> Result<()> {
        if !is_repo_relative(path) || !self.repo.root().join(path).is_file() {
            return Err(AgentError::FileNotFound(path.to_string()));
        }
        if !self.inchat.iter().any(|f| f == path) {
            self.inchat.push(path.to_string());
        }
        Ok(())
    }

    fn drop_file(&mut self, path: &str) -> bool {
        let before = self.inchat.len();
        self.inchat.retain(|f| f != path);
        self.inchat.len() != before
    }

    fn announcements(&self) -> Vec<String> {
        let mut lines = vec![
            format!("pairline agent v{}", env!("CARGO_PKG_VERSION")),
            format!(
                "Model: {} with {} edit format (via {})",
                self.model,
                self.edit_format,
                self.provider.name()
            ),
            format!("Git repo: {}", self.repo.root().display()),
        ];
        if let Some(model) = &self.options.architect_model {
            lines.push(format!("Editor model: {model}"));
        }
        lines
    }

    fn clear_history(&mut self) {
        self.messages.clear();
    }

    async fn undo_last_commit(&mut self) -> Result<Vec<String>> {
        let Some(head) = &self.head else {
            return Err(AgentError::Undo("no commit to undo".to_string()));
        };
        let lines = self.repo.undo(&head.hash).await?;
        self.head = None;
        Ok(lines)
    }

    async fn diff_commits(&self, from: &str, to: &str) -> Result<String> {
        self.repo.diff_commits(from, to).await
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn edit_format(&self) -> &str {
        &self.edit_format
    }

    fn root(&self) -> &Path {
        self.repo.root()
    }

    fn messages(&self) -> Vec<Message> {
        self.messages.clone()
    }
}

/// Builds [`LlmAgent`]s, resolving providers from model ids.
pub struct LlmAgentFactory {
    credentials: RwLock<HashMap<String, String>>,
    models: Vec<String>,
    max_tokens: u32,
}

impl LlmAgentFactory {
    #[must_use]
    pub fn new(models: Vec<String>, max_tokens: u32) -> Self {
        Self {
            credentials: RwLock::new(HashMap::new()),
            models,
            max_tokens,
        }
    }

    fn api_key(&self, kind: ProviderKind) -> Option<String> {
        self.credentials
            .read()
            .get(kind.name())
            .cloned()
            .or_else(|| std::env::var(kind.env_var()).ok())
    }

    fn provider(&self, model: &str) -> Result<(ProviderKind, Arc<dyn LlmProvider>)> {
        let (kind, name) =
            ProviderKind::resolve(model).ok_or_else(|| AgentError::UnknownModel(model.to_string()))?;
        let key = self
            .api_key(kind)
            .ok_or_else(|| AgentError::ApiKeyMissing(kind.name().to_string()))?;
        let provider = UnifiedProvider::new(kind, &key, name, self.max_tokens)?;
        Ok((kind, Arc::new(provider)))
    }
}

#[async_trait]
impl AgentFactory for LlmAgentFactory {
    async fn create(&self, spec: AgentSpec) -> Result<Box<dyn CodingAgent>> {
        let repo = GitRepo::discover(&spec.root).await?;
        let (kind, provider) = self.provider(&spec.model)?;
        let edit_format = spec
            .edit_format
            .unwrap_or_else(|| kind.native_edit_format().to_string());

        let mut agent = LlmAgent::new(provider, repo, spec.model, edit_format, self.max_tokens);
        agent.options = spec.options;

        tracing::info!(model = %agent.model, root = %agent.repo.root().display(), "created agent");
        Ok(Box::new(agent))
    }

    async fn derive(
        &self,
        from: &dyn CodingAgent,
        spec: DeriveSpec,
    ) -> Result<Box<dyn CodingAgent>> {
        let repo = GitRepo::discover(from.root()).await?;
        let (_, provider) = self.provider(from.model())?;

        let mut agent = LlmAgent::new(
            provider,
            repo,
            from.model(),
            spec.edit_format,
            self.max_tokens,
        );
        agent.options = spec.options;
        agent.messages = if spec.summarize_from {
            LlmAgent::summarize(&from.messages())
        } else {
            from.messages()
        };
        agent.inchat = from.inchat_files();
        agent.head = from.last_commit();

        tracing::info!(
            model = %agent.model,
            edit_format = %agent.edit_format,
            summarized = spec.summarize_from,
            "derived agent"
        );
        Ok(Box::new(agent))
    }

    fn native_edit_format(&self, model: &str) -> String {
        ProviderKind::resolve(model)
            .map_or("whole", |(kind, _)| kind.native_edit_format())
            .to_string()
    }

    fn set_credentials(&self, keys: HashMap<String, String>) {
        let mut credentials = self.credentials.write();
        for (provider, key) in keys {
            if key.is_empty() {
                credentials.remove(&provider);
            } else {
                credentials.insert(provider, key);
            }
        }
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }
}
