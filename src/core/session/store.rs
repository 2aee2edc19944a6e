//! In-memory session table with a disk mirror.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use agent_core::{AgentFactory, AgentSpec, ChatMode, CodingAgent, SwitchOptions};
use parking_lot::{Mutex, RwLock};

use super::{Session, SessionSnapshot};
use crate::core::cancel::CancelRegister;
use crate::core::error::{Error, Result};
use crate::core::storage::{Storage, StorageError};

/// Shared, lockable session. The lock serializes turns and mutations.
pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

struct Entry {
    session: SessionHandle,
    last_active: Mutex<Instant>,
}

impl Entry {
    fn new(session: Session) -> Self {
        Self {
            session: Arc::new(tokio::sync::Mutex::new(session)),
            last_active: Mutex::new(Instant::now()),
        }
    }
}

/// Owns every live session and the project binding new sessions use.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Entry>>>,
    storage: Storage,
    factory: Arc<dyn AgentFactory>,
    project: RwLock<Option<PathBuf>>,
    model: RwLock<String>,
    /// Serializes session construction so one id is never built twice.
    creating: tokio::sync::Mutex<()>,
}

impl SessionStore {
    /// Create a store. `project` is `None` while project binding is deferred.
    #[must_use]
    pub fn new(
        storage: Storage,
        factory: Arc<dyn AgentFactory>,
        project: Option<PathBuf>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            storage,
            factory,
            project: RwLock::new(project),
            model: RwLock::new(model.into()),
            creating: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn factory(&self) -> &Arc<dyn AgentFactory> {
        &self.factory
    }

    /// Project root used for new sessions.
    #[must_use]
    pub fn project(&self) -> Option<PathBuf> {
        self.project.read().clone()
    }

    pub fn bind_project(&self, path: PathBuf) {
        tracing::info!(project = %path.display(), "bound project");
        *self.project.write() = Some(path);
    }

    /// Model used for new sessions.
    #[must_use]
    pub fn default_model(&self) -> String {
        self.model.read().clone()
    }

    pub fn set_default_model(&self, model: impl Into<String>) {
        *self.model.write() = model.into();
    }

    /// Live session, without touching disk.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        let sessions = self.sessions.read();
        let entry = sessions.get(session_id)?;
        *entry.last_active.lock() = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    /// Whether `handle` is still the live session for its id.
    #[must_use]
    pub fn is_current(&self, session_id: &str, handle: &SessionHandle) -> bool {
        self.sessions
            .read()
            .get(session_id)
            .is_some_and(|e| Arc::ptr_eq(&e.session, handle))
    }

    /// Return the live session, rehydrate it from disk, or build a fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] if no project is bound or the agent cannot be
    /// built. The table is left unchanged on failure.
    pub async fn get_or_create(&self, session_id: &str) -> Result<SessionHandle> {
        if let Some(handle) = self.get(session_id) {
            return Ok(handle);
        }

        let _creating = self.creating.lock().await;
        if let Some(handle) = self.get(session_id) {
            return Ok(handle);
        }

        let session = match self.load_snapshot(session_id)? {
            Some(snapshot) => self.rehydrate(snapshot).await?,
            None => {
                let root = self.project().ok_or_else(|| {
                    Error::Init(
                        "no project initialized; call initialize_project first".to_string(),
                    )
                })?;
                let session = self.build(session_id, &root, &self.default_model()).await?;
                self.save(&session)?;
                session
            }
        };

        Ok(self.insert(session))
    }

    /// Discard any existing entry for `session_id` and rebuild it rooted at `path`.
    ///
    /// A turn running on the outgoing session is cancelled and awaited before
    /// the new session is inserted. On success `path` becomes the bound
    /// project for later sessions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] for an invalid path or a failed agent build; the
    /// existing entry and binding are kept in that case.
    pub async fn initialize_project(
        &self,
        session_id: &str,
        path: &Path,
        model: Option<String>,
        credentials: HashMap<String, String>,
        cancel: &CancelRegister,
    ) -> Result<SessionHandle> {
        if !path.is_dir() {
            return Err(Error::Init(format!(
                "invalid project path: {}",
                path.display()
            )));
        }
        if !credentials.is_empty() {
            self.factory.set_credentials(credentials);
        }

        // Held until the replacement is in the table.
        let outgoing = match self.get(session_id) {
            Some(handle) => {
                cancel.request_cancel(session_id);
                let guard = handle.lock_owned().await;
                tracing::debug!(session_id = %session_id, "outgoing session released");
                Some(guard)
            }
            None => None,
        };

        let model = model.unwrap_or_else(|| self.default_model());
        let _creating = self.creating.lock().await;
        let session = self.build(session_id, path, &model).await?;

        self.bind_project(session.project_root().to_path_buf());
        self.set_default_model(model);
        self.save(&session)?;

        let handle = self.insert(session);
        if outgoing.is_some() {
            tracing::info!(session_id = %session_id, "discarded previous session");
        }
        Ok(handle)
    }

    async fn build(&self, session_id: &str, root: &Path, model: &str) -> Result<Session> {
        let agent = self
            .create_agent(root, model, ChatMode::default(), SwitchOptions::default())
            .await?;
        tracing::info!(session_id = %session_id, root = %root.display(), model = %model, "created session");
        Ok(Session::fresh(session_id, agent))
    }

    async fn rehydrate(&self, snapshot: SessionSnapshot) -> Result<Session> {
        let agent = self
            .create_agent(
                &snapshot.project_root,
                &snapshot.model,
                snapshot.mode,
                snapshot.options.clone(),
            )
            .await?;
        tracing::info!(session_id = %snapshot.id, "rehydrated session from disk");
        Ok(Session::restore(snapshot, agent))
    }

    /// Build an agent for `mode` rooted at `root`.
    pub(crate) async fn create_agent(
        &self,
        root: &Path,
        model: &str,
        mode: ChatMode,
        options: SwitchOptions,
    ) -> Result<Box<dyn CodingAgent>> {
        let edit_format = (mode != ChatMode::Code)
            .then(|| mode.edit_format(&self.factory.native_edit_format(model)));
        self.factory
            .create(AgentSpec {
                root: root.to_path_buf(),
                model: model.to_string(),
                edit_format,
                options,
            })
            .await
            .map_err(|e| Error::Init(e.to_string()))
    }

    fn insert(&self, session: Session) -> SessionHandle {
        let id = session.id().to_string();
        let entry = Arc::new(Entry::new(session));
        let handle = Arc::clone(&entry.session);
        self.sessions.write().insert(id, entry);
        handle
    }

    /// Mirror a session to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn save(&self, session: &Session) -> Result<()> {
        self.storage.write(session.id(), &session.snapshot())?;
        tracing::trace!(session_id = %session.id(), "saved session");
        Ok(())
    }

    /// Read a session's snapshot from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read.
    pub fn load_snapshot(&self, session_id: &str) -> Result<Option<SessionSnapshot>> {
        match self.storage.read(session_id) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop sessions idle longer than `ttl` from memory. Snapshots stay on disk.
    ///
    /// Sessions whose lock is held (a running turn) are kept. Snapshots are
    /// written after the table lock is released.
    pub fn evict_idle(&self, ttl: Duration) -> Vec<String> {
        let mut evicted = Vec::new();
        {
            let mut sessions = self.sessions.write();
            sessions.retain(|id, entry| {
                if entry.last_active.lock().elapsed() <= ttl {
                    return true;
                }
                match Arc::clone(&entry.session).try_lock_owned() {
                    Ok(session) => {
                        evicted.push((id.clone(), session));
                        false
                    }
                    Err(_) => true,
                }
            });
        }

        for (id, session) in &evicted {
            if let Err(e) = self.save(session) {
                tracing::warn!(session_id = %id, error = %e, "failed to save evicted session");
            }
        }
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "evicted idle sessions");
        }
        evicted.into_iter().map(|(id, _)| id).collect()
    }
}
