//! Repository inspection through the `git` command line.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::{AgentError, Result};

/// A git work tree.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    /// Find the repository containing `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NoRepository`] if `path` is not inside a work tree.
    pub async fn discover(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(AgentError::NoRepository(path.display().to_string()));
        }

        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(AgentError::NoRepository(path.display().to_string()));
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!(root = %root, "found git repository");
        Ok(Self {
            root: PathBuf::from(root),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(["-c", "core.quotepath=false"])
            .args(args)
            .current_dir(&self.root)
            .output()
            .await?;

        if !output.status.success() {
            return Err(AgentError::Git {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn succeeds(&self, args: &[&str]) -> Result<bool> {
        let status = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .await?
            .status;
        Ok(status.success())
    }

    /// Tracked files, repository-relative and sorted.
    pub async fn tracked_files(&self) -> Result<Vec<String>> {
        let stdout = self.run(&["ls-files"]).await?;
        let mut files: Vec<String> = stdout
            .lines()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        files.sort();
        Ok(files)
    }

    /// Current HEAD commit, or `None` on an unborn branch.
    pub async fn head(&self) -> Result<Option<String>> {
        if !self.succeeds(&["rev-parse", "--verify", "--quiet", "HEAD"]).await? {
            return Ok(None);
        }
        let hash = self.run(&["rev-parse", "HEAD"]).await?;
        Ok(Some(hash.trim().to_string()))
    }

    /// Full message of a commit.
    pub async fn commit_message(&self, hash: &str) -> Result<String> {
        let message = self.run(&["log", "-1", "--format=%B", hash]).await?;
        Ok(message.trim().to_string())
    }

    /// Unified diff between two revisions.
    pub async fn diff_commits(&self, from: &str, to: &str) -> Result<String> {
        self.run(&["diff", "--no-ext-diff", "--no-color", from, to])
            .await
    }

    /// Files touched between two revisions.
    pub async fn changed_files(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let stdout = self.run(&["diff", "--name-only", from, to]).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect())
    }

    /// Revert `hash`, which must be HEAD.
    ///
    /// Restores every file the commit touched to its parent version and moves
    /// HEAD back one commit, keeping unrelated working-tree changes.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Undo`] if HEAD moved past `hash` or `hash` is a
    /// root commit.
    pub async fn undo(&self, hash: &str) -> Result<Vec<String>> {
        let head = self.head().await?;
        if head.as_deref() != Some(hash) {
            return Err(AgentError::Undo(format!(
                "{hash} is not the current HEAD"
            )));
        }

        let parent = format!("{hash}~1");
        if !self
            .succeeds(&["rev-parse", "--verify", "--quiet", parent.as_str()])
            .await?
        {
            return Err(AgentError::Undo(format!("{hash} has no parent commit")));
        }

        let files = self.changed_files(&parent, hash).await?;
        let mut lines = Vec::with_capacity(files.len() + 2);

        for file in &files {
            let spec = format!("{parent}:{file}");
            if self.succeeds(&["cat-file", "-e", spec.as_str()]).await? {
                self.run(&["checkout", parent.as_str(), "--", file.as_str()]).await?;
                lines.push(format!("Restored {file}"));
            } else {
                self.run(&["rm", "-f", "--quiet", "--", file.as_str()]).await?;
                lines.push(format!("Removed {file}"));
            }
        }

        self.run(&["reset", "--soft", parent.as_str()]).await?;

        let short: String = hash.chars().take(7).collect();
        lines.push(format!("Removed: {short}"));
        if let Some(new_head) = self.head().await? {
            let message = self.commit_message(&new_head).await?;
            let short: String = new_head.chars().take(7).collect();
            lines.push(format!("Now at:  {short} {message}"));
        }

        tracing::info!(hash = %hash, files = files.len(), "undid commit");
        Ok(lines)
    }
}
