//! Session operations outside of a turn: file selection, context ingestion,
//! undo, history clearing, repository reads and shell commands.
//!
//! Every mutating operation records what it did in the transcript.

use std::path::{Component, Path};
use std::time::Duration;

use agent_core::Role;
use serde::Serialize;
use tokio::process::Command;

use super::error::{Error, Result};
use super::session::Session;
use super::stream::{StreamEvent, StreamHub};

/// Add files to the chat. Files already in chat are skipped.
///
/// Returns the files actually added.
pub fn add_files(session: &mut Session, files: &[String]) -> Vec<String> {
    let mut added = Vec::new();
    for file in files {
        if session.files().contains(file) {
            continue;
        }
        match session.agent_mut().add_file(file) {
            Ok(()) => {
                session.info(format!("Added {file} to the chat"));
                added.push(file.clone());
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id(), file = %file, error = %e, "cannot add file");
            }
        }
    }
    added
}

/// Remove files from the chat. Returns the files that were present.
pub fn remove_files(session: &mut Session, files: &[String]) -> Vec<String> {
    let mut removed = Vec::new();
    for file in files {
        if session.agent_mut().drop_file(file) {
            session.info(format!("Removed {file} from the chat"));
            removed.push(file.clone());
        }
    }
    removed
}

/// Store fetched page text as a `text` transcript entry.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the page has no text.
pub fn add_web_page(session: &mut Session, url: &str, content: &str) -> Result<String> {
    if content.trim().is_empty() {
        return Err(Error::not_found(format!("No web content found for {url}")));
    }
    let entry = format!("{url}\n\n{content}");
    session.transcript.push(Role::Text, entry.clone());
    Ok(entry)
}

/// Revert the agent's last commit.
///
/// `hash` must match both the commit last reported to the client and the
/// agent's own last commit.
///
/// # Errors
///
/// Returns [`Error::Validation`] when `hash` is not the latest commit, or the
/// agent's error if the revert fails.
pub async fn undo_commit(session: &mut Session, hash: &str) -> Result<String> {
    let live = session.agent().last_commit().map(|c| c.hash);
    if session.last_commit() != Some(hash) || live.as_deref() != Some(hash) {
        return Err(Error::validation(format!(
            "Commit {hash} is not the latest commit"
        )));
    }

    let lines = session.agent_mut().undo_last_commit().await?;
    let text = lines.join("\n");
    session.info(text.clone());
    session.set_last_commit(None);

    tracing::info!(session_id = %session.id(), hash = %hash, "undid commit");
    Ok(text)
}

/// Forget the model-facing history and truncate the transcript.
pub fn clear_history(session: &mut Session) {
    session.agent_mut().clear_history();
    session.transcript.clear_history();
}

/// Tracked and in-chat files.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct FileLists {
    pub all_files: Vec<String>,
    pub inchat_files: Vec<String>,
}

/// List files for the client.
///
/// # Errors
///
/// Returns the agent's error if the repository cannot be listed.
pub async fn list_files(session: &Session) -> Result<FileLists> {
    Ok(FileLists {
        all_files: session.agent().all_files().await?,
        inchat_files: session.files(),
    })
}

/// List files and tell the attached client to reload them.
///
/// # Errors
///
/// Returns the agent's error if the repository cannot be listed.
pub async fn refresh_files(session: &Session, hub: &StreamHub) -> Result<FileLists> {
    let files = list_files(session).await?;
    hub.publish(
        session.id(),
        StreamEvent::RefreshFiles {
            mode: session.mode().to_string(),
        },
    );
    Ok(files)
}

/// Read a file relative to the project root.
///
/// # Errors
///
/// Returns [`Error::Validation`] for absolute or escaping paths and
/// [`Error::NotFound`] for missing files.
pub async fn repo_file(root: &Path, file_name: &str) -> Result<String> {
    let relative = Path::new(file_name);
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if file_name.is_empty() || !safe {
        return Err(Error::validation(format!("Invalid file name: {file_name}")));
    }

    let path = root.join(relative);
    if !path.is_file() {
        return Err(Error::not_found(format!(
            "File {file_name} not found in repository"
        )));
    }
    Ok(tokio::fs::read_to_string(&path).await?)
}

/// Output of a shell command.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CommandOutput {
    pub output: String,
    pub exit_code: Option<i32>,
}

/// Longest a `run_command` shell may run before it is killed.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Run `command` through `sh -c` in `root`.
///
/// The shell is killed once `timeout` elapses; the output then reports the
/// timeout and carries no exit code. Nothing is recorded; see
/// [`record_command`].
///
/// # Errors
///
/// Returns [`Error::Validation`] for an empty command and an IO error if the
/// shell cannot be spawned.
pub async fn run_command(root: &Path, command: &str, timeout: Duration) -> Result<CommandOutput> {
    if command.trim().is_empty() {
        return Err(Error::validation("Command is required"));
    }

    tracing::info!(root = %root.display(), command = %command, "running command");
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(root)
        .kill_on_drop(true)
        .output();

    let Ok(output) = tokio::time::timeout(timeout, child).await else {
        tracing::warn!(command = %command, timeout_secs = timeout.as_secs_f64(), "command timed out");
        return Ok(CommandOutput {
            output: format!("Command timed out after {}s", timeout.as_secs_f64()),
            exit_code: None,
        });
    };
    let output = output?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }

    Ok(CommandOutput {
        output: text,
        exit_code: output.status.code(),
    })
}

/// Note a finished command and its output in the transcript.
pub fn record_command(session: &mut Session, command: &str, output: &CommandOutput) {
    session.info(format!("$ {command}\n{}", output.output.trim_end()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn command_output_merges_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_command(dir.path(), "echo out; echo err >&2; exit 3", COMMAND_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(out.output, "out\nerr\n");
        assert_eq!(out.exit_code, Some(3));
    }

    #[tokio::test]
    async fn slow_command_is_killed_at_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let started = std::time::Instant::now();
        let out = run_command(dir.path(), "sleep 5", Duration::from_millis(100))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(out.exit_code, None);
        assert!(out.output.starts_with("Command timed out"));
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_command(dir.path(), "  ", COMMAND_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn repo_file_reads_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn f() {}\n").unwrap();

        let content = repo_file(dir.path(), "src/lib.rs").await.unwrap();
        assert_eq!(content, "pub fn f() {}\n");
    }

    #[tokio::test]
    async fn repo_file_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();

        for name in ["../etc/passwd", "/etc/passwd", ""] {
            let result = repo_file(dir.path(), name).await;
            assert!(matches!(result, Err(Error::Validation(_))), "{name}");
        }
    }

    #[tokio::test]
    async fn repo_file_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = repo_file(dir.path(), "nope.rs").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
