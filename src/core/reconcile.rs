//! Post-turn commit detection.

use agent_core::CommitInfo;

use super::session::Session;
use super::stream::{StreamEvent, StreamHub};

/// Publish the agent's new commit, if any, and advance the cached hash.
///
/// A failed diff is logged and skipped; the cached hash is left alone so the
/// commit is retried after the next turn.
pub async fn reconcile(session: &mut Session, hub: &StreamHub) -> Option<CommitInfo> {
    let live = session.agent().last_commit()?;
    if session.last_commit() == Some(live.hash.as_str()) {
        return None;
    }

    let parent = format!("{}~1", live.hash);
    let diff = match session.agent().diff_commits(&parent, &live.hash).await {
        Ok(diff) => diff,
        Err(e) => {
            tracing::warn!(session_id = %session.id(), hash = %live.hash, error = %e, "failed to diff new commit");
            return None;
        }
    };

    tracing::info!(session_id = %session.id(), hash = %live.hash, "reconciled new commit");
    hub.publish(
        session.id(),
        StreamEvent::Commit {
            hash: live.hash.clone(),
            message: live.message.clone(),
            diff,
        },
    );
    session.set_last_commit(Some(live.hash.clone()));
    Some(live)
}
