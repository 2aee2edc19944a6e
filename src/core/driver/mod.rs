//! Conversation driver: runs one user turn to completion.
//!
//! A turn is a small state machine. Every round streams the agent's response
//! into the session's event queue. In code mode a self-directed follow-up
//! starts another round, up to [`MAX_REFLECTIONS`]; in other modes it is only
//! reported. Cancellation is observed at chunk boundaries.
//!
//! ```text
//! Streaming ──complete──▶ Reflecting ──follow-up──▶ Streaming
//!     │                       │
//!     ├──cancel──▶ Cancelled  └──none / limit──▶ Done
//!     └──error───▶ Failed
//! ```

use std::sync::Arc;

use agent_core::Role;
use futures::StreamExt;
use tokio::sync::OwnedMutexGuard;

use super::cancel::CancelFlag;
use super::reconcile;
use super::session::{Session, SessionStore};
use super::stream::{StreamEvent, StreamHub};

/// Follow-up rounds allowed per turn in code mode.
pub const MAX_REFLECTIONS: u32 = 3;

/// Reason attached to a `message_cancelled` event.
pub const CANCEL_REASON: &str = "Cancelled by user";

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Every round finished; `reflections` follow-ups were run.
    Completed { reflections: u32 },
    Cancelled,
    Failed(String),
}

enum State {
    Streaming(String),
    Reflecting,
    Done,
    Cancelled,
    Failed(String),
}

enum RoundEnd {
    Exhausted(String),
    Cancelled,
}

/// Stream one prompt, checking for cancellation at every chunk boundary.
async fn stream_round(
    session: &mut Session,
    hub: &StreamHub,
    cancel: &CancelFlag,
    prompt: String,
) -> agent_core::Result<RoundEnd> {
    let session_id = session.id().to_string();
    if cancel.poll_and_clear() {
        return Ok(RoundEnd::Cancelled);
    }

    let mut stream = session.agent_mut().run_stream(prompt);
    let mut text = String::new();

    loop {
        let next = stream.next().await;
        if cancel.poll_and_clear() {
            return Ok(RoundEnd::Cancelled);
        }
        match next {
            Some(Ok(chunk)) => {
                text.push_str(&chunk);
                hub.publish(&session_id, StreamEvent::Chunk { chunk });
            }
            Some(Err(e)) => return Err(e),
            None => return Ok(RoundEnd::Exhausted(text)),
        }
    }
}

/// Run one turn for `prompt`, publishing every event to `hub`.
///
/// The caller must hold the session exclusively for the whole turn.
pub async fn run_turn(
    session: &mut Session,
    hub: &StreamHub,
    cancel: &CancelFlag,
    prompt: String,
) -> TurnOutcome {
    let session_id = session.id().to_string();
    let reflective = session.mode().allows_reflections();
    let mut reflections = 0;
    let mut state = State::Streaming(prompt);

    tracing::debug!(session_id = %session_id, mode = %session.mode(), "turn started");

    loop {
        state = match state {
            State::Streaming(prompt) => match stream_round(session, hub, cancel, prompt).await {
                Ok(RoundEnd::Exhausted(text)) => {
                    session.transcript.push(Role::Assistant, text.clone());
                    hub.publish(
                        &session_id,
                        StreamEvent::Complete {
                            content: Some(text),
                        },
                    );
                    State::Reflecting
                }
                Ok(RoundEnd::Cancelled) => State::Cancelled,
                Err(e) => State::Failed(e.to_string()),
            },

            State::Reflecting => match session.agent().reflected_message() {
                None => State::Done,
                Some(message) if !reflective => {
                    session.info(message.clone());
                    hub.publish(
                        &session_id,
                        StreamEvent::ReflectionInfo { message, index: 1 },
                    );
                    hub.publish(
                        &session_id,
                        StreamEvent::RefreshFiles {
                            mode: session.mode().to_string(),
                        },
                    );
                    State::Done
                }
                Some(message) if reflections < MAX_REFLECTIONS => {
                    reflections += 1;
                    session.info(message.clone());
                    hub.publish(
                        &session_id,
                        StreamEvent::ReflectionInfo {
                            message: message.clone(),
                            index: reflections,
                        },
                    );
                    State::Streaming(message)
                }
                Some(_) => {
                    let message = format!("Only {MAX_REFLECTIONS} reflections allowed, stopping.");
                    session.info(message.clone());
                    hub.publish(&session_id, StreamEvent::ReflectionLimit { message });
                    State::Done
                }
            },

            State::Done => {
                let edited = session.agent().edited_files();
                if !edited.is_empty() {
                    hub.publish(&session_id, StreamEvent::FilesEdited { files: edited });
                }
                reconcile::reconcile(session, hub).await;
                tracing::debug!(session_id = %session_id, reflections, "turn completed");
                return TurnOutcome::Completed { reflections };
            }

            State::Cancelled => {
                hub.publish(
                    &session_id,
                    StreamEvent::Cancelled {
                        reason: CANCEL_REASON.to_string(),
                    },
                );
                tracing::info!(session_id = %session_id, "turn cancelled");
                return TurnOutcome::Cancelled;
            }

            State::Failed(message) => {
                tracing::error!(session_id = %session_id, error = %message, "turn failed");
                hub.publish(
                    &session_id,
                    StreamEvent::Error {
                        message: message.clone(),
                    },
                );
                return TurnOutcome::Failed(message);
            }
        };
    }
}

/// Run a turn in the background, holding the session lock until it ends.
///
/// The session is saved afterwards unless it was replaced in the meantime.
pub fn spawn_turn(
    store: Arc<SessionStore>,
    hub: Arc<StreamHub>,
    mut session: OwnedMutexGuard<Session>,
    cancel: CancelFlag,
    prompt: String,
) -> tokio::task::JoinHandle<TurnOutcome> {
    tokio::spawn(async move {
        let session_id = session.id().to_string();
        let outcome = run_turn(&mut session, &hub, &cancel, prompt).await;

        if store.is_current(&session_id, OwnedMutexGuard::mutex(&session)) {
            if let Err(e) = store.save(&session) {
                tracing::warn!(session_id = %session_id, error = %e, "failed to save session after turn");
            }
        }
        outcome
    })
}
