//! Cooperative per-session cancellation.
//!
//! A flag is only observed by the producer at chunk boundaries. A turn that
//! is blocked inside the agent call keeps running until its next chunk.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Cancellation token shared by the register and one running turn.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Return whether cancellation was requested, clearing the request.
    pub fn poll_and_clear(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Process-wide table of cancellation flags keyed by session id.
#[derive(Debug, Default)]
pub struct CancelRegister {
    flags: Mutex<HashMap<String, CancelFlag>>,
}

impl CancelRegister {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a turn with a fresh token. Earlier requests stay on the previous one.
    pub fn begin_turn(&self, session_id: &str) -> CancelFlag {
        let flag = CancelFlag::default();
        self.flags
            .lock()
            .insert(session_id.to_string(), flag.clone());
        flag
    }

    /// Ask the current turn to stop. Idempotent.
    pub fn request_cancel(&self, session_id: &str) {
        tracing::debug!(session_id = %session_id, "cancellation requested");
        self.flags
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .set();
    }

    /// Return whether cancellation was requested, clearing the request.
    pub fn poll_and_clear(&self, session_id: &str) -> bool {
        self.flags
            .lock()
            .get(session_id)
            .is_some_and(CancelFlag::poll_and_clear)
    }

    #[must_use]
    pub fn is_requested(&self, session_id: &str) -> bool {
        self.flags
            .lock()
            .get(session_id)
            .is_some_and(CancelFlag::is_requested)
    }

    /// Forget the flag for an evicted session.
    pub fn remove(&self, session_id: &str) {
        self.flags.lock().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_seen_once() {
        let register = CancelRegister::new();
        let flag = register.begin_turn("s1");

        register.request_cancel("s1");
        register.request_cancel("s1");

        assert!(register.is_requested("s1"));
        assert!(flag.poll_and_clear());
        assert!(!flag.poll_and_clear());
        assert!(!register.is_requested("s1"));
    }

    #[test]
    fn begin_turn_clears_stale_request() {
        let register = CancelRegister::new();
        register.request_cancel("s1");

        let flag = register.begin_turn("s1");
        assert!(!flag.is_requested());
    }

    #[test]
    fn each_turn_gets_its_own_token() {
        let register = CancelRegister::new();
        let outgoing = register.begin_turn("s1");
        register.request_cancel("s1");

        let next = register.begin_turn("s1");

        assert!(outgoing.is_requested());
        assert!(!next.is_requested());
        register.request_cancel("s1");
        assert!(next.poll_and_clear());
        assert!(outgoing.poll_and_clear());
    }

    #[test]
    fn flags_are_per_session() {
        let register = CancelRegister::new();
        let s1 = register.begin_turn("s1");
        let s2 = register.begin_turn("s2");

        register.request_cancel("s2");

        assert!(!s1.is_requested());
        assert!(s2.is_requested());
        assert!(register.poll_and_clear("s2"));
        assert!(!register.poll_and_clear("unknown"));
    }
}
