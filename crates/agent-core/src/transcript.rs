//! Client-visible transcript of a session.

use serde::{Deserialize, Serialize};

use crate::types::{Role, TranscriptEntry};

/// Number of leading entries (announcement and greeting) that survive a clear.
pub const PRESERVED_ENTRIES: usize = 2;

/// Info line appended after the history has been cleared.
pub const CLEARED_NOTICE: &str = "Cleared chat history. Now the LLM can't see anything before this line.";

/// Ordered, append-only transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a fresh transcript with the agent announcement and a greeting.
    #[must_use]
    pub fn seeded(announcements: &[String], greeting: &str) -> Self {
        let mut transcript = Self::new();
        transcript.push(Role::Info, announcements.join("\n"));
        transcript.push(Role::Assistant, greeting);
        transcript
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.entries.push(TranscriptEntry::new(role, content));
    }

    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// Drop everything after the announcement and greeting, then note the clear.
    pub fn clear_history(&mut self) {
        self.entries.truncate(PRESERVED_ENTRIES);
        self.push(Role::Info, CLEARED_NOTICE);
    }
}
