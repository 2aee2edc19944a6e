//! Session lifecycle tests against a scripted agent.

mod common;

use std::sync::Arc;
use std::time::Duration;

use agent_core::{ChatMode, Role, SwitchOptions};
use common::{Fixture, Round, drain, names, start_turn};
use pairline::core::driver::{CANCEL_REASON, MAX_REFLECTIONS, TurnOutcome};
use pairline::core::{CancelRegister, StreamEvent, StreamHub, actions, switch};

struct Harness {
    fx: Fixture,
    hub: Arc<StreamHub>,
    cancel: CancelRegister,
}

impl Harness {
    fn new(tracked: &[&str]) -> Self {
        Self {
            fx: Fixture::new(tracked),
            hub: Arc::new(StreamHub::new()),
            cancel: CancelRegister::new(),
        }
    }

    async fn turn(&self, session_id: &str, prompt: &str) -> TurnOutcome {
        start_turn(&self.fx.store, &self.hub, &self.cancel, session_id, prompt)
            .await
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn fresh_session_completes_cancels_and_switches() {
    let h = Harness::new(&["src/main.rs"]);
    let handle = h.fx.store.get_or_create("S1").await.unwrap();
    {
        let mut session = handle.lock().await;
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.transcript().entries()[0].role, Role::Info);
        assert_eq!(session.transcript().entries()[1].role, Role::Assistant);
        actions::add_files(&mut session, &["src/main.rs".to_string()]);
    }
    let after_add = handle.lock().await.transcript().len();

    h.fx.factory.script([Round::text(&["src/", "main.rs"])]);
    let outcome = h.turn("S1", "list files").await;
    assert_eq!(outcome, TurnOutcome::Completed { reflections: 0 });

    let events = drain(&h.hub, "S1").await;
    assert_eq!(
        names(&events),
        ["message_chunk", "message_chunk", "message_complete"]
    );
    {
        let session = handle.lock().await;
        assert_eq!(session.transcript().len(), after_add + 1);
        let last = session.transcript().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "src/main.rs");
    }

    // Cancel before the first chunk arrives
    h.fx.factory.script([Round::slow(&["a", "b", "c"], Duration::from_millis(200))]);
    let turn = start_turn(&h.fx.store, &h.hub, &h.cancel, "S1", "refactor X").await;
    h.cancel.request_cancel("S1");
    assert_eq!(turn.await.unwrap(), TurnOutcome::Cancelled);

    let events = drain(&h.hub, "S1").await;
    assert_eq!(
        events,
        [StreamEvent::Cancelled {
            reason: CANCEL_REASON.to_string()
        }]
    );
    let before_switch = {
        let session = handle.lock().await;
        assert_eq!(session.transcript().len(), after_add + 1);
        assert_eq!(session.input_history(), ["list files", "refactor X"]);
        session.transcript().len()
    };

    let mut session = handle.lock().await;
    let files = session.files();
    switch::switch_mode(
        &mut session,
        h.fx.store.factory().as_ref(),
        ChatMode::Ask,
        SwitchOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(session.mode(), ChatMode::Ask);
    assert_eq!(session.files(), files);
    assert_eq!(session.transcript().len(), before_switch + 1);
    let last = session.transcript().last().unwrap();
    assert_eq!(last.role, Role::Info);
    assert_eq!(last.content, "Switched to ask mode with ask edit format");
}

#[tokio::test]
async fn code_mode_follows_reflections_up_to_the_limit() {
    let h = Harness::new(&[]);
    h.fx.store.get_or_create("s1").await.unwrap();

    h.fx.factory.script([
        Round::text(&["one"]).reflecting("fix lint 1"),
        Round::text(&["two"]).reflecting("fix lint 2"),
        Round::text(&["three"]).reflecting("fix lint 3"),
        Round::text(&["four"]).reflecting("fix lint 4"),
    ]);
    let outcome = h.turn("s1", "go").await;
    assert_eq!(
        outcome,
        TurnOutcome::Completed {
            reflections: MAX_REFLECTIONS
        }
    );

    let events = drain(&h.hub, "s1").await;
    let indices: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ReflectionInfo { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(indices, [1, 2, 3]);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Complete { .. }))
            .count(),
        4
    );
    assert!(matches!(
        events.last(),
        Some(StreamEvent::ReflectionLimit { message }) if message == "Only 3 reflections allowed, stopping."
    ));

    let prompts = h.fx.factory.repo.lock().prompts.clone();
    assert_eq!(prompts, ["go", "fix lint 1", "fix lint 2", "fix lint 3"]);
}

#[tokio::test]
async fn other_modes_report_reflection_without_rerunning() {
    let h = Harness::new(&[]);
    let handle = h.fx.store.get_or_create("s1").await.unwrap();
    {
        let mut session = handle.lock().await;
        switch::switch_mode(
            &mut session,
            h.fx.store.factory().as_ref(),
            ChatMode::Architect,
            SwitchOptions::default(),
        )
        .await
        .unwrap();
    }

    h.fx.factory.script([Round::text(&["plan"]).reflecting("apply the plan")]);
    assert_eq!(
        h.turn("s1", "design it").await,
        TurnOutcome::Completed { reflections: 0 }
    );

    let events = drain(&h.hub, "s1").await;
    assert_eq!(
        names(&events),
        [
            "message_chunk",
            "message_complete",
            "reflection_info",
            "refresh_files"
        ]
    );
    assert_eq!(
        events[3],
        StreamEvent::RefreshFiles {
            mode: "architect".to_string()
        }
    );
    assert_eq!(h.fx.factory.repo.lock().prompts.len(), 1);
}

#[tokio::test]
async fn edited_files_and_new_commit_are_published_after_completion() {
    let h = Harness::new(&["lib.rs"]);
    let handle = h.fx.store.get_or_create("s1").await.unwrap();

    h.fx.factory.script([Round::text(&["done"])
        .editing(&["lib.rs"])
        .committing("abc1234", "refactor lib")]);
    h.turn("s1", "refactor").await;

    let events = drain(&h.hub, "s1").await;
    assert_eq!(
        names(&events),
        ["message_chunk", "message_complete", "files_edited", "commit"]
    );
    assert_eq!(
        events[3],
        StreamEvent::Commit {
            hash: "abc1234".to_string(),
            message: "refactor lib".to_string(),
            diff: "diff abc1234~1..abc1234".to_string(),
        }
    );
    assert_eq!(handle.lock().await.last_commit(), Some("abc1234"));

    // Nothing new on the next turn
    h.turn("s1", "thanks").await;
    let events = drain(&h.hub, "s1").await;
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Commit { .. })));
}

#[tokio::test]
async fn failed_diff_skips_commit_and_keeps_cached_hash() {
    let h = Harness::new(&[]);
    h.fx.factory.set_head("old0000", "initial");
    let handle = h.fx.store.get_or_create("s1").await.unwrap();
    assert_eq!(handle.lock().await.last_commit(), Some("old0000"));

    h.fx.factory.repo.lock().fail_diff = true;
    h.fx.factory.script([Round::text(&["x"]).committing("new1111", "change")]);
    h.turn("s1", "change it").await;

    let events = drain(&h.hub, "s1").await;
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Commit { .. })));
    assert_eq!(handle.lock().await.last_commit(), Some("old0000"));

    // Retried once diffs work again
    h.fx.factory.repo.lock().fail_diff = false;
    h.turn("s1", "again").await;
    let events = drain(&h.hub, "s1").await;
    assert!(events.iter().any(|e| matches!(e, StreamEvent::Commit { hash, .. } if hash == "new1111")));
}

#[tokio::test]
async fn agent_error_ends_turn_with_error_event() {
    let h = Harness::new(&[]);
    let handle = h.fx.store.get_or_create("s1").await.unwrap();
    let before = handle.lock().await.transcript().len();

    h.fx.factory.script([Round::text(&["par"]).failing("rate limited")]);
    let outcome = h.turn("s1", "go").await;
    assert!(matches!(outcome, TurnOutcome::Failed(ref m) if m.contains("rate limited")));

    let events = drain(&h.hub, "s1").await;
    assert_eq!(names(&events), ["message_chunk", "error"]);
    assert_eq!(handle.lock().await.transcript().len(), before);
}

#[tokio::test]
async fn cancel_mid_stream_stops_at_next_chunk() {
    let h = Harness::new(&[]);
    h.fx.store.get_or_create("s1").await.unwrap();

    h.fx.factory.script([Round::slow(&["a", "b", "c", "d"], Duration::from_millis(100))]);
    let turn = start_turn(&h.fx.store, &h.hub, &h.cancel, "s1", "long").await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    h.cancel.request_cancel("s1");

    assert_eq!(turn.await.unwrap(), TurnOutcome::Cancelled);
    let events = drain(&h.hub, "s1").await;
    assert_eq!(names(&events), ["message_chunk", "message_cancelled"]);
    assert!(!h.cancel.is_requested("s1"));
}

#[tokio::test]
async fn stale_cancel_does_not_affect_next_turn() {
    let h = Harness::new(&[]);
    h.fx.store.get_or_create("s1").await.unwrap();

    h.cancel.request_cancel("s1");
    assert_eq!(
        h.turn("s1", "hello").await,
        TurnOutcome::Completed { reflections: 0 }
    );
}

#[tokio::test]
async fn undo_requires_latest_commit() {
    let h = Harness::new(&[]);
    let handle = h.fx.store.get_or_create("s1").await.unwrap();
    h.fx.factory.script([Round::text(&["x"]).committing("abc1234", "edit")]);
    h.turn("s1", "edit").await;

    let mut session = handle.lock().await;
    let err = actions::undo_commit(&mut session, "zzz9999")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Commit zzz9999 is not the latest commit");

    let message = actions::undo_commit(&mut session, "abc1234").await.unwrap();
    assert!(message.starts_with("Removed: abc1234 edit"));
    assert_eq!(session.last_commit(), None);
    assert_eq!(session.transcript().last().unwrap().content, message);
    assert_eq!(h.fx.factory.repo.lock().undone, ["abc1234"]);
}

#[tokio::test]
async fn session_survives_restart() {
    let h = Harness::new(&["a.rs", "b.rs"]);
    let handle = h.fx.store.get_or_create("s1").await.unwrap();
    {
        let mut session = handle.lock().await;
        actions::add_files(&mut session, &["a.rs".to_string(), "b.rs".to_string()]);
        switch::switch_mode(
            &mut session,
            h.fx.store.factory().as_ref(),
            ChatMode::Ask,
            SwitchOptions::default(),
        )
        .await
        .unwrap();
    }
    h.fx.factory
        .script([Round::text(&["it prints"]).committing("abc1234", "explain")]);
    h.turn("s1", "what does a.rs do").await;
    let expected = handle.lock().await.snapshot();
    assert_eq!(expected.last_commit.as_deref(), Some("abc1234"));

    let restarted = h.fx.restarted();
    let handle = restarted.get_or_create("s1").await.unwrap();
    let session = handle.lock().await;

    assert_eq!(session.transcript(), &expected.transcript);
    assert_eq!(session.files(), ["a.rs", "b.rs"]);
    assert_eq!(session.mode(), ChatMode::Ask);
    assert_eq!(session.input_history(), ["what does a.rs do"]);
    assert_eq!(session.created_at(), expected.created_at);
    assert_eq!(session.last_commit(), Some("abc1234"));
}

#[tokio::test]
async fn evicted_session_is_rehydrated_on_next_use() {
    let h = Harness::new(&["a.rs"]);
    let handle = h.fx.store.get_or_create("s1").await.unwrap();
    actions::add_files(&mut *handle.lock().await, &["a.rs".to_string()]);
    drop(handle);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.fx.store.evict_idle(Duration::from_millis(5)), ["s1"]);
    assert!(h.fx.store.get("s1").is_none());

    let handle = h.fx.store.get_or_create("s1").await.unwrap();
    assert_eq!(handle.lock().await.files(), ["a.rs"]);
}

#[tokio::test]
async fn running_turn_blocks_eviction() {
    let h = Harness::new(&[]);
    h.fx.store.get_or_create("s1").await.unwrap();
    h.fx.factory.script([Round::slow(&["a", "b"], Duration::from_millis(100))]);

    let turn = start_turn(&h.fx.store, &h.hub, &h.cancel, "s1", "long").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.fx.store.evict_idle(Duration::ZERO).is_empty());
    turn.await.unwrap();
}

#[tokio::test]
async fn reinitializing_waits_for_the_running_turn() {
    let h = Harness::new(&[]);
    h.fx.store.get_or_create("s1").await.unwrap();
    h.fx.factory.script([
        Round::slow(&["old1", "old2", "old3", "old4"], Duration::from_millis(60)),
        Round::text(&["new"]),
    ]);

    let old = start_turn(&h.fx.store, &h.hub, &h.cancel, "s1", "old").await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    h.fx.store
        .initialize_project(
            "s1",
            h.fx.project.path(),
            None,
            std::collections::HashMap::new(),
            &h.cancel,
        )
        .await
        .unwrap();

    let new = start_turn(&h.fx.store, &h.hub, &h.cancel, "s1", "new").await;
    assert_eq!(old.await.unwrap(), TurnOutcome::Cancelled);
    assert_eq!(
        new.await.unwrap(),
        TurnOutcome::Completed { reflections: 0 }
    );

    let events = drain(&h.hub, "s1").await;
    let cancelled = events
        .iter()
        .position(|e| matches!(e, StreamEvent::Cancelled { .. }))
        .unwrap();
    assert!(events[..cancelled].iter().all(|e| matches!(
        e,
        StreamEvent::Chunk { chunk } if chunk.starts_with("old")
    )));
    assert_eq!(
        events[cancelled + 1..],
        [
            StreamEvent::Chunk {
                chunk: "new".to_string()
            },
            StreamEvent::Complete {
                content: Some("new".to_string())
            },
        ]
    );
}

#[tokio::test]
async fn deferred_store_refuses_sessions_until_initialized() {
    let fx = Fixture::deferred(&[]);
    let err = fx.store.get_or_create("s1").await.unwrap_err();
    assert!(err.to_string().contains("initialize_project"));

    fx.store
        .initialize_project(
            "s1",
            fx.project.path(),
            Some("test/beta".to_string()),
            [("anthropic".to_string(), "sk-test".to_string())].into(),
            &CancelRegister::new(),
        )
        .await
        .unwrap();

    assert_eq!(fx.store.project().as_deref(), Some(fx.project.path()));
    assert_eq!(fx.store.default_model(), "test/beta");
    assert_eq!(
        fx.factory.repo.lock().credentials.get("anthropic").map(String::as_str),
        Some("sk-test")
    );

    let other = fx.store.get_or_create("s2").await.unwrap();
    assert_eq!(other.lock().await.model(), "test/beta");
}

#[tokio::test]
async fn model_switch_keeps_files_and_transcript() {
    let h = Harness::new(&["a.rs"]);
    let handle = h.fx.store.get_or_create("s1").await.unwrap();
    let mut session = handle.lock().await;
    actions::add_files(&mut session, &["a.rs".to_string()]);
    let before = session.transcript().len();

    switch::switch_model(&mut session, &h.fx.store, "test/beta")
        .await
        .unwrap();

    assert_eq!(session.model(), "test/beta");
    assert_eq!(session.files(), ["a.rs"]);
    assert_eq!(session.transcript().len(), before + 1);
    assert_eq!(
        session.transcript().last().unwrap().content,
        "Switched model to test/beta"
    );
}
