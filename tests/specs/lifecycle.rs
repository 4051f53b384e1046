// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle: start, resume, message echo, termination.

use crate::prelude::*;
use parking_lot::Mutex;
use parley_core::{Event, SessionId, StateTag, SupervisorConfig, TerminationReason};
use parley_supervisor::{ProcessEvent, SendError};
use std::path::Path;
use std::sync::Arc;

/// Start a session, let the agent name it and finish a turn, then resume
/// it with a second message. One Process serves both turns.
#[tokio::test]
async fn start_then_resume_reuses_the_process() {
    let w = world(SupervisorConfig::default());

    let process = started(
        w.supervisor.start_session(Path::new("/p"), "hi", &[], None).await.unwrap(),
    );
    assert_eq!(
        w.event_names(),
        vec!["session:created", "session:status", "process:state", "worker:activity"]
    );
    assert_eq!(process.state_tag(), StateTag::Running);

    w.session(0).emit_init("abc");
    w.session(0).emit_result();
    wait_until(|| process.state_tag() == StateTag::Idle).await;
    assert_eq!(process.session_id(), SessionId::new("abc"));

    w.clear_events();
    let resumed = started(
        w.supervisor
            .resume_session(&SessionId::new("abc"), Path::new("/p"), "again", &[], None)
            .await
            .unwrap(),
    );

    assert_eq!(resumed.process_id(), process.process_id());
    assert_eq!(w.runtime.session_count(), 1);
    assert_eq!(process.state_tag(), StateTag::Running);
    let pushed = w.session(0).drain_pushed();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].text, "again");
    assert_eq!(w.supervisor.list_sessions().len(), 1);
    assert_eq!(w.supervisor.list_sessions()[0].session_id, SessionId::new("abc"));
}

/// The in-memory history replayed to a late subscriber matches, id for id,
/// what a from-the-start subscriber observed as message events.
#[tokio::test]
async fn history_replay_matches_live_events() {
    let w = world(SupervisorConfig::default());
    let process = started(
        w.supervisor.start_session(Path::new("/p"), "hello", &[], None).await.unwrap(),
    );
    let live = Arc::new(Mutex::new(Vec::new()));
    let _subscription = process.subscribe({
        let live = live.clone();
        move |event| {
            if let ProcessEvent::Message(message) = event {
                live.lock().push(message.clone());
            }
        }
    });

    w.session(0).emit_init("abc");
    w.session(0).emit(serde_json::json!({"type": "assistant", "message": {"content": "hey"}}));
    process.queue_message("follow-up", &[]).await.unwrap();
    w.session(0).emit_result();
    // Initial echo is already in history; live subscriber missed it.
    wait_until(|| process.message_history().len() == 5).await;

    let history = process.message_history();
    assert_eq!(history[0].0["message"]["content"], "hello");
    assert_eq!(history[1..].to_vec(), live.lock().clone());

    // Echoed user turns carry ids so clients can de-duplicate against the
    // runtime's own log.
    assert!(history[0].id().is_some());
}

#[tokio::test]
async fn messages_to_a_terminated_session_report_the_reason() {
    let w = world(SupervisorConfig::default());
    let process = started(
        w.supervisor.start_session(Path::new("/p"), "hi", &[], None).await.unwrap(),
    );
    w.session(0).emit_init("abc");
    w.session(0).fail("Transport closed");
    wait_until(|| process.is_terminated()).await;

    let err = process.queue_message("anyone there?", &[]).await.unwrap_err();
    assert_eq!(err, SendError::Terminated { reason: TerminationReason::TransportClosed });

    // The supervisor disposed of it; the session is no longer owned.
    wait_until(|| w.supervisor.find_by_session(&SessionId::new("abc")).is_none()).await;
    assert!(w.supervisor.ever_owned(&SessionId::new("abc")));
}

#[tokio::test]
async fn session_status_reports_loss_of_ownership_on_abort() {
    let w = world(SupervisorConfig::default());
    let process = started(
        w.supervisor.start_session(Path::new("/p"), "hi", &[], None).await.unwrap(),
    );
    w.session(0).emit_init("abc");
    wait_until(|| process.session_id() == SessionId::new("abc")).await;
    w.clear_events();

    w.supervisor.abort_session(&SessionId::new("abc")).await.unwrap();

    let events = w.events();
    let statuses: Vec<String> = events
        .iter()
        .filter_map(|event| match event {
            Event::SessionStatusChanged { ownership, .. } => Some(ownership.label().to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec!["none"]);
    assert!(w.session(0).is_stopped());
    assert!(w.supervisor.find_by_session(&SessionId::new("abc")).is_none());
}
