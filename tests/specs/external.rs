// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External-session detection and the shutdown grace window.

use crate::prelude::*;
use parley_core::{Clock, Event, Ownership, ProjectId, SessionId, SupervisorConfig, TrackerConfig};
use parley_supervisor::{ExternalSessionTracker, OwnershipProbe};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn tracker_for(
    w: &World,
    config: TrackerConfig,
) -> (Arc<ExternalSessionTracker<parley_core::FakeClock>>, parley_supervisor::Subscription) {
    let probe: Arc<dyn OwnershipProbe> = w.supervisor.clone();
    let tracker = ExternalSessionTracker::new(probe, w.bus.clone(), config, w.clock.clone());
    let subscription = tracker.attach();
    (tracker, subscription)
}

fn file_write(w: &World, session: &str) {
    w.bus.publish(Event::FileActivity {
        session_id: SessionId::new(session),
        project_id: ProjectId::from_path(Path::new("/p")).unwrap(),
        epoch_ms: w.clock.epoch_ms(),
    });
}

/// A clean abort installs a grace window before the agent's termination
/// writes reach disk, so shutdown does not flap the session to external;
/// once the window passes, unattributed writes classify it external until
/// the decay expires.
#[tokio::test]
async fn abort_grace_then_external_classification() {
    let w = world(SupervisorConfig::default());
    let (tracker, _subscription) =
        tracker_for(&w, TrackerConfig { decay_ms: 1_000, abort_grace_ms: 500 });

    let process = started(
        w.supervisor.start_session(Path::new("/p"), "hi", &[], None).await.unwrap(),
    );
    w.session(0).emit_init("s");
    wait_until(|| process.session_id() == SessionId::new("s")).await;

    // While we own the session, writes are attributed to us.
    file_write(&w, "s");
    assert!(!tracker.is_external(&SessionId::new("s")));

    w.clear_events();
    w.supervisor.abort_session(&SessionId::new("s")).await.unwrap();
    assert!(w.event_names().contains(&"session:aborted"));

    // Termination writes inside the grace window are ignored even though
    // no Process owns the session anymore.
    w.clock.advance(Duration::from_millis(100));
    file_write(&w, "s");
    file_write(&w, "s");
    assert!(!tracker.is_external(&SessionId::new("s")));

    // Past the grace window a foreign writer shows up.
    w.clock.advance(Duration::from_millis(500));
    w.clear_events();
    file_write(&w, "s");
    assert!(tracker.is_external(&SessionId::new("s")));
    assert!(w.events().iter().any(|event| matches!(
        event,
        Event::SessionStatusChanged { ownership: Ownership::External, .. }
    )));

    // ...and fades back out after the decay window.
    w.clock.advance(Duration::from_millis(1_100));
    assert!(!tracker.is_external(&SessionId::new("s")));
}

/// Writes to a session we never owned classify it external immediately.
#[tokio::test]
async fn foreign_sessions_classify_without_any_history() {
    let w = world(SupervisorConfig::default());
    let (tracker, _subscription) = tracker_for(&w, TrackerConfig::default());

    file_write(&w, "stranger");
    assert!(tracker.is_external(&SessionId::new("stranger")));
    assert!(!w.supervisor.ever_owned(&SessionId::new("stranger")));
}

/// Resuming a session we own again clears the external classification
/// without waiting for decay.
#[tokio::test]
async fn ownership_overrides_external_classification() {
    let w = world(SupervisorConfig::default());
    let (tracker, _subscription) = tracker_for(&w, TrackerConfig::default());

    file_write(&w, "s2");
    assert!(tracker.is_external(&SessionId::new("s2")));

    let driver = {
        let runtime = w.runtime.clone();
        tokio::spawn(async move {
            loop {
                if let Some(session) = runtime.session(0) {
                    session.emit_init("s2");
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };
    let _process = started(
        w.supervisor
            .resume_session(&SessionId::new("s2"), Path::new("/p"), "back", &[], None)
            .await
            .unwrap(),
    );
    driver.await.unwrap();
    assert!(!tracker.is_external(&SessionId::new("s2")));
}
