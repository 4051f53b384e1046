// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capacity, preemption, and queue draining.

use crate::prelude::*;
use parley_core::{Event, QueueRemovalReason, StateTag, SupervisorConfig};
use parley_supervisor::{Admission, QueueOutcome};
use std::path::Path;
use std::time::Duration;

fn pool_of_two() -> SupervisorConfig {
    SupervisorConfig {
        max_workers: 2,
        idle_preempt_threshold_ms: 100,
        ..SupervisorConfig::default()
    }
}

/// Two idle workers at capacity; a third admission preempts the one that
/// has been idle longest, and the pool never exceeds its bound.
#[tokio::test]
async fn admission_preempts_the_longest_idle_worker() {
    let w = world(pool_of_two());
    let a = started(w.supervisor.start_session(Path::new("/a"), "a", &[], None).await.unwrap());
    let b = started(w.supervisor.start_session(Path::new("/b"), "b", &[], None).await.unwrap());

    w.session(0).emit_result();
    w.session(1).emit_result();
    wait_until(|| a.state_tag() == StateTag::Idle && b.state_tag() == StateTag::Idle).await;
    w.clock.advance(Duration::from_millis(120));
    // B goes idle again later, so A holds the longer idle duration.
    b.queue_message("keep busy", &[]).await.unwrap();
    w.session(1).emit_result();
    wait_until(|| b.state_tag() == StateTag::Idle).await;
    w.clock.advance(Duration::from_millis(110));

    let c = started(w.supervisor.start_session(Path::new("/c"), "c", &[], None).await.unwrap());
    assert!(a.is_terminated());
    assert!(!b.is_terminated());
    assert_eq!(c.state_tag(), StateTag::Running);
    assert_eq!(w.supervisor.worker_activity().active_workers, 2);
}

/// Running workers are never preempted: admissions queue instead, cancel
/// cleanly, and drain in FIFO order when capacity frees up.
#[tokio::test]
async fn full_pool_queues_cancels_and_drains() {
    let w = world(SupervisorConfig { idle_timeout_ms: 50, ..pool_of_two() });
    let a = started(w.supervisor.start_session(Path::new("/a"), "a", &[], None).await.unwrap());
    let _b = started(w.supervisor.start_session(Path::new("/b"), "b", &[], None).await.unwrap());

    let c = w.supervisor.start_session(Path::new("/c"), "c", &[], None).await.unwrap();
    let c_ticket = match c {
        Admission::Queued(ticket) => ticket,
        Admission::Started(_) => panic!("expected queued"),
    };
    assert_eq!(c_ticket.position, 1);
    let d = w.supervisor.start_session(Path::new("/d"), "d", &[], None).await.unwrap();
    let d_ticket = match d {
        Admission::Queued(ticket) => ticket,
        Admission::Started(_) => panic!("expected queued"),
    };
    assert_eq!(d_ticket.position, 2);

    w.clear_events();
    assert!(w.supervisor.cancel_queued(&c_ticket.queue_id, "cancelled by client"));
    assert_eq!(
        c_ticket.outcome.unwrap().await.unwrap(),
        QueueOutcome::Cancelled { reason: "cancelled by client".to_string() }
    );
    assert!(w.events().iter().any(|event| matches!(
        event,
        Event::QueueRequestRemoved { reason: QueueRemovalReason::Cancelled, .. }
    )));
    assert!(w.events().iter().any(|event| matches!(
        event,
        Event::QueuePositionChanged { position: 1, .. }
    )));

    // Finish A: its turn ends, the idle timer fires, capacity frees, and D
    // starts.
    w.session(0).emit_result();
    let outcome = d_ticket.outcome.unwrap().await.unwrap();
    let started_id = match outcome {
        QueueOutcome::Started { process_id } => process_id,
        QueueOutcome::Cancelled { reason } => panic!("queued start cancelled: {reason}"),
    };
    assert!(a.is_terminated());
    assert!(w.supervisor.get_process(&started_id).is_some());
    assert_eq!(w.supervisor.worker_activity().active_workers, 2);
    assert_eq!(w.supervisor.worker_activity().queue_length, 0);
    assert!(w.events().iter().any(|event| matches!(
        event,
        Event::QueueRequestRemoved { reason: QueueRemovalReason::Started, .. }
    )));
}

/// The live-process count never exceeds the bound across a mixed workload.
#[tokio::test]
async fn pool_bound_holds_across_churn() {
    let w = world(SupervisorConfig {
        max_workers: 3,
        idle_timeout_ms: 30,
        ..SupervisorConfig::default()
    });
    let mut tickets = Vec::new();
    for i in 0..6 {
        let path = format!("/p{i}");
        match w.supervisor.start_session(Path::new(&path), "go", &[], None).await.unwrap() {
            Admission::Started(_) => {}
            Admission::Queued(ticket) => tickets.push(ticket),
        }
        assert!(w.supervisor.worker_activity().active_workers <= 3);
    }
    assert_eq!(w.supervisor.worker_activity().active_workers, 3);
    assert_eq!(tickets.len(), 3);

    // Let the first three finish; the queued three take their slots.
    for i in 0..3 {
        w.session(i).emit_result();
    }
    for ticket in tickets {
        let outcome = ticket.outcome.unwrap().await.unwrap();
        assert!(matches!(outcome, QueueOutcome::Started { .. }));
        assert!(w.supervisor.worker_activity().active_workers <= 3);
    }
}
