// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool approvals: per-mode policy and the pending-request queue.

use crate::prelude::*;
use parley_core::{
    ApprovalDecision, InputResponse, PermissionMode, StateTag, SupervisorConfig, DENIED_BY_USER,
};
use serde_json::json;
use std::path::Path;

async fn world_in_mode(mode: PermissionMode) -> (World, TestProcess) {
    let w = world(SupervisorConfig::default());
    let process = started(
        w.supervisor.start_session(Path::new("/p"), "go", &[], Some(mode)).await.unwrap(),
    );
    (w, process)
}

/// Mode policy, exercised through the approval callback the runtime holds.
#[tokio::test]
async fn plan_mode_allows_reads_and_prompts_for_writes() {
    let (w, process) = world_in_mode(PermissionMode::Plan).await;

    // Read-only tool: allowed with no pending request.
    let decision =
        w.session(0).request_tool("Read", json!({"path": "/a"})).await.unwrap();
    assert!(decision.is_allow());
    assert!(process.pending_input_request().is_none());
    assert_eq!(process.state_tag(), StateTag::Running);

    // Write outside the plans dir: prompts, then the user approves.
    let pending = w.session(0).request_tool("Write", json!({"file_path": "/a"}));
    wait_until(|| process.state_tag() == StateTag::WaitingInput).await;
    let request = process.pending_input_request().unwrap();
    assert_eq!(request.tool_name(), Some("Write"));
    assert!(process.respond_to_input(&request.id, InputResponse::Approve, None, None));
    assert!(pending.await.unwrap().is_allow());
    assert_eq!(process.state_tag(), StateTag::Running);
}

#[tokio::test]
async fn accept_edits_mode_allows_writes() {
    let (w, process) = world_in_mode(PermissionMode::AcceptEdits).await;
    let decision =
        w.session(0).request_tool("Write", json!({"file_path": "/a"})).await.unwrap();
    assert!(decision.is_allow());
    assert!(process.pending_input_request().is_none());
}

#[tokio::test]
async fn bypass_mode_allows_any_tool() {
    let (w, process) = world_in_mode(PermissionMode::BypassPermissions).await;
    let decision =
        w.session(0).request_tool("Bash", json!({"command": "make deploy"})).await.unwrap();
    assert!(decision.is_allow());
    assert!(process.pending_input_request().is_none());
}

#[tokio::test]
async fn default_mode_prompts_for_any_tool() {
    let (w, process) = world_in_mode(PermissionMode::Default).await;
    let pending = w.session(0).request_tool("Read", json!({"path": "/a"}));
    wait_until(|| process.state_tag() == StateTag::WaitingInput).await;
    let request = process.pending_input_request().unwrap();
    process.respond_to_input(&request.id, InputResponse::Deny, None, None);
    assert_eq!(pending.await.unwrap(), ApprovalDecision::deny(DENIED_BY_USER, true));
}

/// Two approvals arrive back to back; the first is denied without
/// feedback (deny + interrupt), the second surfaces and is approved.
#[tokio::test]
async fn concurrent_approvals_are_served_one_at_a_time() {
    let (w, process) = world_in_mode(PermissionMode::Default).await;

    let first = w.session(0).request_tool("Bash", json!({"command": "one"}));
    wait_until(|| process.state_tag() == StateTag::WaitingInput).await;
    let first_id = process.pending_input_request().unwrap().id;
    let second = w.session(0).request_tool("Bash", json!({"command": "two"}));

    // The second waits behind the first; the display does not change.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(process.pending_input_request().unwrap().id, first_id);

    assert!(process.respond_to_input(&first_id, InputResponse::Deny, None, None));
    assert_eq!(first.await.unwrap(), ApprovalDecision::deny(DENIED_BY_USER, true));

    wait_until(|| {
        process.pending_input_request().map(|r| r.id != first_id).unwrap_or(false)
    })
    .await;
    assert_eq!(process.state_tag(), StateTag::WaitingInput);
    let second_request = process.pending_input_request().unwrap();
    assert_eq!(second_request.tool_name(), Some("Bash"));
    assert!(process.respond_to_input(&second_request.id, InputResponse::Approve, None, None));
    assert!(second.await.unwrap().is_allow());
    assert_eq!(process.state_tag(), StateTag::Running);
}

/// Approving EnterPlanMode switches the session into plan mode; approving
/// ExitPlanMode switches it back, each bumping the mode version.
#[tokio::test]
async fn plan_mode_round_trip_via_tool_approvals() {
    let (w, process) = world_in_mode(PermissionMode::Default).await;

    let enter = w.session(0).request_tool("EnterPlanMode", json!({}));
    wait_until(|| process.pending_input_request().is_some()).await;
    let request = process.pending_input_request().unwrap();
    process.respond_to_input(&request.id, InputResponse::Approve, None, None);
    enter.await.unwrap();
    assert_eq!(process.permission_mode().0, PermissionMode::Plan);

    // Now in plan mode, reads are free but ExitPlanMode still prompts.
    assert!(w.session(0).request_tool("Grep", json!({"pattern": "x"})).await.unwrap().is_allow());
    let exit = w.session(0).request_tool("ExitPlanMode", json!({}));
    wait_until(|| process.pending_input_request().is_some()).await;
    let request = process.pending_input_request().unwrap();
    process.respond_to_input(&request.id, InputResponse::Approve, None, None);
    exit.await.unwrap();

    let (mode, version) = process.permission_mode();
    assert_eq!(mode, PermissionMode::Default);
    assert_eq!(version, 2);
}

/// Aborting the session resolves every in-flight approval with
/// deny + interrupt.
#[tokio::test]
async fn abort_resolves_in_flight_approvals() {
    let (w, process) = world_in_mode(PermissionMode::Default).await;
    let pending = w.session(0).request_tool("Bash", json!({"command": "x"}));
    wait_until(|| process.state_tag() == StateTag::WaitingInput).await;

    let process_id = process.process_id().clone();
    w.supervisor.abort_process(&process_id).await.unwrap();

    assert_eq!(
        pending.await.unwrap(),
        ApprovalDecision::deny("Process terminated: aborted", true)
    );
}
