// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process state and session ownership sums.

use crate::id::ProcessId;
use crate::input::InputRequest;
use crate::mode::PermissionMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// State of a Process as driven by its agent message stream.
///
/// `Terminated` is absorbing: a terminated Process accepts no messages and
/// never re-enters another state.
#[derive(Debug, Clone)]
pub enum ProcessState {
    /// An agent turn is in progress.
    Running,
    /// No turn in progress, awaiting a new user message.
    Idle { since: Instant, since_epoch_ms: u64 },
    /// A pending input request is blocking the agent.
    WaitingInput(InputRequest),
    /// The agent process has ended.
    Terminated { reason: TerminationReason, error: Option<String> },
}

impl ProcessState {
    pub fn tag(&self) -> StateTag {
        match self {
            ProcessState::Running => StateTag::Running,
            ProcessState::Idle { .. } => StateTag::Idle,
            ProcessState::WaitingInput(_) => StateTag::WaitingInput,
            ProcessState::Terminated { .. } => StateTag::Terminated,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, ProcessState::Terminated { .. })
    }
}

/// Serializable projection of [`ProcessState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateTag {
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "waiting-input")]
    WaitingInput,
    #[serde(rename = "terminated")]
    Terminated,
}

impl fmt::Display for StateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateTag::Running => "running",
            StateTag::Idle => "idle",
            StateTag::WaitingInput => "waiting-input",
            StateTag::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// Why a Process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The owner called abort.
    Aborted,
    /// The agent's transport closed underneath us.
    TransportClosed,
    /// The agent executable failed to start.
    SpawnFailed,
    /// The agent process was killed externally.
    Killed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationReason::Aborted => "aborted",
            TerminationReason::TransportClosed => "transport closed",
            TerminationReason::SpawnFailed => "spawn failed",
            TerminationReason::Killed => "killed",
        };
        write!(f, "{s}")
    }
}

/// Who is driving a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "owner")]
pub enum Ownership {
    /// This supervisor owns the active Process for the session.
    #[serde(rename = "self")]
    Owned {
        process_id: ProcessId,
        permission_mode: PermissionMode,
        mode_version: u64,
    },
    /// Recent log activity cannot be attributed to any of our Processes.
    #[serde(rename = "external")]
    External,
    /// No owner known.
    #[serde(rename = "none")]
    None,
}

impl Ownership {
    pub fn label(&self) -> &'static str {
        match self {
            Ownership::Owned { .. } => "self",
            Ownership::External => "external",
            Ownership::None => "none",
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
