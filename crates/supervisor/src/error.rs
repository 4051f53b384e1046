// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor error types.

use crate::queue::QueueError;
use parley_adapters::AgentRuntimeError;
use parley_core::{ProcessId, ProjectPathError, SessionId, TerminationReason};
use thiserror::Error;

/// Failure to deliver a user message to a Process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("process terminated: {reason}")]
    Terminated { reason: TerminationReason },
}

/// Errors from supervisor operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("process not found: {0}")]
    ProcessNotFound(ProcessId),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error(transparent)]
    ProjectPath(#[from] ProjectPathError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Send(#[from] SendError),

    /// The agent CLI is missing from the host.
    #[error("agent command not found: {command} (is the agent CLI installed and on PATH?)")]
    AgentNotInstalled { command: String },

    #[error("agent failed to start: {0}")]
    AgentStartFailed(String),

    #[error(transparent)]
    Runtime(AgentRuntimeError),
}

impl SupervisorError {
    /// Translate runtime startup failures into user-facing variants.
    pub(crate) fn from_runtime(error: AgentRuntimeError) -> Self {
        match error {
            AgentRuntimeError::ExecutableNotFound { command } => {
                SupervisorError::AgentNotInstalled { command }
            }
            AgentRuntimeError::SpawnFailed(message) => SupervisorError::AgentStartFailed(message),
            other => SupervisorError::Runtime(other),
        }
    }
}
