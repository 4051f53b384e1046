// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent runtime factory contract.
//!
//! `AgentRuntime::start` launches (or resumes) one agent session and hands
//! back three things: a finite, non-restartable stream of agent messages, a
//! write-side queue for delivering user turns, and a stop handle that makes
//! the stream end promptly. Tool gating happens through the approval
//! callback supplied at start; the runtime invokes it once per tool call
//! and blocks the agent until it resolves.

use crate::sink::MessageSink;
use async_trait::async_trait;
use parley_core::{AgentMessage, ApprovalDecision, MessageId, PermissionMode, SessionId, TerminationReason};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A user turn in its normalized form (text plus attachment descriptors),
/// carrying the id the runtime records in its persistent log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub id: MessageId,
    pub text: String,
}

/// One tool invocation the agent wants to make.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool_name: String,
    pub input: serde_json::Value,
}

pub type ApprovalFuture = Pin<Box<dyn Future<Output = ApprovalDecision> + Send>>;

/// Callback invoked by the runtime for every tool call. The cancellation
/// token fires when the agent withdraws the request (e.g. on abort).
pub type ToolApprovalFn = Arc<dyn Fn(ToolCall, CancellationToken) -> ApprovalFuture + Send + Sync>;

/// Lazily-produced, finite stream of agent messages. Items are opaque
/// records; errors may or may not be fatal (see [`StreamError`]).
pub type MessageStream =
    Pin<Box<dyn futures_util::Stream<Item = Result<AgentMessage, StreamError>> + Send>>;

/// Inputs for starting one agent session.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub cwd: PathBuf,
    /// First user turn, when the session starts with one.
    pub initial_message: Option<UserMessage>,
    /// Resume a previously persisted session instead of creating one.
    pub resume_session_id: Option<SessionId>,
    pub permission_mode: PermissionMode,
}

/// Ends the agent message stream promptly. Safe to call more than once.
#[derive(Clone)]
pub struct StopHandle(Arc<dyn Fn() + Send + Sync>);

impl StopHandle {
    pub fn new(stop: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(stop))
    }

    pub fn stop(&self) {
        (self.0)();
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StopHandle")
    }
}

/// A running agent session as handed back by the runtime.
pub struct AgentHandle {
    pub stream: MessageStream,
    pub queue: Arc<dyn MessageSink>,
    pub stop: StopHandle,
}

/// Errors from starting an agent session.
#[derive(Debug, Error)]
pub enum AgentRuntimeError {
    #[error("agent executable not found: {command}")]
    ExecutableNotFound { command: String },
    #[error("failed to spawn agent: {0}")]
    SpawnFailed(String),
    #[error("agent runtime error: {0}")]
    Other(String),
}

/// Error raised by the agent message stream.
///
/// Most stream errors are transient and the Process keeps consuming; the
/// signatures recognized by `termination_reason` mean the agent process is
/// gone and the session cannot continue from this instance.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StreamError {
    pub message: String,
}

impl StreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// Classify known process-termination signatures.
    pub fn termination_reason(&self) -> Option<TerminationReason> {
        let lower = self.message.to_ascii_lowercase();
        if lower.contains("transport closed") || lower.contains("connection closed") {
            Some(TerminationReason::TransportClosed)
        } else if lower.contains("spawn") || lower.contains("enoent") {
            Some(TerminationReason::SpawnFailed)
        } else if lower.contains("killed") || lower.contains("sigkill") {
            Some(TerminationReason::Killed)
        } else {
            None
        }
    }
}

/// Factory for agent sessions.
#[async_trait]
pub trait AgentRuntime: Send + Sync + 'static {
    /// Start a session and return its stream, write queue, and stop handle.
    ///
    /// `on_tool_approval` is held for the life of the session and invoked
    /// per tool call.
    async fn start(
        &self,
        spec: LaunchSpec,
        on_tool_approval: ToolApprovalFn,
    ) -> Result<AgentHandle, AgentRuntimeError>;
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
