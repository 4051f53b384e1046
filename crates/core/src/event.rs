// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types broadcast on the supervisor's event bus.
//!
//! Serializes with `{"type": "area:name", ...fields}` format.

use crate::id::{ProcessId, QueueId, SessionId};
use crate::project::ProjectId;
use crate::state::{Ownership, StateTag};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Projection of a registered Process for `session:created` payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub project_id: ProjectId,
    pub project_path: PathBuf,
    pub process_id: ProcessId,
    pub state: StateTag,
    pub started_at_epoch_ms: u64,
}

/// Why a queue entry was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueRemovalReason {
    Started,
    Cancelled,
}

/// Events published on the bus as sessions, workers, and queue entries
/// change state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "session:created")]
    SessionCreated { summary: SessionSummary },

    #[serde(rename = "session:status")]
    SessionStatusChanged {
        session_id: SessionId,
        project_id: ProjectId,
        ownership: Ownership,
    },

    /// Process entered `running` or `waiting-input`. Other states are
    /// reported through `session:status` transitions.
    #[serde(rename = "process:state")]
    ProcessStateChanged {
        session_id: SessionId,
        project_id: ProjectId,
        state: StateTag,
    },

    /// Emitted before the abort reaches the agent, so listeners can install
    /// grace windows ahead of the termination writes hitting disk.
    #[serde(rename = "session:aborted")]
    SessionAborted { session_id: SessionId, project_id: ProjectId },

    #[serde(rename = "worker:activity")]
    WorkerActivityChanged {
        active_workers: usize,
        queue_length: usize,
        has_active_work: bool,
    },

    #[serde(rename = "queue:added")]
    QueueRequestAdded {
        queue_id: QueueId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        project_id: ProjectId,
        position: usize,
    },

    #[serde(rename = "queue:removed")]
    QueueRequestRemoved {
        queue_id: QueueId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        reason: QueueRemovalReason,
    },

    #[serde(rename = "queue:position")]
    QueuePositionChanged {
        queue_id: QueueId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        position: usize,
    },

    /// Write observed on an agent session log, forwarded from the
    /// file-watch collaborator.
    #[serde(rename = "file:activity")]
    FileActivity {
        session_id: SessionId,
        project_id: ProjectId,
        epoch_ms: u64,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::SessionCreated { .. } => "session:created",
            Event::SessionStatusChanged { .. } => "session:status",
            Event::ProcessStateChanged { .. } => "process:state",
            Event::SessionAborted { .. } => "session:aborted",
            Event::WorkerActivityChanged { .. } => "worker:activity",
            Event::QueueRequestAdded { .. } => "queue:added",
            Event::QueueRequestRemoved { .. } => "queue:removed",
            Event::QueuePositionChanged { .. } => "queue:position",
            Event::FileActivity { .. } => "file:activity",
        }
    }

    /// One-line rendering for activity logs.
    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::SessionCreated { summary } => {
                format!("{t} session={} process={}", summary.session_id, summary.process_id)
            }
            Event::SessionStatusChanged { session_id, ownership, .. } => {
                format!("{t} session={session_id} owner={}", ownership.label())
            }
            Event::ProcessStateChanged { session_id, state, .. } => {
                format!("{t} session={session_id} state={state}")
            }
            Event::SessionAborted { session_id, .. } => format!("{t} session={session_id}"),
            Event::WorkerActivityChanged { active_workers, queue_length, .. } => {
                format!("{t} active={active_workers} queued={queue_length}")
            }
            Event::QueueRequestAdded { queue_id, position, .. } => {
                format!("{t} queue_id={queue_id} position={position}")
            }
            Event::QueueRequestRemoved { queue_id, reason, .. } => {
                let reason = match reason {
                    QueueRemovalReason::Started => "started",
                    QueueRemovalReason::Cancelled => "cancelled",
                };
                format!("{t} queue_id={queue_id} reason={reason}")
            }
            Event::QueuePositionChanged { queue_id, position, .. } => {
                format!("{t} queue_id={queue_id} position={position}")
            }
            Event::FileActivity { session_id, .. } => format!("{t} session={session_id}"),
        }
    }

    /// Session identifier, for events scoped to one session.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Event::SessionCreated { summary } => Some(&summary.session_id),
            Event::SessionStatusChanged { session_id, .. }
            | Event::ProcessStateChanged { session_id, .. }
            | Event::SessionAborted { session_id, .. }
            | Event::FileActivity { session_id, .. } => Some(session_id),
            Event::QueueRequestAdded { session_id, .. }
            | Event::QueueRequestRemoved { session_id, .. }
            | Event::QueuePositionChanged { session_id, .. } => session_id.as_ref(),
            Event::WorkerActivityChanged { .. } => None,
        }
    }
}

/// An event stamped with its publication time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
