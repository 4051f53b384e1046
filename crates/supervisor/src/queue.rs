// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FIFO holding pen for requests that could not be admitted immediately.
//!
//! Each entry carries a single-shot resolver the enqueuer awaits; it fires
//! exactly once, with `started` when the request is dequeued into a live
//! Process or `cancelled` when the client withdraws it or the start fails.
//! Consolidation by session id is the caller's job: the supervisor checks
//! `find_by_session` before enqueuing a resume.

use crate::bus::EventBus;
use parking_lot::Mutex;
use parley_core::{
    Attachment, Event, PermissionMode, ProcessId, ProjectId, QueueId, QueueRemovalReason,
    SessionId,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::oneshot;

/// What kind of admission the entry is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    NewSession,
    ResumeSession,
}

/// User turn held until the request starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingUserMessage {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

/// Resolution delivered through the enqueue ticket.
#[derive(Debug, PartialEq)]
pub enum QueueOutcome {
    Started { process_id: ProcessId },
    Cancelled { reason: String },
}

/// Inputs for one enqueue.
pub struct EnqueueRequest {
    pub kind: QueueKind,
    pub project_id: ProjectId,
    pub project_path: PathBuf,
    /// Required when kind is `ResumeSession`.
    pub session_id: Option<SessionId>,
    pub message: Option<PendingUserMessage>,
    pub permission_mode: Option<PermissionMode>,
    pub enqueued_at_epoch_ms: u64,
}

/// A waiting entry.
pub struct QueuedRequest {
    pub id: QueueId,
    pub kind: QueueKind,
    pub project_id: ProjectId,
    pub project_path: PathBuf,
    pub session_id: Option<SessionId>,
    pub message: Option<PendingUserMessage>,
    pub permission_mode: Option<PermissionMode>,
    pub enqueued_at_epoch_ms: u64,
    resolver: oneshot::Sender<QueueOutcome>,
}

impl QueuedRequest {
    /// Fire the single-shot resolver. The receiver may already be gone.
    pub fn resolve(self, outcome: QueueOutcome) {
        let _ = self.resolver.send(outcome);
    }
}

/// Successful enqueue: id, 1-based position, and the outcome receiver.
#[derive(Debug)]
pub struct Enqueued {
    pub queue_id: QueueId,
    pub position: usize,
    pub outcome: oneshot::Receiver<QueueOutcome>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue full (limit {limit})")]
    Full { limit: usize },
}

/// FIFO of pending requests with per-entry cancellation.
pub struct WorkerQueue {
    entries: Mutex<VecDeque<QueuedRequest>>,
    max_len: Option<usize>,
    bus: EventBus,
}

impl WorkerQueue {
    pub fn new(bus: EventBus, max_len: Option<usize>) -> Self {
        Self { entries: Mutex::new(VecDeque::new()), max_len, bus }
    }

    /// Append an entry, failing when the configured cap is reached.
    pub fn enqueue(&self, request: EnqueueRequest) -> Result<Enqueued, QueueError> {
        let (resolver, outcome) = oneshot::channel();
        let id = QueueId::generate();
        let entry = QueuedRequest {
            id: id.clone(),
            kind: request.kind,
            project_id: request.project_id.clone(),
            project_path: request.project_path,
            session_id: request.session_id.clone(),
            message: request.message,
            permission_mode: request.permission_mode,
            enqueued_at_epoch_ms: request.enqueued_at_epoch_ms,
            resolver,
        };
        let position = {
            let mut entries = self.entries.lock();
            if let Some(limit) = self.max_len {
                if entries.len() >= limit {
                    return Err(QueueError::Full { limit });
                }
            }
            entries.push_back(entry);
            entries.len()
        };
        self.bus.publish(Event::QueueRequestAdded {
            queue_id: id.clone(),
            session_id: request.session_id,
            project_id: request.project_id,
            position,
        });
        Ok(Enqueued { queue_id: id, position, outcome })
    }

    /// Pop the head entry, notifying survivors of their new positions.
    pub fn dequeue(&self) -> Option<QueuedRequest> {
        let (entry, moved) = {
            let mut entries = self.entries.lock();
            let entry = entries.pop_front()?;
            (entry, position_events(&entries))
        };
        for event in moved {
            self.bus.publish(event);
        }
        Some(entry)
    }

    /// Remove an entry by id, resolving it as cancelled.
    pub fn cancel(&self, queue_id: &QueueId, reason: &str) -> bool {
        let (entry, moved) = {
            let mut entries = self.entries.lock();
            let Some(index) = entries.iter().position(|e| &e.id == queue_id) else {
                return false;
            };
            let Some(entry) = entries.remove(index) else {
                return false;
            };
            (entry, position_events(&entries))
        };
        self.bus.publish(Event::QueueRequestRemoved {
            queue_id: entry.id.clone(),
            session_id: entry.session_id.clone(),
            reason: QueueRemovalReason::Cancelled,
        });
        for event in moved {
            self.bus.publish(event);
        }
        entry.resolve(QueueOutcome::Cancelled { reason: reason.to_string() });
        true
    }

    /// First entry for the given session, with its current 1-based position.
    pub fn find_by_session(&self, session_id: &SessionId) -> Option<(QueueId, usize)> {
        let entries = self.entries.lock();
        entries
            .iter()
            .position(|e| e.session_id.as_ref() == Some(session_id))
            .map(|index| (entries[index].id.clone(), index + 1))
    }

    /// Current 1-based position of an entry.
    pub fn position(&self, queue_id: &QueueId) -> Option<usize> {
        self.entries.lock().iter().position(|e| &e.id == queue_id).map(|i| i + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn position_events(entries: &VecDeque<QueuedRequest>) -> Vec<Event> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| Event::QueuePositionChanged {
            queue_id: entry.id.clone(),
            session_id: entry.session_id.clone(),
            position: index + 1,
        })
        .collect()
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
