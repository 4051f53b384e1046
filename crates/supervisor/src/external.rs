// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External-session detection.
//!
//! A session is external when its on-disk log is being written by an agent
//! instance we do not own (the same CLI driven from a terminal). The
//! tracker watches `file:activity` events and classifies a session as
//! external while unattributed writes are fresher than the decay window.
//! `session:aborted` installs a short grace window first, so the writes
//! that follow a clean abort do not flap the session back to external
//! during shutdown.
//!
//! All windows are measured on the monotonic clock; negative deltas cannot
//! occur with `Instant` arithmetic (`saturating_duration_since`).

use crate::bus::{EventBus, Subscription};
use parking_lot::Mutex;
use parley_core::{Clock, Event, Ownership, ProjectId, SessionId, TrackerConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// View of the supervisor the tracker needs: is a session currently owned
/// by a live Process?
pub trait OwnershipProbe: Send + Sync + 'static {
    fn owns_session(&self, session_id: &SessionId) -> bool;
}

struct SessionRecord {
    last_external_write: Option<Instant>,
    suppressed_until: Option<Instant>,
}

/// Tracks which sessions are driven by agent instances we do not own.
pub struct ExternalSessionTracker<C: Clock> {
    weak: std::sync::Weak<ExternalSessionTracker<C>>,
    clock: C,
    config: TrackerConfig,
    owners: Arc<dyn OwnershipProbe>,
    bus: EventBus,
    records: Mutex<HashMap<SessionId, SessionRecord>>,
}

impl<C: Clock> ExternalSessionTracker<C> {
    pub fn new(
        owners: Arc<dyn OwnershipProbe>,
        bus: EventBus,
        config: TrackerConfig,
        clock: C,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            clock,
            config,
            owners,
            bus,
            records: Mutex::new(HashMap::new()),
        })
    }

    /// Subscribe to the bus. The returned subscription must be held for the
    /// tracker to receive events.
    pub fn attach(&self) -> Subscription {
        let tracker = self.weak.clone();
        self.bus.subscribe(move |envelope| {
            if let Some(tracker) = tracker.upgrade() {
                tracker.on_event(&envelope.event);
            }
        })
    }

    /// True while the session has an unattributed write fresher than the
    /// decay window and no live Process owns it.
    pub fn is_external(&self, session_id: &SessionId) -> bool {
        if self.owners.owns_session(session_id) {
            return false;
        }
        let now = self.clock.now();
        let records = self.records.lock();
        match records.get(session_id).and_then(|record| record.last_external_write) {
            Some(last) => now.saturating_duration_since(last) < self.config.decay(),
            None => false,
        }
    }

    fn on_event(&self, event: &Event) {
        match event {
            Event::SessionAborted { session_id, .. } => self.install_grace(session_id),
            Event::FileActivity { session_id, project_id, .. } => {
                self.record_activity(session_id, project_id);
            }
            _ => {}
        }
    }

    /// Ignore writes to this session for the abort grace window.
    fn install_grace(&self, session_id: &SessionId) {
        let until = self.clock.now() + self.config.abort_grace();
        let mut records = self.records.lock();
        let record = records
            .entry(session_id.clone())
            .or_insert(SessionRecord { last_external_write: None, suppressed_until: None });
        record.suppressed_until = Some(until);
        record.last_external_write = None;
    }

    /// Classify one observed write. Publishes a `session:status` transition
    /// when the session newly becomes external.
    fn record_activity(&self, session_id: &SessionId, project_id: &ProjectId) {
        if self.owners.owns_session(session_id) {
            // Attributed to one of our own Processes.
            return;
        }
        let now = self.clock.now();
        let became_external = {
            let mut records = self.records.lock();
            let record = records
                .entry(session_id.clone())
                .or_insert(SessionRecord { last_external_write: None, suppressed_until: None });
            if let Some(until) = record.suppressed_until {
                if now < until {
                    return;
                }
                record.suppressed_until = None;
            }
            let was_external = record
                .last_external_write
                .map(|last| now.saturating_duration_since(last) < self.config.decay())
                .unwrap_or(false);
            record.last_external_write = Some(now);
            !was_external
        };
        if became_external {
            tracing::debug!(session = %session_id, "session classified as external");
            self.bus.publish(Event::SessionStatusChanged {
                session_id: session_id.clone(),
                project_id: project_id.clone(),
                ownership: Ownership::External,
            });
        }
    }
}

#[cfg(test)]
#[path = "external_tests.rs"]
mod tests;
