// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event bus.
//!
//! Publication is synchronous: each subscriber is invoked in subscription
//! order from whichever task published the event. The subscriber list lock
//! is released before delivery, so subscribers may publish further events
//! or subscribe/unsubscribe from inside a callback. Subscriber panics are
//! caught and logged, never propagated to the publisher.

use chrono::Utc;
use parking_lot::Mutex;
use parley_core::{Envelope, Event};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

type Listener = Arc<dyn Fn(&Envelope) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Cloneable handle to one shared subscriber registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

/// Subscription handle; dropping it removes the subscriber.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&Envelope) + Send + Sync + 'static) -> Subscription {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.push((id, Arc::new(listener)));
        Subscription { id, registry: Arc::downgrade(&self.registry) }
    }

    /// Stamp and deliver an event to every current subscriber.
    pub fn publish(&self, event: Event) {
        tracing::debug!(event = event.name(), "{}", event.log_summary());
        let envelope = Envelope { at: Utc::now(), event };
        let listeners: Vec<Listener> = {
            let registry = self.registry.lock();
            registry.listeners.iter().map(|(_, listener)| listener.clone()).collect()
        };
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&envelope))).is_err() {
                tracing::warn!(event = envelope.event.name(), "event subscriber panicked");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
