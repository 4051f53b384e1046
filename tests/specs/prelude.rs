// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the scenario tests.

use parking_lot::Mutex;
use parley_adapters::{FakeAgentRuntime, FakeSession};
use parley_core::{Event, FakeClock, SupervisorConfig};
use parley_supervisor::{Admission, EventBus, Process, Subscription, Supervisor};
use std::sync::Arc;
use std::time::Duration;

pub type TestSupervisor = Supervisor<FakeAgentRuntime, FakeClock>;
pub type TestProcess = Arc<Process<FakeClock>>;

/// Supervisor, fake runtime, fake clock, and a recording bus subscriber.
pub struct World {
    pub runtime: FakeAgentRuntime,
    pub supervisor: Arc<TestSupervisor>,
    pub clock: FakeClock,
    pub bus: EventBus,
    events: Arc<Mutex<Vec<Event>>>,
    _subscription: Subscription,
}

pub fn world(config: SupervisorConfig) -> World {
    let runtime = FakeAgentRuntime::new();
    let bus = EventBus::new();
    let clock = FakeClock::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscription = {
        let events = events.clone();
        bus.subscribe(move |envelope| events.lock().push(envelope.event.clone()))
    };
    let supervisor = Supervisor::new(runtime.clone(), bus.clone(), config, clock.clone());
    World { runtime, supervisor, clock, bus, events, _subscription: subscription }
}

impl World {
    pub fn session(&self, index: usize) -> FakeSession {
        self.runtime.session(index).expect("session not started")
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|event| event.name()).collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }
}

/// Unwrap an immediate admission.
pub fn started(admission: Admission<FakeClock>) -> TestProcess {
    match admission {
        Admission::Started(process) => process,
        Admission::Queued(_) => panic!("expected immediate start, got queued"),
    }
}

/// Poll until the condition holds or two seconds elapse.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
