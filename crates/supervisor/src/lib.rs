// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! parley-supervisor: the in-process session supervisor
//!
//! A [`Supervisor`] owns a pool of agent [`Process`]es bounded by a
//! configurable capacity, with admission control, idle-worker preemption,
//! and a FIFO [`WorkerQueue`] for requests that cannot start immediately.
//! Lifecycle changes are broadcast on the [`EventBus`]; the
//! [`ExternalSessionTracker`] watches file activity for sessions driven by
//! agent instances we do not own.

pub mod bus;
pub mod error;
pub mod external;
mod policy;
pub mod process;
pub mod queue;
pub mod supervisor;

pub use bus::{EventBus, Subscription};
pub use error::{SendError, SupervisorError};
pub use external::{ExternalSessionTracker, OwnershipProbe};
pub use process::{Process, ProcessEvent, ProcessInfo, ProcessSeed, ProcessSubscription};
pub use queue::{
    EnqueueRequest, Enqueued, PendingUserMessage, QueueError, QueueKind, QueueOutcome,
    QueuedRequest, WorkerQueue,
};
pub use supervisor::{Admission, QueueTicket, Supervisor, WorkerActivity};
