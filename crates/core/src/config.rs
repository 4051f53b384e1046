// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor and tracker configuration.
//!
//! All durations are plain millisecond fields so configs deserialize from
//! TOML without custom formats; `Duration` accessors cover in-process use.

use crate::mode::PermissionMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Maximum concurrent Processes. 0 disables admission control.
    pub max_workers: usize,
    /// Minimum idle duration before a Process may be preempted.
    pub idle_preempt_threshold_ms: u64,
    /// Mode applied when an admission does not request one.
    pub default_permission_mode: PermissionMode,
    /// Idle duration after which a Process completes and is unregistered.
    pub idle_timeout_ms: u64,
    /// How long a resume waits for the runtime to report the session id.
    pub session_id_timeout_ms: u64,
    /// Cap on waiting-queue length. None means unbounded.
    pub queue_max: Option<usize>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            idle_preempt_threshold_ms: 30_000,
            default_permission_mode: PermissionMode::Default,
            idle_timeout_ms: 10 * 60 * 1000,
            session_id_timeout_ms: 5_000,
            queue_max: None,
        }
    }
}

impl SupervisorConfig {
    pub fn idle_preempt_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_preempt_threshold_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn session_id_timeout(&self) -> Duration {
        Duration::from_millis(self.session_id_timeout_ms)
    }
}

/// Tunables for external-session detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// How long after the last unattributed write a session stays external.
    pub decay_ms: u64,
    /// How long after an abort writes to that session are ignored.
    pub abort_grace_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { decay_ms: 30_000, abort_grace_ms: 5_000 }
    }
}

impl TrackerConfig {
    pub fn decay(&self) -> Duration {
        Duration::from_millis(self.decay_ms)
    }

    pub fn abort_grace(&self) -> Duration {
        Duration::from_millis(self.abort_grace_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
