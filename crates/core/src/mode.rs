// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Permission modes governing tool approvals.
//!
//! The mode is mutable during a Process's life; every change bumps a
//! monotonically increasing mode version so clients can discard stale
//! updates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Tool-gating policy for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionMode {
    /// Every tool call falls through to a user prompt.
    #[default]
    #[serde(rename = "default")]
    Default,
    /// File-editing tools are auto-allowed.
    #[serde(rename = "acceptEdits")]
    AcceptEdits,
    /// Read-only tools and plan-file writes are auto-allowed.
    #[serde(rename = "plan")]
    Plan,
    /// Every tool call is auto-allowed.
    #[serde(rename = "bypassPermissions")]
    BypassPermissions,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::Plan => "plan",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown permission mode: {0}")]
pub struct ParseModeError(pub String);

impl FromStr for PermissionMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PermissionMode::Default),
            "acceptEdits" => Ok(PermissionMode::AcceptEdits),
            "plan" => Ok(PermissionMode::Plan),
            "bypassPermissions" => Ok(PermissionMode::BypassPermissions),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "mode_tests.rs"]
mod tests;
