// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending input requests and approval outcomes.
//!
//! A Process surfaces at most one request to the user at a time; further
//! requests wait behind it in arrival order.

use crate::id::{InputRequestId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request for user input, shown to the client while the agent is blocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRequest {
    pub id: InputRequestId,
    pub session_id: SessionId,
    #[serde(flatten)]
    pub payload: InputRequestPayload,
    pub created_at_epoch_ms: u64,
}

/// What the agent is asking for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputRequestPayload {
    /// The agent wants to invoke a tool and the active permission mode
    /// requires user sign-off.
    #[serde(rename = "tool-approval")]
    ToolApproval { tool_name: String, tool_input: Value },
    /// Free-form prompt delivered inline in the message stream. Only
    /// produced by mock runtimes; real runtimes use the approval callback.
    #[serde(rename = "prompt")]
    Prompt {
        prompt: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
    },
}

impl InputRequest {
    /// Tool name when this is a tool-approval request.
    pub fn tool_name(&self) -> Option<&str> {
        match &self.payload {
            InputRequestPayload::ToolApproval { tool_name, .. } => Some(tool_name),
            InputRequestPayload::Prompt { .. } => None,
        }
    }
}

/// Client verdict on a pending input request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputResponse {
    Approve,
    Deny,
}

/// Message attached to denials issued without user feedback.
pub const DENIED_BY_USER: &str = "User denied permission";

/// Outcome delivered to the agent-side caller of a tool approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "behavior", rename_all = "lowercase")]
pub enum ApprovalDecision {
    Allow {
        #[serde(skip_serializing_if = "Option::is_none")]
        updated_input: Option<Value>,
    },
    Deny {
        message: String,
        /// When set, the agent stops the turn instead of retrying the tool.
        interrupt: bool,
    },
}

impl ApprovalDecision {
    pub fn allow() -> Self {
        ApprovalDecision::Allow { updated_input: None }
    }

    pub fn allow_with(updated_input: Value) -> Self {
        ApprovalDecision::Allow { updated_input: Some(updated_input) }
    }

    pub fn deny(message: impl Into<String>, interrupt: bool) -> Self {
        ApprovalDecision::Deny { message: message.into(), interrupt }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, ApprovalDecision::Allow { .. })
    }
}

#[cfg(test)]
#[path = "input_tests.rs"]
mod tests;
