// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-mode tool-gating policy.
//!
//! Decides whether a tool call is auto-allowed or must fall through to a
//! user prompt. Tool names are compared case-insensitively with separators
//! stripped, so `WebFetch`, `web-fetch`, and `web_fetch` all match.

use parley_core::{ApprovalDecision, PermissionMode};
use serde_json::Value;

/// Read-only tools auto-allowed in plan mode.
const READ_ONLY_TOOLS: &[&str] =
    &["read", "glob", "grep", "lsp", "webfetch", "websearch", "task", "taskoutput"];

/// File-editing tools auto-allowed in acceptEdits mode.
const EDIT_TOOLS: &[&str] = &["edit", "write", "notebookedit"];

/// Tools that always prompt in plan mode, even though they would otherwise
/// fall through anyway; listed so the carve-out is explicit.
const PLAN_PROMPT_TOOLS: &[&str] = &["exitplanmode", "askuserquestion"];

/// Writes under this directory are allowed in plan mode.
const PLAN_FILE_DIR: &str = ".claude/plans/";

/// Auto-allow verdict for a tool call, or `None` to prompt the user.
pub(crate) fn auto_decision(
    mode: PermissionMode,
    tool_name: &str,
    input: &Value,
) -> Option<ApprovalDecision> {
    let normalized = normalize(tool_name);
    match mode {
        PermissionMode::BypassPermissions => Some(ApprovalDecision::allow()),
        PermissionMode::Plan => {
            if PLAN_PROMPT_TOOLS.contains(&normalized.as_str()) {
                return None;
            }
            if READ_ONLY_TOOLS.contains(&normalized.as_str()) {
                return Some(ApprovalDecision::allow());
            }
            if is_plan_file_write(&normalized, input) {
                return Some(ApprovalDecision::allow());
            }
            None
        }
        PermissionMode::AcceptEdits => {
            EDIT_TOOLS.contains(&normalized.as_str()).then(ApprovalDecision::allow)
        }
        PermissionMode::Default => None,
    }
}

fn normalize(tool_name: &str) -> String {
    tool_name
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_plan_file_write(normalized_tool: &str, input: &Value) -> bool {
    if !EDIT_TOOLS.contains(&normalized_tool) {
        return false;
    }
    let path = input
        .get("file_path")
        .or_else(|| input.get("notebook_path"))
        .and_then(Value::as_str);
    match path {
        Some(path) => {
            path.starts_with(PLAN_FILE_DIR) || path.contains(&format!("/{PLAN_FILE_DIR}"))
        }
        None => false,
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
