// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent message shape.
//!
//! Agent output is a stream of JSON records whose full schema belongs to the
//! agent runtime. The core inspects only a handful of fields (init session
//! ids, inline input requests, turn-completion markers) and forwards
//! everything else opaquely to subscribers and history.

use crate::id::{MessageId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One record from an agent message stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentMessage(pub Value);

impl AgentMessage {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Synthesized history echo of a queued user turn. Carries the same id
    /// the runtime will later record in its persistent log, so clients can
    /// de-duplicate replays against loads of that log.
    pub fn user(id: &MessageId, text: &str) -> Self {
        Self(json!({
            "type": "user",
            "uuid": id.as_str(),
            "message": { "role": "user", "content": text },
        }))
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.get("type")?.as_str()
    }

    fn subtype(&self) -> Option<&str> {
        self.0.get("subtype")?.as_str()
    }

    /// Authoritative session identifier, present on `system`/`init` records.
    pub fn init_session_id(&self) -> Option<SessionId> {
        if self.kind() != Some("system") || self.subtype() != Some("init") {
            return None;
        }
        self.0.get("session_id")?.as_str().map(SessionId::new)
    }

    /// Inline input request, present on `system`/`input_request` records
    /// emitted by mock runtimes.
    pub fn input_request(&self) -> Option<&Value> {
        if self.kind() != Some("system") || self.subtype() != Some("input_request") {
            return None;
        }
        self.0.get("input_request")
    }

    /// True for turn-completion markers.
    pub fn is_result(&self) -> bool {
        self.kind() == Some("result")
    }

    /// Record identifier, when the runtime supplied one.
    pub fn id(&self) -> Option<&str> {
        self.0
            .get("uuid")
            .or_else(|| self.0.get("id"))
            .and_then(Value::as_str)
    }
}

/// Descriptor for a file attached to a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Deterministic rendering of a user turn: the text followed by one
/// bracketed descriptor line per attachment. The same rendering is recorded
/// by the agent runtime in its log, so the in-memory echo and the on-disk
/// record compare equal.
pub fn normalized_user_text(text: &str, attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return text.to_string();
    }
    let mut out = String::from(text);
    for attachment in attachments {
        out.push('\n');
        match attachment.size_bytes {
            Some(size) => out.push_str(&format!(
                "[attachment: {} ({}, {} bytes)]",
                attachment.name, attachment.media_type, size
            )),
            None => out.push_str(&format!(
                "[attachment: {} ({})]",
                attachment.name, attachment.media_type
            )),
        }
    }
    out
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
