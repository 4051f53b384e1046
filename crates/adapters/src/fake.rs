// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted agent runtime for tests.
//!
//! Each `start` call records a [`FakeSession`] the test drives by hand:
//! emit stream records, raise stream errors, end the stream, invoke the
//! tool-approval callback, and inspect the user turns pushed through the
//! write queue.

use crate::runtime::{
    AgentHandle, AgentRuntime, AgentRuntimeError, LaunchSpec, StopHandle, StreamError,
    ToolApprovalFn, ToolCall, UserMessage,
};
use crate::sink::{ChannelSink, MessageSink, SinkReceiver};
use async_trait::async_trait;
use parking_lot::Mutex;
use parley_core::{AgentMessage, ApprovalDecision};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type StreamItem = Result<AgentMessage, StreamError>;

/// Agent runtime whose sessions are driven by the test.
#[derive(Clone, Default)]
pub struct FakeAgentRuntime {
    inner: Arc<Mutex<RuntimeInner>>,
}

#[derive(Default)]
struct RuntimeInner {
    sessions: Vec<FakeSession>,
    fail_next: Option<AgentRuntimeError>,
}

impl FakeAgentRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `start` call fail with the given error.
    pub fn fail_next_start(&self, error: AgentRuntimeError) {
        self.inner.lock().fail_next = Some(error);
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Session handle by start order.
    pub fn session(&self, index: usize) -> Option<FakeSession> {
        self.inner.lock().sessions.get(index).cloned()
    }

    /// The most recently started session.
    pub fn last_session(&self) -> Option<FakeSession> {
        self.inner.lock().sessions.last().cloned()
    }
}

#[async_trait]
impl AgentRuntime for FakeAgentRuntime {
    async fn start(
        &self,
        spec: LaunchSpec,
        on_tool_approval: ToolApprovalFn,
    ) -> Result<AgentHandle, AgentRuntimeError> {
        if let Some(error) = self.inner.lock().fail_next.take() {
            return Err(error);
        }

        let (stream_tx, stream_rx) = mpsc::unbounded_channel::<StreamItem>();
        let (sink, sink_rx) = ChannelSink::channel();
        let stopped = Arc::new(AtomicBool::new(false));

        let session = FakeSession {
            inner: Arc::new(SessionInner {
                spec,
                approval: on_tool_approval,
                stream_tx: Mutex::new(Some(stream_tx)),
                pushed: Mutex::new(sink_rx),
                stopped: stopped.clone(),
            }),
        };
        self.inner.lock().sessions.push(session.clone());

        let stop_session = session.clone();
        let stop = StopHandle::new(move || {
            stopped.store(true, Ordering::SeqCst);
            stop_session.finish();
        });

        let stream = futures_util::stream::unfold(stream_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        let queue: Arc<dyn MessageSink> = sink;
        Ok(AgentHandle { stream: Box::pin(stream), queue, stop })
    }
}

/// One started session, driven by the test.
#[derive(Clone)]
pub struct FakeSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    spec: LaunchSpec,
    approval: ToolApprovalFn,
    stream_tx: Mutex<Option<mpsc::UnboundedSender<StreamItem>>>,
    pushed: Mutex<SinkReceiver>,
    stopped: Arc<AtomicBool>,
}

impl FakeSession {
    /// The launch spec this session was started with.
    pub fn spec(&self) -> LaunchSpec {
        self.inner.spec.clone()
    }

    fn send(&self, item: StreamItem) {
        if let Some(tx) = self.inner.stream_tx.lock().as_ref() {
            // Send failures mean the consumer is gone; nothing to signal.
            let _ = tx.send(item);
        }
    }

    /// Emit a raw stream record.
    pub fn emit(&self, value: Value) {
        self.send(Ok(AgentMessage::new(value)));
    }

    /// Emit the init record that names the session.
    pub fn emit_init(&self, session_id: &str) {
        self.emit(json!({"type": "system", "subtype": "init", "session_id": session_id}));
    }

    /// Emit a turn-completion marker.
    pub fn emit_result(&self) {
        self.emit(json!({"type": "result", "is_error": false}));
    }

    /// Emit an inline input request (legacy mock path).
    pub fn emit_input_request(&self, id: &str, prompt: &str) {
        self.emit(json!({
            "type": "system",
            "subtype": "input_request",
            "input_request": {"id": id, "type": "prompt", "prompt": prompt},
        }));
    }

    /// Raise a stream error without closing the stream.
    pub fn fail(&self, message: &str) {
        self.send(Err(StreamError::new(message)));
    }

    /// End the stream.
    pub fn finish(&self) {
        self.inner.stream_tx.lock().take();
    }

    /// True once the supervisor has called the stop handle.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Invoke the tool-approval callback as the agent would, resolving to
    /// the supervisor's decision.
    pub fn request_tool(
        &self,
        tool_name: &str,
        input: Value,
    ) -> tokio::task::JoinHandle<ApprovalDecision> {
        self.request_tool_with(tool_name, input, CancellationToken::new())
    }

    /// Same as `request_tool` with a caller-controlled cancel token.
    pub fn request_tool_with(
        &self,
        tool_name: &str,
        input: Value,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<ApprovalDecision> {
        let call = ToolCall { tool_name: tool_name.to_string(), input };
        let future = (self.inner.approval)(call, cancel);
        tokio::spawn(future)
    }

    /// User turns pushed through the write queue since the last call.
    pub fn drain_pushed(&self) -> Vec<UserMessage> {
        let mut rx = self.inner.pushed.lock();
        let mut drained = Vec::new();
        while let Some(message) = rx.try_recv() {
            drained.push(message);
        }
        drained
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
