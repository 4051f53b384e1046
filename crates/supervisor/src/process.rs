// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session state machine.
//!
//! A Process consumes one agent message stream on a dedicated task, owns
//! the write-side queue for user turns, drives the tool-approval protocol,
//! and reports lifecycle changes to local subscribers. It is destroyed when
//! its owner aborts it, when the idle timer fires, or when a fatal stream
//! error is detected.
//!
//! Locking rules: the state, mode, pending, and history locks are leaf
//! locks held only for field access, never across an `.await` and never
//! while invoking subscribers.

use crate::error::SendError;
use crate::policy;
use futures_util::StreamExt;
use parking_lot::Mutex;
use parley_adapters::{AgentHandle, MessageSink, MessageStream, StopHandle, StreamError, UserMessage};
use parley_core::{
    normalized_user_text, AgentMessage, ApprovalDecision, Attachment, Clock, InputRequest,
    InputRequestId, InputRequestPayload, InputResponse, MessageId, PermissionMode, ProcessId,
    ProcessState, ProjectId, SessionId, SessionSummary, StateTag, TerminationReason,
    DENIED_BY_USER,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Events delivered to local subscribers of one Process.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// A record was appended to the history (agent output or user echo).
    Message(AgentMessage),
    StateChanged(StateTag),
    ModeChanged { mode: PermissionMode, version: u64 },
    /// The runtime-assigned session id replaced the provisional one.
    SessionChanged { previous: SessionId, current: SessionId },
    /// Non-fatal stream error; the Process keeps consuming.
    StreamError { message: String },
    /// The Process is done and should be disposed by its owner.
    Complete,
}

type ProcessListener = Arc<dyn Fn(&ProcessEvent) + Send + Sync>;

#[derive(Default)]
struct ListenerSet {
    next_id: u64,
    entries: Vec<(u64, ProcessListener)>,
}

/// Subscription handle; dropping it removes the listener.
pub struct ProcessSubscription {
    id: u64,
    set: Weak<Mutex<ListenerSet>>,
}

impl Drop for ProcessSubscription {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            set.lock().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Serializable projection of a Process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub process_id: ProcessId,
    pub session_id: SessionId,
    pub project_id: ProjectId,
    pub project_path: PathBuf,
    pub state: StateTag,
    pub started_at_epoch_ms: u64,
    pub queue_depth: usize,
}

/// Constructor inputs besides the agent handle.
pub struct ProcessSeed<C: Clock> {
    pub session_id: SessionId,
    pub project_id: ProjectId,
    pub project_path: PathBuf,
    pub permission_mode: PermissionMode,
    pub idle_timeout: Duration,
    pub clock: C,
    /// History echo of the initial user turn delivered via the launch spec.
    pub initial_echo: Option<AgentMessage>,
    /// True when the session starts with a turn in progress.
    pub starts_running: bool,
}

struct StateCell {
    state: ProcessState,
    idle_timer: Option<JoinHandle<()>>,
}

struct ModeCell {
    mode: PermissionMode,
    version: u64,
}

struct PendingEntry {
    request: InputRequest,
    /// Resolver for the agent-side caller. `None` for legacy inline
    /// requests, which have no caller to resume.
    responder: Option<oneshot::Sender<ApprovalDecision>>,
}

#[derive(Default)]
struct PendingApprovals {
    order: VecDeque<InputRequestId>,
    entries: HashMap<InputRequestId, PendingEntry>,
}

/// In-memory handle to one live agent session.
pub struct Process<C: Clock> {
    weak: Weak<Process<C>>,
    process_id: ProcessId,
    project_id: ProjectId,
    project_path: PathBuf,
    started_at_epoch_ms: u64,
    idle_timeout: Duration,
    clock: C,
    queue: Arc<dyn MessageSink>,
    stop: StopHandle,
    session: watch::Sender<SessionId>,
    state: Mutex<StateCell>,
    mode: Mutex<ModeCell>,
    history: Mutex<Vec<AgentMessage>>,
    pending: Mutex<PendingApprovals>,
    listeners: Arc<Mutex<ListenerSet>>,
    stopped: AtomicBool,
    complete_emitted: AtomicBool,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Clock> Process<C> {
    /// Construct the Process and spawn its stream-consumption task.
    pub fn spawn(seed: ProcessSeed<C>, handle: AgentHandle) -> Arc<Self> {
        let AgentHandle { stream, queue, stop } = handle;
        let initial_state = if seed.starts_running {
            ProcessState::Running
        } else {
            ProcessState::Idle {
                since: seed.clock.now(),
                since_epoch_ms: seed.clock.epoch_ms(),
            }
        };
        let (session, _) = watch::channel(seed.session_id);
        let process = Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            process_id: ProcessId::generate(),
            project_id: seed.project_id,
            project_path: seed.project_path,
            started_at_epoch_ms: seed.clock.epoch_ms(),
            idle_timeout: seed.idle_timeout,
            clock: seed.clock,
            queue,
            stop,
            session,
            state: Mutex::new(StateCell { state: initial_state, idle_timer: None }),
            mode: Mutex::new(ModeCell { mode: seed.permission_mode, version: 0 }),
            history: Mutex::new(seed.initial_echo.into_iter().collect()),
            pending: Mutex::new(PendingApprovals::default()),
            listeners: Arc::new(Mutex::new(ListenerSet::default())),
            stopped: AtomicBool::new(false),
            complete_emitted: AtomicBool::new(false),
            consumer: Mutex::new(None),
        });
        if !matches!(process.state.lock().state, ProcessState::Running) {
            process.arm_idle_timer();
        }
        let consumer = tokio::spawn(Self::consume(process.clone(), stream));
        *process.consumer.lock() = Some(consumer);
        process
    }

    // --- accessors ---

    pub fn process_id(&self) -> &ProcessId {
        &self.process_id
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn project_path(&self) -> &PathBuf {
        &self.project_path
    }

    pub fn session_id(&self) -> SessionId {
        self.session.borrow().clone()
    }

    pub fn state_tag(&self) -> StateTag {
        self.state.lock().state.tag()
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().state.is_terminated()
    }

    /// Monotonic instant the Process went idle, when idle.
    pub fn idle_since(&self) -> Option<Instant> {
        match self.state.lock().state {
            ProcessState::Idle { since, .. } => Some(since),
            _ => None,
        }
    }

    pub fn permission_mode(&self) -> (PermissionMode, u64) {
        let cell = self.mode.lock();
        (cell.mode, cell.version)
    }

    /// Defensive copy of the in-memory history.
    pub fn message_history(&self) -> Vec<AgentMessage> {
        self.history.lock().clone()
    }

    /// The request currently shown to the user, if any.
    pub fn pending_input_request(&self) -> Option<InputRequest> {
        let pending = self.pending.lock();
        pending
            .order
            .front()
            .and_then(|id| pending.entries.get(id))
            .map(|entry| entry.request.clone())
    }

    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            process_id: self.process_id.clone(),
            session_id: self.session_id(),
            project_id: self.project_id.clone(),
            project_path: self.project_path.clone(),
            state: self.state_tag(),
            started_at_epoch_ms: self.started_at_epoch_ms,
            queue_depth: self.queue.depth(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let info = self.info();
        SessionSummary {
            session_id: info.session_id,
            project_id: info.project_id,
            project_path: info.project_path,
            process_id: info.process_id,
            state: info.state,
            started_at_epoch_ms: info.started_at_epoch_ms,
        }
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&ProcessEvent) + Send + Sync + 'static,
    ) -> ProcessSubscription {
        let mut set = self.listeners.lock();
        set.next_id += 1;
        let id = set.next_id;
        set.entries.push((id, Arc::new(listener)));
        ProcessSubscription { id, set: Arc::downgrade(&self.listeners) }
    }

    // --- public operations ---

    /// Deliver a user turn: record its normalized echo in history, notify
    /// subscribers, and push it through the write-side queue. Legal in
    /// every state except `terminated`; an idle Process transitions back
    /// to `running` first.
    pub async fn queue_message(
        &self,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<MessageId, SendError> {
        let was_idle = {
            let mut cell = self.state.lock();
            match &cell.state {
                ProcessState::Terminated { reason, .. } => {
                    return Err(SendError::Terminated { reason: *reason });
                }
                ProcessState::Idle { .. } => {
                    if let Some(timer) = cell.idle_timer.take() {
                        timer.abort();
                    }
                    cell.state = ProcessState::Running;
                    true
                }
                _ => false,
            }
        };
        if was_idle {
            self.emit(&ProcessEvent::StateChanged(StateTag::Running));
        }
        let id = MessageId::generate();
        let text = normalized_user_text(text, attachments);
        let echo = AgentMessage::user(&id, &text);
        self.history.lock().push(echo.clone());
        self.emit(&ProcessEvent::Message(echo));
        self.queue.push(UserMessage { id: id.clone(), text }).await;
        Ok(id)
    }

    /// Update the permission mode, bumping the mode version.
    pub fn set_permission_mode(&self, mode: PermissionMode) -> u64 {
        let version = {
            let mut cell = self.mode.lock();
            cell.mode = mode;
            cell.version += 1;
            cell.version
        };
        self.emit(&ProcessEvent::ModeChanged { mode, version });
        version
    }

    /// Gate one tool call. Auto-allowed calls return immediately; the rest
    /// are registered as pending input requests and this call suspends the
    /// agent until `respond_to_input` resolves it, the cancel token fires,
    /// or the Process terminates.
    pub async fn handle_tool_approval(
        &self,
        tool_name: &str,
        input: Value,
        cancel: CancellationToken,
    ) -> ApprovalDecision {
        {
            let cell = self.state.lock();
            if let ProcessState::Terminated { reason, .. } = &cell.state {
                return ApprovalDecision::deny(format!("Process terminated: {reason}"), true);
            }
        }
        let mode = self.mode.lock().mode;
        if let Some(decision) = policy::auto_decision(mode, tool_name, &input) {
            return decision;
        }

        let request = InputRequest {
            id: InputRequestId::generate(),
            session_id: self.session_id(),
            payload: InputRequestPayload::ToolApproval {
                tool_name: tool_name.to_string(),
                tool_input: input,
            },
            created_at_epoch_ms: self.clock.epoch_ms(),
        };
        let request_id = request.id.clone();
        let (responder, outcome) = oneshot::channel();
        let surfaced = {
            let mut pending = self.pending.lock();
            pending.entries.insert(
                request_id.clone(),
                PendingEntry { request: request.clone(), responder: Some(responder) },
            );
            pending.order.push_back(request_id.clone());
            pending.order.len() == 1
        };
        if surfaced {
            self.transition(ProcessState::WaitingInput(request));
        }
        // Termination may race the insert above, in which case terminate()
        // has already drained the pending set and nothing would resolve us.
        let terminated = {
            let cell = self.state.lock();
            match &cell.state {
                ProcessState::Terminated { reason, .. } => Some(*reason),
                _ => None,
            }
        };
        if let Some(reason) = terminated {
            self.withdraw(&request_id);
            return ApprovalDecision::deny(format!("Process terminated: {reason}"), true);
        }

        tokio::select! {
            decision = outcome => decision.unwrap_or_else(|_| {
                ApprovalDecision::deny("Tool approval abandoned", true)
            }),
            _ = cancel.cancelled() => {
                self.withdraw(&request_id);
                ApprovalDecision::deny("Tool approval cancelled", true)
            }
        }
    }

    /// Resolve a pending input request. Returns false when no request with
    /// that id is pending.
    pub fn respond_to_input(
        &self,
        request_id: &InputRequestId,
        response: InputResponse,
        answers: Option<Value>,
        feedback: Option<String>,
    ) -> bool {
        let entry = {
            let mut pending = self.pending.lock();
            match pending.entries.remove(request_id) {
                Some(entry) => {
                    pending.order.retain(|id| id != request_id);
                    entry
                }
                None => return false,
            }
        };
        if let InputRequestPayload::ToolApproval { tool_name, tool_input } = &entry.request.payload
        {
            let decision = match response {
                InputResponse::Approve => {
                    match tool_name.as_str() {
                        "EnterPlanMode" => {
                            self.set_permission_mode(PermissionMode::Plan);
                        }
                        "ExitPlanMode" => {
                            self.set_permission_mode(PermissionMode::Default);
                        }
                        _ => {}
                    }
                    match answers {
                        Some(answers) => {
                            ApprovalDecision::allow_with(merge_answers(tool_input, answers))
                        }
                        None => ApprovalDecision::allow(),
                    }
                }
                InputResponse::Deny => match feedback {
                    // With feedback the agent may retry under the guidance;
                    // without it the turn is interrupted.
                    Some(message) => ApprovalDecision::deny(message, false),
                    None => ApprovalDecision::deny(DENIED_BY_USER, true),
                },
            };
            if let Some(responder) = entry.responder {
                let _ = responder.send(decision);
            }
        }
        self.refresh_surfaced();
        true
    }

    /// Abort the session: stop the agent, terminate, resolve any pending
    /// approvals with deny+interrupt, emit `complete`, and drop
    /// subscribers. Idempotent.
    pub fn abort(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop.stop();
        self.terminate(TerminationReason::Aborted, None);
        self.listeners.lock().entries.clear();
    }

    /// The session id once the runtime has reported one, or the current
    /// (possibly provisional) id after the timeout.
    pub async fn wait_for_session_id(&self, timeout: Duration) -> SessionId {
        if !self.session.borrow().is_provisional() {
            return self.session.borrow().clone();
        }
        let mut rx = self.session.subscribe();
        let _ = tokio::time::timeout(timeout, async {
            loop {
                if !rx.borrow_and_update().is_provisional() {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        self.session.borrow().clone()
    }

    // --- stream consumption ---

    async fn consume(self: Arc<Self>, mut stream: MessageStream) {
        while let Some(item) = stream.next().await {
            match item {
                Ok(message) => self.on_message(message),
                Err(error) => {
                    if self.on_stream_error(error) {
                        return;
                    }
                }
            }
        }
        self.on_stream_end();
    }

    fn on_message(&self, message: AgentMessage) {
        if self.is_terminated() {
            return;
        }
        self.history.lock().push(message.clone());
        self.emit(&ProcessEvent::Message(message.clone()));

        if let Some(session_id) = message.init_session_id() {
            self.adopt_session_id(session_id);
        } else if let Some(payload) = message.input_request() {
            self.on_inline_input_request(payload);
        } else if message.is_result() {
            self.to_idle();
        }
    }

    fn adopt_session_id(&self, session_id: SessionId) {
        let previous = self.session.borrow().clone();
        if previous == session_id {
            return;
        }
        self.session.send_replace(session_id.clone());
        self.emit(&ProcessEvent::SessionChanged { previous, current: session_id });
    }

    /// Legacy path for mock runtimes that deliver input requests inline in
    /// the stream instead of through the approval callback.
    fn on_inline_input_request(&self, payload: &Value) {
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .map(InputRequestId::from_string)
            .unwrap_or_else(InputRequestId::generate);
        let prompt =
            payload.get("prompt").and_then(Value::as_str).unwrap_or_default().to_string();
        let options = payload
            .get("options")
            .and_then(Value::as_array)
            .map(|options| {
                options.iter().filter_map(Value::as_str).map(str::to_string).collect()
            })
            .unwrap_or_default();
        let request = InputRequest {
            id: id.clone(),
            session_id: self.session_id(),
            payload: InputRequestPayload::Prompt { prompt, options },
            created_at_epoch_ms: self.clock.epoch_ms(),
        };
        let surfaced = {
            let mut pending = self.pending.lock();
            pending
                .entries
                .insert(id.clone(), PendingEntry { request: request.clone(), responder: None });
            pending.order.push_back(id);
            pending.order.len() == 1
        };
        if surfaced {
            self.transition(ProcessState::WaitingInput(request));
        }
    }

    /// Returns true when the error terminated the Process.
    fn on_stream_error(&self, error: StreamError) -> bool {
        if let Some(reason) = error.termination_reason() {
            tracing::warn!(process = %self.process_id, %error, "agent stream terminated");
            self.terminate(reason, Some(error.message));
            return true;
        }
        tracing::warn!(process = %self.process_id, %error, "agent stream error");
        self.emit(&ProcessEvent::StreamError { message: error.message });
        let waiting = matches!(self.state.lock().state, ProcessState::WaitingInput(_));
        if !waiting {
            self.to_idle();
        }
        false
    }

    fn on_stream_end(&self) {
        // While waiting for input the user still owes a response; the only
        // way out of waiting-input is termination.
        let skip = {
            let cell = self.state.lock();
            cell.state.is_terminated() || matches!(cell.state, ProcessState::WaitingInput(_))
        };
        if skip {
            return;
        }
        self.to_idle();
    }

    // --- state machinery ---

    /// Apply a transition unless terminated. Cancels any armed idle timer.
    fn transition(&self, state: ProcessState) -> bool {
        let tag = state.tag();
        {
            let mut cell = self.state.lock();
            if cell.state.is_terminated() {
                return false;
            }
            if let Some(timer) = cell.idle_timer.take() {
                timer.abort();
            }
            cell.state = state;
        }
        self.emit(&ProcessEvent::StateChanged(tag));
        true
    }

    fn to_idle(&self) {
        {
            let cell = self.state.lock();
            if cell.state.is_terminated() || matches!(cell.state, ProcessState::Idle { .. }) {
                return;
            }
        }
        let state = ProcessState::Idle {
            since: self.clock.now(),
            since_epoch_ms: self.clock.epoch_ms(),
        };
        if self.transition(state) {
            self.arm_idle_timer();
        }
    }

    fn arm_idle_timer(&self) {
        let weak = self.weak.clone();
        let timeout = self.idle_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(process) = weak.upgrade() {
                process.on_idle_expired();
            }
        });
        let mut cell = self.state.lock();
        if let Some(old) = cell.idle_timer.replace(timer) {
            old.abort();
        }
    }

    fn on_idle_expired(&self) {
        let still_idle = matches!(self.state.lock().state, ProcessState::Idle { .. });
        if still_idle {
            tracing::debug!(process = %self.process_id, "idle timeout expired");
            self.emit_complete();
        }
    }

    fn terminate(&self, reason: TerminationReason, error: Option<String>) {
        {
            let mut cell = self.state.lock();
            if cell.state.is_terminated() {
                return;
            }
            if let Some(timer) = cell.idle_timer.take() {
                timer.abort();
            }
            cell.state = ProcessState::Terminated { reason, error };
        }
        let drained: Vec<PendingEntry> = {
            let mut pending = self.pending.lock();
            pending.order.clear();
            pending.entries.drain().map(|(_, entry)| entry).collect()
        };
        let message = format!("Process terminated: {reason}");
        for entry in drained {
            if let Some(responder) = entry.responder {
                let _ = responder.send(ApprovalDecision::deny(message.clone(), true));
            }
        }
        self.emit(&ProcessEvent::StateChanged(StateTag::Terminated));
        self.emit_complete();
    }

    // --- pending-approval bookkeeping ---

    /// Remove a pending request whose caller gave up on it.
    fn withdraw(&self, request_id: &InputRequestId) {
        {
            let mut pending = self.pending.lock();
            if pending.entries.remove(request_id).is_none() {
                return;
            }
            pending.order.retain(|id| id != request_id);
        }
        self.refresh_surfaced();
    }

    /// Re-align the displayed state with the head of the pending queue.
    fn refresh_surfaced(&self) {
        let head = {
            let pending = self.pending.lock();
            pending
                .order
                .front()
                .and_then(|id| pending.entries.get(id))
                .map(|entry| entry.request.clone())
        };
        match head {
            Some(request) => {
                let already_shown = {
                    let cell = self.state.lock();
                    matches!(&cell.state, ProcessState::WaitingInput(current) if current.id == request.id)
                };
                if !already_shown {
                    self.transition(ProcessState::WaitingInput(request));
                }
            }
            None => {
                let waiting = matches!(self.state.lock().state, ProcessState::WaitingInput(_));
                if waiting {
                    self.transition(ProcessState::Running);
                }
            }
        }
    }

    fn emit(&self, event: &ProcessEvent) {
        let listeners: Vec<ProcessListener> = {
            let set = self.listeners.lock();
            set.entries.iter().map(|(_, listener)| listener.clone()).collect()
        };
        for listener in listeners {
            listener(event);
        }
    }

    fn emit_complete(&self) {
        if !self.complete_emitted.swap(true, Ordering::SeqCst) {
            self.emit(&ProcessEvent::Complete);
        }
    }
}

impl<C: Clock> Drop for Process<C> {
    fn drop(&mut self) {
        if let Some(timer) = self.state.lock().idle_timer.take() {
            timer.abort();
        }
        if let Some(consumer) = self.consumer.lock().take() {
            consumer.abort();
        }
    }
}

/// Attach the user's answers to the original tool input.
fn merge_answers(tool_input: &Value, answers: Value) -> Value {
    match tool_input {
        Value::Object(map) => {
            let mut merged = map.clone();
            merged.insert("answers".to_string(), answers);
            Value::Object(merged)
        }
        _ => json!({ "answers": answers }),
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
