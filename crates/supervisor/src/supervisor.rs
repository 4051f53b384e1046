// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker pool with admission control, preemption, and queue draining.
//!
//! Admissions are serialized by an async mutex so the live-process count
//! never overshoots `max_workers`; the registry and ever-owned collections
//! are leaf locks held only for map access. Bus events are published after
//! those locks are released.

use crate::bus::EventBus;
use crate::error::SupervisorError;
use crate::process::{Process, ProcessEvent, ProcessSeed, ProcessSubscription};
use crate::queue::{
    EnqueueRequest, PendingUserMessage, QueueKind, QueueOutcome, WorkerQueue,
};
use parking_lot::Mutex;
use parley_adapters::{
    AgentRuntime, ApprovalFuture, LaunchSpec, ToolApprovalFn, ToolCall, UserMessage,
};
use parley_core::{
    normalized_user_text, AgentMessage, ApprovalDecision, Attachment, Clock, Event, MessageId,
    Ownership, PermissionMode, ProcessId, ProjectId, QueueId, QueueRemovalReason, SessionId,
    SessionSummary, StateTag, SupervisorConfig,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Outcome of an admission: a live Process, or a ticket for a queued one.
pub enum Admission<C: Clock> {
    Started(Arc<Process<C>>),
    Queued(QueueTicket),
}

impl<C: Clock> std::fmt::Debug for Admission<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Admission::Started(process) => {
                f.debug_tuple("Started").field(&process.process_id()).finish()
            }
            Admission::Queued(ticket) => f.debug_tuple("Queued").field(ticket).finish(),
        }
    }
}

impl<C: Clock> Admission<C> {
    pub fn process(&self) -> Option<&Arc<Process<C>>> {
        match self {
            Admission::Started(process) => Some(process),
            Admission::Queued(_) => None,
        }
    }

    pub fn ticket(&self) -> Option<&QueueTicket> {
        match self {
            Admission::Started(_) => None,
            Admission::Queued(ticket) => Some(ticket),
        }
    }
}

/// Handle to a queued admission. `outcome` is `None` when the request was
/// consolidated onto an entry some earlier caller is already awaiting.
#[derive(Debug)]
pub struct QueueTicket {
    pub queue_id: QueueId,
    pub position: usize,
    pub outcome: Option<oneshot::Receiver<QueueOutcome>>,
}

/// Snapshot of pool load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerActivity {
    pub active_workers: usize,
    pub queue_length: usize,
    pub has_active_work: bool,
}

struct ProcessEntry<C: Clock> {
    process: Arc<Process<C>>,
    _subscription: ProcessSubscription,
}

struct Registry<C: Clock> {
    processes: HashMap<ProcessId, ProcessEntry<C>>,
    by_session: HashMap<SessionId, ProcessId>,
}

impl<C: Clock> Default for Registry<C> {
    fn default() -> Self {
        Self { processes: HashMap::new(), by_session: HashMap::new() }
    }
}

struct AdmitRequest {
    kind: QueueKind,
    project_id: ProjectId,
    project_path: PathBuf,
    session_id: Option<SessionId>,
    message: Option<PendingUserMessage>,
    permission_mode: Option<PermissionMode>,
}

/// Pool of agent Processes bounded by a configurable capacity.
pub struct Supervisor<R: AgentRuntime, C: Clock> {
    weak: std::sync::Weak<Supervisor<R, C>>,
    runtime: R,
    bus: EventBus,
    config: SupervisorConfig,
    clock: C,
    queue: WorkerQueue,
    /// Serializes admissions so capacity checks and starts are atomic.
    admission: tokio::sync::Mutex<()>,
    registry: Mutex<Registry<C>>,
    /// Session ids this supervisor has owned at any point in its lifetime.
    /// Consumers use it to decide whether an orphaned tool call in the
    /// on-disk log can be attributed to an interruption on our side.
    ever_owned: Mutex<HashSet<SessionId>>,
}

impl<R: AgentRuntime, C: Clock> Supervisor<R, C> {
    pub fn new(runtime: R, bus: EventBus, config: SupervisorConfig, clock: C) -> Arc<Self> {
        let queue = WorkerQueue::new(bus.clone(), config.queue_max);
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            runtime,
            bus,
            config,
            clock,
            queue,
            admission: tokio::sync::Mutex::new(()),
            registry: Mutex::new(Registry::default()),
            ever_owned: Mutex::new(HashSet::new()),
        })
    }

    // --- public admissions ---

    /// Start a new session with an initial user message.
    pub async fn start_session(
        &self,
        project_path: &Path,
        message: &str,
        attachments: &[Attachment],
        permission_mode: Option<PermissionMode>,
    ) -> Result<Admission<C>, SupervisorError> {
        let project_id = ProjectId::from_path(project_path)?;
        let _guard = self.admission.lock().await;
        self.admit(AdmitRequest {
            kind: QueueKind::NewSession,
            project_id,
            project_path: project_path.to_path_buf(),
            session_id: None,
            message: Some(PendingUserMessage {
                text: message.to_string(),
                attachments: attachments.to_vec(),
            }),
            permission_mode,
        })
        .await
    }

    /// Start a new session with no initial message; the agent blocks on its
    /// queue until the first `queue_message`.
    pub async fn create_session(
        &self,
        project_path: &Path,
        permission_mode: Option<PermissionMode>,
    ) -> Result<Admission<C>, SupervisorError> {
        let project_id = ProjectId::from_path(project_path)?;
        let _guard = self.admission.lock().await;
        self.admit(AdmitRequest {
            kind: QueueKind::NewSession,
            project_id,
            project_path: project_path.to_path_buf(),
            session_id: None,
            message: None,
            permission_mode,
        })
        .await
    }

    /// Attach to a previously persisted session. When a live Process
    /// already owns the session the message is delivered to it; otherwise
    /// a fresh Process is admitted (or the existing queue entry's position
    /// is returned).
    pub async fn resume_session(
        &self,
        session_id: &SessionId,
        project_path: &Path,
        message: &str,
        attachments: &[Attachment],
        permission_mode: Option<PermissionMode>,
    ) -> Result<Admission<C>, SupervisorError> {
        let project_id = ProjectId::from_path(project_path)?;
        let _guard = self.admission.lock().await;

        if let Some(process) = self.find_by_session(session_id) {
            if !process.is_terminated() {
                if let Some(mode) = permission_mode {
                    process.set_permission_mode(mode);
                }
                if process.queue_message(message, attachments).await.is_ok() {
                    return Ok(Admission::Started(process));
                }
            }
            // Terminated leftovers are dropped and the session re-admitted.
            if let Some(stale) = self.unregister(process.process_id()) {
                stale.abort();
            }
        }

        if let Some((queue_id, position)) = self.queue.find_by_session(session_id) {
            return Ok(Admission::Queued(QueueTicket { queue_id, position, outcome: None }));
        }

        self.admit(AdmitRequest {
            kind: QueueKind::ResumeSession,
            project_id,
            project_path: project_path.to_path_buf(),
            session_id: Some(session_id.clone()),
            message: Some(PendingUserMessage {
                text: message.to_string(),
                attachments: attachments.to_vec(),
            }),
            permission_mode,
        })
        .await
    }

    // --- queries ---

    pub fn get_process(&self, process_id: &ProcessId) -> Option<Arc<Process<C>>> {
        self.registry.lock().processes.get(process_id).map(|entry| entry.process.clone())
    }

    pub fn find_by_session(&self, session_id: &SessionId) -> Option<Arc<Process<C>>> {
        let registry = self.registry.lock();
        let process_id = registry.by_session.get(session_id)?;
        registry.processes.get(process_id).map(|entry| entry.process.clone())
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let processes: Vec<Arc<Process<C>>> =
            self.registry.lock().processes.values().map(|entry| entry.process.clone()).collect();
        processes.iter().map(|process| process.summary()).collect()
    }

    /// Ownership as known to the pool. External attribution is layered on
    /// by the external session tracker.
    pub fn ownership(&self, session_id: &SessionId) -> Ownership {
        match self.find_by_session(session_id) {
            Some(process) if !process.is_terminated() => {
                let (permission_mode, mode_version) = process.permission_mode();
                Ownership::Owned {
                    process_id: process.process_id().clone(),
                    permission_mode,
                    mode_version,
                }
            }
            _ => Ownership::None,
        }
    }

    pub fn ever_owned(&self, session_id: &SessionId) -> bool {
        self.ever_owned.lock().contains(session_id)
    }

    pub fn worker_activity(&self) -> WorkerActivity {
        let active_workers = self.registry.lock().processes.len();
        let queue_length = self.queue.len();
        WorkerActivity {
            active_workers,
            queue_length,
            has_active_work: active_workers > 0 || queue_length > 0,
        }
    }

    // --- aborts and queue cancellation ---

    /// Abort a live Process. `session:aborted` is published before the
    /// abort reaches the agent so the external tracker can install its
    /// grace window ahead of the termination writes.
    pub async fn abort_process(
        &self,
        process_id: &ProcessId,
    ) -> Result<(), SupervisorError> {
        let process = self
            .get_process(process_id)
            .ok_or_else(|| SupervisorError::ProcessNotFound(process_id.clone()))?;
        self.bus.publish(Event::SessionAborted {
            session_id: process.session_id(),
            project_id: process.project_id().clone(),
        });
        process.abort();
        self.unregister(process_id);
        self.drain_queue().await;
        Ok(())
    }

    pub async fn abort_session(
        &self,
        session_id: &SessionId,
    ) -> Result<(), SupervisorError> {
        let process = self
            .find_by_session(session_id)
            .ok_or_else(|| SupervisorError::SessionNotFound(session_id.clone()))?;
        let process_id = process.process_id().clone();
        self.abort_process(&process_id).await
    }

    /// Cancel a queued admission.
    pub fn cancel_queued(&self, queue_id: &QueueId, reason: &str) -> bool {
        let cancelled = self.queue.cancel(queue_id, reason);
        if cancelled {
            self.publish_activity();
        }
        cancelled
    }

    /// Current 1-based position of a queued admission.
    pub fn queue_position(&self, queue_id: &QueueId) -> Option<usize> {
        self.queue.position(queue_id)
    }

    // --- admission internals (admission lock held) ---

    async fn admit(
        &self,
        request: AdmitRequest,
    ) -> Result<Admission<C>, SupervisorError> {
        if !self.at_capacity() {
            return Ok(Admission::Started(self.start_process(request).await?));
        }
        if let Some(victim) = self.preemption_candidate() {
            tracing::info!(
                process = %victim.process_id(),
                session = %victim.session_id(),
                "preempting idle worker",
            );
            self.bus.publish(Event::SessionAborted {
                session_id: victim.session_id(),
                project_id: victim.project_id().clone(),
            });
            victim.abort();
            self.unregister(victim.process_id());
            return Ok(Admission::Started(self.start_process(request).await?));
        }
        let enqueued = self.queue.enqueue(EnqueueRequest {
            kind: request.kind,
            project_id: request.project_id,
            project_path: request.project_path,
            session_id: request.session_id,
            message: request.message,
            permission_mode: request.permission_mode,
            enqueued_at_epoch_ms: self.clock.epoch_ms(),
        })?;
        self.publish_activity();
        Ok(Admission::Queued(QueueTicket {
            queue_id: enqueued.queue_id,
            position: enqueued.position,
            outcome: Some(enqueued.outcome),
        }))
    }

    async fn start_process(
        &self,
        request: AdmitRequest,
    ) -> Result<Arc<Process<C>>, SupervisorError> {
        let mode = request.permission_mode.unwrap_or(self.config.default_permission_mode);
        let initial = request.message.as_ref().map(|message| {
            let id = MessageId::generate();
            let text = normalized_user_text(&message.text, &message.attachments);
            (id, text)
        });
        let slot = ProcessSlot::new();
        let spec = LaunchSpec {
            cwd: request.project_path.clone(),
            initial_message: initial
                .as_ref()
                .map(|(id, text)| UserMessage { id: id.clone(), text: text.clone() }),
            resume_session_id: request.session_id.clone(),
            permission_mode: mode,
        };
        let handle = self
            .runtime
            .start(spec, slot.approval_fn())
            .await
            .map_err(SupervisorError::from_runtime)?;

        let process = Process::spawn(
            ProcessSeed {
                session_id: SessionId::provisional(),
                project_id: request.project_id,
                project_path: request.project_path,
                permission_mode: mode,
                idle_timeout: self.config.idle_timeout(),
                clock: self.clock.clone(),
                initial_echo: initial.map(|(id, text)| AgentMessage::user(&id, &text)),
                starts_running: request.message.is_some(),
            },
            handle,
        );
        slot.fill(process.clone());

        if matches!(request.kind, QueueKind::ResumeSession) {
            // Adopt the runtime-assigned id before registering so the
            // session map is keyed correctly from the start.
            process.wait_for_session_id(self.config.session_id_timeout()).await;
        }
        self.register(process.clone());
        Ok(process)
    }

    fn register(&self, process: Arc<Process<C>>) {
        let process_id = process.process_id().clone();
        let session_id = process.session_id();
        let weak = self.weak.clone();
        let subscription = process.subscribe({
            let process_id = process_id.clone();
            move |event| {
                if let Some(supervisor) = weak.upgrade() {
                    supervisor.on_process_event(&process_id, event);
                }
            }
        });
        let is_new = self.ever_owned.lock().insert(session_id.clone());
        {
            let mut registry = self.registry.lock();
            registry.by_session.insert(session_id.clone(), process_id.clone());
            registry
                .processes
                .insert(process_id.clone(), ProcessEntry { process: process.clone(), _subscription: subscription });
        }

        let summary = process.summary();
        if is_new {
            self.bus.publish(Event::SessionCreated { summary: summary.clone() });
        }
        let (permission_mode, mode_version) = process.permission_mode();
        self.bus.publish(Event::SessionStatusChanged {
            session_id: session_id.clone(),
            project_id: summary.project_id.clone(),
            ownership: Ownership::Owned { process_id, permission_mode, mode_version },
        });
        if matches!(summary.state, StateTag::Running | StateTag::WaitingInput) {
            self.bus.publish(Event::ProcessStateChanged {
                session_id,
                project_id: summary.project_id,
                state: summary.state,
            });
        }
        self.publish_activity();
    }

    /// Remove a Process from the registry, reporting lost ownership.
    fn unregister(&self, process_id: &ProcessId) -> Option<Arc<Process<C>>> {
        let (process, session_id) = {
            let mut registry = self.registry.lock();
            let entry = registry.processes.remove(process_id)?;
            let session_id = entry.process.session_id();
            if registry.by_session.get(&session_id).map_or(false, |id| id == process_id) {
                registry.by_session.remove(&session_id);
            }
            (entry.process, session_id)
        };
        self.bus.publish(Event::SessionStatusChanged {
            session_id,
            project_id: process.project_id().clone(),
            ownership: Ownership::None,
        });
        self.publish_activity();
        Some(process)
    }

    fn at_capacity(&self) -> bool {
        self.config.max_workers > 0
            && self.registry.lock().processes.len() >= self.config.max_workers
    }

    /// The longest-idle Process past the preemption threshold. `running`
    /// and `waiting-input` Processes are never candidates.
    fn preemption_candidate(&self) -> Option<Arc<Process<C>>> {
        let threshold = self.config.idle_preempt_threshold();
        let now = self.clock.now();
        let registry = self.registry.lock();
        registry
            .processes
            .values()
            .filter_map(|entry| {
                entry
                    .process
                    .idle_since()
                    .map(|since| (entry.process.clone(), now.saturating_duration_since(since)))
            })
            .filter(|(_, idle_for)| *idle_for >= threshold)
            .max_by_key(|(_, idle_for)| *idle_for)
            .map(|(process, _)| process)
    }

    // --- process event handling ---

    fn on_process_event(&self, process_id: &ProcessId, event: &ProcessEvent) {
        match event {
            ProcessEvent::StateChanged(tag) => self.on_state_changed(process_id, *tag),
            ProcessEvent::SessionChanged { previous, current } => {
                self.on_session_changed(process_id, previous, current);
            }
            ProcessEvent::Complete => {
                let Some(supervisor) = self.weak.upgrade() else {
                    return;
                };
                let process_id = process_id.clone();
                tokio::spawn(async move {
                    supervisor.dispose(&process_id).await;
                });
            }
            _ => {}
        }
    }

    fn on_state_changed(&self, process_id: &ProcessId, tag: StateTag) {
        if !matches!(tag, StateTag::Running | StateTag::WaitingInput) {
            return;
        }
        let Some(process) = self.get_process(process_id) else {
            return;
        };
        self.bus.publish(Event::ProcessStateChanged {
            session_id: process.session_id(),
            project_id: process.project_id().clone(),
            state: tag,
        });
    }

    /// Re-key the session map when the runtime-assigned id replaces the
    /// provisional one.
    fn on_session_changed(&self, process_id: &ProcessId, previous: &SessionId, current: &SessionId) {
        {
            let mut registry = self.registry.lock();
            if !registry.processes.contains_key(process_id) {
                return;
            }
            if registry.by_session.get(previous).map_or(false, |id| id == process_id) {
                registry.by_session.remove(previous);
            }
            registry.by_session.insert(current.clone(), process_id.clone());
        }
        self.ever_owned.lock().insert(current.clone());
        let Some(process) = self.get_process(process_id) else {
            return;
        };
        let (permission_mode, mode_version) = process.permission_mode();
        self.bus.publish(Event::SessionStatusChanged {
            session_id: current.clone(),
            project_id: process.project_id().clone(),
            ownership: Ownership::Owned {
                process_id: process_id.clone(),
                permission_mode,
                mode_version,
            },
        });
    }

    async fn dispose(&self, process_id: &ProcessId) {
        if let Some(process) = self.unregister(process_id) {
            // Covers idle-timeout completion, where the agent side is
            // still up; abort is a no-op when it already ran.
            process.abort();
        }
        self.drain_queue().await;
    }

    /// Start queued requests while capacity is available.
    async fn drain_queue(&self) {
        loop {
            let _guard = self.admission.lock().await;
            if self.at_capacity() {
                return;
            }
            let Some(entry) = self.queue.dequeue() else {
                return;
            };
            let queue_id = entry.id.clone();
            let session_id = entry.session_id.clone();
            let request = AdmitRequest {
                kind: entry.kind,
                project_id: entry.project_id.clone(),
                project_path: entry.project_path.clone(),
                session_id: entry.session_id.clone(),
                message: entry.message.clone(),
                permission_mode: entry.permission_mode,
            };
            match self.start_process(request).await {
                Ok(process) => {
                    self.bus.publish(Event::QueueRequestRemoved {
                        queue_id,
                        session_id,
                        reason: QueueRemovalReason::Started,
                    });
                    entry.resolve(QueueOutcome::Started {
                        process_id: process.process_id().clone(),
                    });
                }
                Err(error) => {
                    tracing::warn!(%error, "failed to start queued request");
                    self.bus.publish(Event::QueueRequestRemoved {
                        queue_id,
                        session_id,
                        reason: QueueRemovalReason::Cancelled,
                    });
                    entry.resolve(QueueOutcome::Cancelled { reason: error.to_string() });
                }
            }
            self.publish_activity();
        }
    }

    fn publish_activity(&self) {
        let activity = self.worker_activity();
        self.bus.publish(Event::WorkerActivityChanged {
            active_workers: activity.active_workers,
            queue_length: activity.queue_length,
            has_active_work: activity.has_active_work,
        });
    }
}

impl<R: AgentRuntime, C: Clock> crate::external::OwnershipProbe for Supervisor<R, C> {
    fn owns_session(&self, session_id: &SessionId) -> bool {
        self.find_by_session(session_id).map_or(false, |process| !process.is_terminated())
    }
}

/// Single-slot container breaking the construction-order cycle between a
/// Process and the approval callback its runtime needs at start time: the
/// callback captures the slot, and the slot is filled immediately after
/// the Process is constructed.
struct ProcessSlot<C: Clock> {
    cell: Arc<Mutex<Option<Arc<Process<C>>>>>,
}

impl<C: Clock> ProcessSlot<C> {
    fn new() -> Self {
        Self { cell: Arc::new(Mutex::new(None)) }
    }

    fn fill(&self, process: Arc<Process<C>>) {
        *self.cell.lock() = Some(process);
    }

    fn approval_fn(&self) -> ToolApprovalFn {
        let cell = self.cell.clone();
        Arc::new(move |call: ToolCall, cancel: CancellationToken| {
            let process = cell.lock().clone();
            let future: ApprovalFuture = Box::pin(async move {
                match process {
                    Some(process) => {
                        process.handle_tool_approval(&call.tool_name, call.input, cancel).await
                    }
                    None => ApprovalDecision::deny("session is still starting", false),
                }
            });
            future
        })
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
