// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-side message queue abstraction.
//!
//! The queue is specified by its operations only: `push` appends a user
//! turn and returns its 1-based position, `depth` reports how many turns
//! the agent has not yet consumed. [`ChannelSink`] is the channel-backed
//! implementation runtimes hand to the supervisor.

use crate::runtime::UserMessage;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Write side of an agent's user-turn queue.
#[async_trait]
pub trait MessageSink: Send + Sync + 'static {
    /// Append a message; returns its 1-based queue position.
    async fn push(&self, message: UserMessage) -> usize;

    /// Number of messages not yet consumed by the agent.
    fn depth(&self) -> usize;
}

/// Channel-backed sink. The agent side drains through [`SinkReceiver`].
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<UserMessage>,
    depth: Arc<AtomicUsize>,
}

/// Agent-side read half of a [`ChannelSink`].
pub struct SinkReceiver {
    rx: mpsc::UnboundedReceiver<UserMessage>,
    depth: Arc<AtomicUsize>,
}

impl ChannelSink {
    pub fn channel() -> (Arc<ChannelSink>, SinkReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(ChannelSink { tx, depth: depth.clone() }),
            SinkReceiver { rx, depth },
        )
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn push(&self, message: UserMessage) -> usize {
        if self.tx.send(message).is_err() {
            // Receiver gone: the agent is shutting down. The message is
            // dropped; the caller learns through the stream ending.
            return self.depth.load(Ordering::SeqCst);
        }
        self.depth.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

impl SinkReceiver {
    /// Wait for the next queued turn. Returns `None` once all senders are
    /// dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<UserMessage> {
        let message = self.rx.recv().await;
        if message.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        message
    }

    /// Drain without waiting.
    pub fn try_recv(&mut self) -> Option<UserMessage> {
        match self.rx.try_recv() {
            Ok(message) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Some(message)
            }
            Err(_) => None,
        }
    }
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
