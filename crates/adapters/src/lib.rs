// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! parley-adapters: contracts between the supervisor core and agent runtimes
//!
//! An agent runtime owns the actual command-line agent: it spawns it, feeds
//! it user turns, streams back its structured output, and calls in for tool
//! approvals. This crate names those contracts; the supervisor consumes
//! them without knowing which runtime is behind them.

pub mod runtime;
pub mod sink;

pub use runtime::{
    AgentHandle, AgentRuntime, AgentRuntimeError, ApprovalFuture, LaunchSpec, MessageStream,
    StopHandle, StreamError, ToolApprovalFn, ToolCall, UserMessage,
};
pub use sink::{ChannelSink, MessageSink, SinkReceiver};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAgentRuntime, FakeSession};
