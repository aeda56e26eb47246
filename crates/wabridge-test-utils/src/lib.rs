// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for wabridge integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without a protocol sidecar.
//!
//! # Components
//!
//! - [`MockTransport`] - scripted transport with pairing, drop and logout simulation
//! - [`MemoryCredentialStore`] - in-memory credential store
//! - [`RecordingSink`] - event sink capturing everything the pipeline delivers
//! - [`TestHarness`] - fully wired accounts over the mocks

pub mod harness;
pub mod memory_store;
pub mod mock_transport;
pub mod recording_sink;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use memory_store::MemoryCredentialStore;
pub use mock_transport::{MockTransport, SendScript, SentMessage, raw_media, raw_text};
pub use recording_sink::RecordingSink;
