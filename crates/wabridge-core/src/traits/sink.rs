// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Downstream subscriber of buffered inbound events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{InboundEvent, SessionId};

/// Receives every event appended to an event buffer.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Hands an event over. Must return without waiting on I/O.
    fn deliver(&self, event: Arc<InboundEvent>);

    /// Waits until nothing queued for `session` is pending, or the timeout
    /// elapses. Returns `true` when fully drained.
    async fn flush(&self, session: &SessionId, timeout: Duration) -> bool;
}
