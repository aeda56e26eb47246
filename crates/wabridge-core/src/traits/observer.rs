// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle notifications.

use async_trait::async_trait;

use crate::types::SessionId;

/// Components holding per-session state register one of these with the
/// session manager.
#[async_trait]
pub trait SessionObserver: Send + Sync + 'static {
    /// Called during `reset()` after credentials are wiped and before the
    /// session reports `Unpaired`. Implementations must drop all state tied
    /// to the old pairing before returning.
    async fn session_reset(&self, session: &SessionId);

    /// Upstream revoked the linked device.
    async fn session_logged_out(&self, session: &SessionId);
}
