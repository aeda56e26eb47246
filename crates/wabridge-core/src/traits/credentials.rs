// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence seam for linked-device credentials.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BridgeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Credentials, SessionId};

/// A persisted session row.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub session_id: SessionId,
    pub credentials: Credentials,
    pub phone: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Credential storage. Only the session manager writes through this trait.
#[async_trait]
pub trait CredentialStore: PluginAdapter {
    async fn load(&self, session: &SessionId) -> Result<Option<StoredSession>, BridgeError>;

    async fn save(
        &self,
        session: &SessionId,
        credentials: &Credentials,
        phone: Option<&str>,
    ) -> Result<(), BridgeError>;

    /// Records the last time the transport produced any event.
    async fn touch(&self, session: &SessionId, last_seen: DateTime<Utc>)
    -> Result<(), BridgeError>;

    /// Wipes the credentials. Clearing a missing session is not an error.
    async fn clear(&self, session: &SessionId) -> Result<(), BridgeError>;
}
