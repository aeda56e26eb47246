// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory credential store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use wabridge_core::{
    BridgeError, CredentialStore, Credentials, HealthStatus, PluginAdapter, SessionId,
    StoredSession,
};

/// Keeps sessions in a map. `fail_next_clear` simulates a storage outage
/// during reset.
#[derive(Default)]
pub struct MemoryCredentialStore {
    sessions: Mutex<HashMap<SessionId, StoredSession>>,
    fail_clear: AtomicBool,
    clears: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate credentials, as if paired in an earlier run.
    pub fn seed(&self, session: &SessionId, phone: Option<&str>) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.clone(), StoredSession {
                session_id: session.clone(),
                credentials: Credentials::new(b"seeded-credentials".to_vec()),
                phone: phone.map(String::from),
                last_seen: None,
            });
    }

    pub fn contains(&self, session: &SessionId) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session)
    }

    pub fn fail_next_clear(&self) {
        self.fail_clear.store(true, Ordering::SeqCst);
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for MemoryCredentialStore {
    fn name(&self) -> &str {
        "memory-credentials"
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, session: &SessionId) -> Result<Option<StoredSession>, BridgeError> {
        Ok(self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session)
            .cloned())
    }

    async fn save(
        &self,
        session: &SessionId,
        credentials: &Credentials,
        phone: Option<&str>,
    ) -> Result<(), BridgeError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = sessions
            .entry(session.clone())
            .or_insert_with(|| StoredSession {
                session_id: session.clone(),
                credentials: credentials.clone(),
                phone: None,
                last_seen: None,
            });
        entry.credentials = credentials.clone();
        if let Some(phone) = phone {
            entry.phone = Some(phone.to_string());
        }
        Ok(())
    }

    async fn touch(&self, session: &SessionId, last_seen: DateTime<Utc>) -> Result<(), BridgeError> {
        if let Some(entry) = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(session)
        {
            entry.last_seen = Some(last_seen);
        }
        Ok(())
    }

    async fn clear(&self, session: &SessionId) -> Result<(), BridgeError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        if self.fail_clear.swap(false, Ordering::SeqCst) {
            return Err(BridgeError::Storage {
                source: "simulated storage failure".into(),
            });
        }
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_clear() {
        let store = MemoryCredentialStore::new();
        let sid = SessionId::from("default");
        assert!(store.load(&sid).await.unwrap().is_none());

        store
            .save(&sid, &Credentials::new(b"a".to_vec()), Some("4917"))
            .await
            .unwrap();
        store
            .save(&sid, &Credentials::new(b"b".to_vec()), None)
            .await
            .unwrap();
        let loaded = store.load(&sid).await.unwrap().unwrap();
        assert_eq!(loaded.credentials.as_bytes(), b"b");
        assert_eq!(loaded.phone.as_deref(), Some("4917"));

        store.fail_next_clear();
        assert!(store.clear(&sid).await.is_err());
        assert!(store.contains(&sid));
        store.clear(&sid).await.unwrap();
        assert!(!store.contains(&sid));
        assert_eq!(store.clears(), 2);
    }
}
