// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the `CredentialStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use wabridge_core::{
    BridgeError, CredentialStore, Credentials, HealthStatus, PluginAdapter, SessionId,
    StoredSession,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed credential store.
#[derive(Clone)]
pub struct SqliteCredentialStore {
    db: Database,
}

impl SqliteCredentialStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens the database at `path` and wraps it.
    pub async fn open(path: &str) -> Result<Self, BridgeError> {
        Ok(Self::new(Database::open(path).await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Sessions that have persisted credentials.
    pub async fn session_ids(&self) -> Result<Vec<SessionId>, BridgeError> {
        queries::sessions::list_session_ids(&self.db).await
    }
}

#[async_trait]
impl PluginAdapter for SqliteCredentialStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self, session: &SessionId) -> Result<Option<StoredSession>, BridgeError> {
        queries::sessions::get_session(&self.db, session).await
    }

    async fn save(
        &self,
        session: &SessionId,
        credentials: &Credentials,
        phone: Option<&str>,
    ) -> Result<(), BridgeError> {
        queries::sessions::upsert_credentials(&self.db, session, credentials, phone).await?;
        debug!(session_id = %session, "credentials persisted");
        Ok(())
    }

    async fn touch(
        &self,
        session: &SessionId,
        last_seen: DateTime<Utc>,
    ) -> Result<(), BridgeError> {
        queries::sessions::touch(&self.db, session, last_seen).await
    }

    async fn clear(&self, session: &SessionId) -> Result<(), BridgeError> {
        let existed = queries::sessions::delete_session(&self.db, session).await?;
        debug!(session_id = %session, existed, "credentials wiped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteCredentialStore {
        SqliteCredentialStore::new(Database::open_in_memory().await.expect("in-memory db"))
    }

    #[tokio::test]
    async fn save_load_clear() {
        let store = store().await;
        let sid = SessionId::from("home");

        assert!(store.load(&sid).await.unwrap().is_none());

        let creds = Credentials::new(vec![1, 2, 3, 4]);
        store.save(&sid, &creds, Some("491701234567")).await.unwrap();

        let loaded = store.load(&sid).await.unwrap().expect("stored");
        assert_eq!(loaded.credentials, creds);
        assert_eq!(loaded.phone.as_deref(), Some("491701234567"));
        assert!(loaded.last_seen.is_some());

        store.clear(&sid).await.unwrap();
        assert!(store.load(&sid).await.unwrap().is_none());
        // Clearing twice is fine.
        store.clear(&sid).await.unwrap();
    }

    #[tokio::test]
    async fn resave_keeps_known_phone() {
        let store = store().await;
        let sid = SessionId::from("home");
        store
            .save(&sid, &Credentials::new(vec![1]), Some("4917"))
            .await
            .unwrap();
        store
            .save(&sid, &Credentials::new(vec![2]), None)
            .await
            .unwrap();

        let loaded = store.load(&sid).await.unwrap().expect("stored");
        assert_eq!(loaded.credentials.as_bytes(), &[2]);
        assert_eq!(loaded.phone.as_deref(), Some("4917"));
    }

    #[tokio::test]
    async fn touch_updates_last_seen() {
        let store = store().await;
        let sid = SessionId::from("home");
        store.save(&sid, &Credentials::new(vec![9]), None).await.unwrap();

        let when = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        store.touch(&sid, when).await.unwrap();
        assert_eq!(store.load(&sid).await.unwrap().unwrap().last_seen, Some(when));

        // Unknown sessions are ignored.
        store.touch(&SessionId::from("ghost"), when).await.unwrap();
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/wabridge.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteCredentialStore::open(path).await.unwrap();
            store
                .save(&SessionId::from("a"), &Credentials::new(vec![7]), None)
                .await
                .unwrap();
            store.database().checkpoint().await.unwrap();
        }

        let store = SqliteCredentialStore::open(path).await.unwrap();
        assert_eq!(store.session_ids().await.unwrap(), vec![SessionId::from("a")]);
        assert!(store.health_check().await.is_ok());
    }
}
