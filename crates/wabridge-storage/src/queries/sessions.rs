// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session credential CRUD operations.

use chrono::{DateTime, Utc};
use rusqlite::params;
use wabridge_core::{BridgeError, Credentials, SessionId, StoredSession};

use crate::database::{Database, map_tr_err};

fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Insert or replace the credentials of a session.
pub async fn upsert_credentials(
    db: &Database,
    session: &SessionId,
    credentials: &Credentials,
    phone: Option<&str>,
) -> Result<(), BridgeError> {
    let id = session.0.clone();
    let blob = credentials.as_bytes().to_vec();
    let phone = phone.map(str::to_string);
    let now = Utc::now().to_rfc3339();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (session_id, credentials, phone, last_seen, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?4)
                 ON CONFLICT(session_id) DO UPDATE SET
                     credentials = excluded.credentials,
                     phone = COALESCE(excluded.phone, sessions.phone),
                     last_seen = excluded.last_seen,
                     updated_at = excluded.updated_at",
                params![id, blob, phone, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a session by id.
pub async fn get_session(
    db: &Database,
    session: &SessionId,
) -> Result<Option<StoredSession>, BridgeError> {
    let id = session.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, credentials, phone, last_seen
                 FROM sessions WHERE session_id = ?1",
            )?;
            let result = stmt.query_row(params![id], |row| {
                Ok(StoredSession {
                    session_id: SessionId(row.get(0)?),
                    credentials: Credentials::new(row.get(1)?),
                    phone: row.get(2)?,
                    last_seen: parse_ts(row.get(3)?),
                })
            });
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List the ids of all sessions with stored credentials.
pub async fn list_session_ids(db: &Database) -> Result<Vec<SessionId>, BridgeError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare("SELECT session_id FROM sessions ORDER BY created_at")?;
            let rows = stmt.query_map([], |row| Ok(SessionId(row.get(0)?)))?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Record the last-seen timestamp. A missing session is ignored.
pub async fn touch(
    db: &Database,
    session: &SessionId,
    last_seen: DateTime<Utc>,
) -> Result<(), BridgeError> {
    let id = session.0.clone();
    let ts = last_seen.to_rfc3339();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET last_seen = ?2 WHERE session_id = ?1",
                params![id, ts],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a session's credentials. Returns whether a row existed.
pub async fn delete_session(db: &Database, session: &SessionId) -> Result<bool, BridgeError> {
    let id = session.0.clone();
    db.connection()
        .call(move |conn| {
            let n = conn.execute("DELETE FROM sessions WHERE session_id = ?1", params![id])?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}
