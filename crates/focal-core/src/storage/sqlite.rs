//! SQLite-backed session store.
//!
//! One row per session, timestamps stored as RFC 3339 text. The schema is
//! created on open. The connection lives behind a mutex so the store can be
//! shared across the engine and the tick runner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, Row};
use std::sync::{Mutex, MutexGuard};

use super::{data_dir, SessionStore};
use crate::error::StoreError;
use crate::session::{NewSession, SessionPatch, SessionRecord, SessionState};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the store at `~/.config/focal/focal.db`, creating the schema if
    /// needed.
    pub fn open() -> Result<Self, StoreError> {
        let path = data_dir()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .join("focal.db");
        Self::open_at(&path)
    }

    /// Open the store at an explicit path.
    pub fn open_at(path: &std::path::Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory store (tests, ephemeral runs).
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".into()))
    }
}

fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id                 INTEGER NOT NULL,
            session_state           TEXT NOT NULL,
            focus_start_time        TEXT NOT NULL,
            focus_end_time          TEXT NOT NULL,
            break_start_time        TEXT,
            break_end_time          TEXT,
            break_minutes_remaining INTEGER NOT NULL,
            planned_minutes         INTEGER NOT NULL,
            total_minutes_done      INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user_state
            ON sessions(user_id, session_state);",
    )
}

const COLUMNS: &str = "id, user_id, session_state, focus_start_time, focus_end_time, \
                       break_start_time, break_end_time, break_minutes_remaining, \
                       planned_minutes, total_minutes_done";

fn parse_ts(idx: usize, text: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn row_to_record(row: &Row<'_>) -> Result<SessionRecord, rusqlite::Error> {
    let state_text: String = row.get(2)?;
    let session_state = SessionState::parse(&state_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown session_state '{state_text}'").into(),
        )
    })?;
    let focus_start: String = row.get(3)?;
    let focus_end: String = row.get(4)?;
    let break_start: Option<String> = row.get(5)?;
    let break_end: Option<String> = row.get(6)?;
    Ok(SessionRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_state,
        focus_start_time: parse_ts(3, &focus_start)?,
        focus_end_time: parse_ts(4, &focus_end)?,
        break_start_time: break_start.as_deref().map(|t| parse_ts(5, t)).transpose()?,
        break_end_time: break_end.as_deref().map(|t| parse_ts(6, t)).transpose()?,
        break_minutes_remaining: row.get(7)?,
        planned_minutes: row.get(8)?,
        total_minutes_done: row.get(9)?,
    })
}

fn active_sessions(
    conn: &Connection,
    user_id: i64,
) -> Result<Vec<SessionRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM sessions
         WHERE user_id = ?1 AND session_state IN ('focus', 'break')
         ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![user_id], row_to_record)?;
    rows.collect()
}

fn get_session(conn: &Connection, id: i64) -> Result<Option<SessionRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM sessions WHERE id = ?1"))?;
    let mut rows = stmt.query_map(params![id], row_to_record)?;
    rows.next().transpose()
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn list_active(&self, user_id: i64) -> Result<Vec<SessionRecord>, StoreError> {
        let conn = self.lock()?;
        let active = active_sessions(&conn, user_id)?;
        if active.len() > 1 {
            return Err(StoreError::MultipleActiveSessions {
                user_id,
                count: active.len(),
            });
        }
        Ok(active)
    }

    async fn create(&self, new_session: NewSession) -> Result<SessionRecord, StoreError> {
        let mut conn = self.lock()?;
        // The existence re-check and the insert share one transaction, so two
        // writers cannot both observe "no active session" and insert.
        let tx = conn.transaction()?;
        let existing = active_sessions(&tx, new_session.user_id)?;
        if let Some(record) = existing.into_iter().next() {
            tx.commit()?;
            return Ok(record);
        }
        tx.execute(
            "INSERT INTO sessions (user_id, session_state, focus_start_time, focus_end_time,
                                   break_start_time, break_end_time, break_minutes_remaining,
                                   planned_minutes, total_minutes_done)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)",
            params![
                new_session.user_id,
                new_session.session_state.as_str(),
                new_session.focus_start_time.to_rfc3339(),
                new_session.focus_end_time.to_rfc3339(),
                new_session.break_start_time.map(|t| t.to_rfc3339()),
                new_session.break_end_time.map(|t| t.to_rfc3339()),
                new_session.break_minutes_remaining,
                new_session.planned_minutes,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(new_session.into_record(id))
    }

    async fn update(
        &self,
        id: i64,
        patch: SessionPatch,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let conn = self.lock()?;
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(state) = patch.session_state {
            values.push(Box::new(state.as_str()));
            sets.push(format!("session_state = ?{}", values.len()));
        }
        if let Some(start) = patch.break_start_time {
            values.push(Box::new(start.to_rfc3339()));
            sets.push(format!("break_start_time = ?{}", values.len()));
        }
        if let Some(end) = patch.break_end_time {
            values.push(Box::new(end.to_rfc3339()));
            sets.push(format!("break_end_time = ?{}", values.len()));
        }
        if let Some(budget) = patch.break_minutes_remaining {
            values.push(Box::new(budget));
            sets.push(format!("break_minutes_remaining = ?{}", values.len()));
        }
        if let Some(total) = patch.total_minutes_done {
            values.push(Box::new(total));
            sets.push(format!("total_minutes_done = ?{}", values.len()));
        }

        if !sets.is_empty() {
            values.push(Box::new(id));
            let sql = format!(
                "UPDATE sessions SET {} WHERE id = ?{}",
                sets.join(", "),
                values.len()
            );
            let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
            conn.execute(&sql, params.as_slice())?;
        }

        Ok(get_session(&conn, id)?)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_session(user_id: i64) -> NewSession {
        NewSession::focus(user_id, Utc::now(), 180, 30)
    }

    #[tokio::test]
    async fn create_then_list_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let created = store.create(new_session(1)).await.unwrap();
        let active = store.list_active(1).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, created.id);
        assert_eq!(active[0].session_state, SessionState::Focus);
        assert_eq!(active[0].break_minutes_remaining, 30);
        // RFC 3339 text survives with second precision or better.
        assert!(
            (active[0].focus_start_time - created.focus_start_time)
                .num_seconds()
                .abs()
                < 1
        );
    }

    #[tokio::test]
    async fn create_adopts_existing_active_row() {
        let store = SqliteStore::open_memory().unwrap();
        let first = store.create(new_session(1)).await.unwrap();
        let second = store.create(new_session(1)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_active(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn users_do_not_share_the_active_slot() {
        let store = SqliteStore::open_memory().unwrap();
        let a = store.create(new_session(1)).await.unwrap();
        let b = store.create(new_session(2)).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn two_active_rows_is_an_integrity_error() {
        let store = SqliteStore::open_memory().unwrap();
        store.create(new_session(1)).await.unwrap();
        {
            // Bypass the idempotent create to fabricate the violation.
            let conn = store.lock().unwrap();
            let now = Utc::now();
            conn.execute(
                "INSERT INTO sessions (user_id, session_state, focus_start_time, focus_end_time,
                                       break_minutes_remaining, planned_minutes)
                 VALUES (1, 'focus', ?1, ?2, 30, 180)",
                params![
                    now.to_rfc3339(),
                    (now + Duration::minutes(180)).to_rfc3339()
                ],
            )
            .unwrap();
        }
        match store.list_active(1).await {
            Err(StoreError::MultipleActiveSessions { user_id: 1, count: 2 }) => {}
            other => panic!("expected MultipleActiveSessions, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_applies_partial_fields() {
        let store = SqliteStore::open_memory().unwrap();
        let rec = store.create(new_session(1)).await.unwrap();
        let now = Utc::now();
        let updated = store
            .update(
                rec.id,
                SessionPatch {
                    session_state: Some(SessionState::Break),
                    break_start_time: Some(now),
                    break_end_time: Some(now + Duration::minutes(5)),
                    break_minutes_remaining: Some(25),
                    total_minutes_done: None,
                },
            )
            .await
            .unwrap()
            .expect("row exists");
        assert_eq!(updated.session_state, SessionState::Break);
        assert_eq!(updated.break_minutes_remaining, 25);
        assert!(updated.break_end_time.is_some());
        assert_eq!(updated.planned_minutes, 180);
    }

    #[tokio::test]
    async fn update_unknown_id_returns_none() {
        let store = SqliteStore::open_memory().unwrap();
        let result = store
            .update(
                404,
                SessionPatch {
                    session_state: Some(SessionState::Complete),
                    ..SessionPatch::default()
                },
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = SqliteStore::open_memory().unwrap();
        let rec = store.create(new_session(1)).await.unwrap();
        store.delete(rec.id).await.unwrap();
        store.delete(rec.id).await.unwrap();
        assert!(store.list_active(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_patch_still_returns_current_row() {
        let store = SqliteStore::open_memory().unwrap();
        let rec = store.create(new_session(1)).await.unwrap();
        let fetched = store
            .update(rec.id, SessionPatch::default())
            .await
            .unwrap()
            .expect("row exists");
        assert_eq!(fetched.id, rec.id);
        assert_eq!(fetched.session_state, SessionState::Focus);
    }
}
