//! In-memory session store.
//!
//! Backs the engine's unit tests and the two-instance race tests; also usable
//! for ephemeral runs where nothing should touch the disk.

use async_trait::async_trait;
use std::sync::Mutex;

use super::SessionStore;
use crate::error::StoreError;
use crate::session::{NewSession, SessionPatch, SessionRecord};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: Vec<SessionRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held, active or not.
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot a row by id, for test assertions.
    pub fn get(&self, id: i64) -> Option<SessionRecord> {
        self.lock()
            .ok()
            .and_then(|inner| inner.rows.iter().find(|r| r.id == id).cloned())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".into()))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn list_active(&self, user_id: i64) -> Result<Vec<SessionRecord>, StoreError> {
        let inner = self.lock()?;
        let active: Vec<SessionRecord> = inner
            .rows
            .iter()
            .filter(|r| r.user_id == user_id && r.is_active())
            .cloned()
            .collect();
        if active.len() > 1 {
            return Err(StoreError::MultipleActiveSessions {
                user_id,
                count: active.len(),
            });
        }
        Ok(active)
    }

    async fn create(&self, new_session: NewSession) -> Result<SessionRecord, StoreError> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner
            .rows
            .iter()
            .find(|r| r.user_id == new_session.user_id && r.is_active())
        {
            return Ok(existing.clone());
        }
        inner.next_id += 1;
        let record = new_session.into_record(inner.next_id);
        inner.rows.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: i64,
        patch: SessionPatch,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let mut inner = self.lock()?;
        match inner.rows.iter_mut().find(|r| r.id == id) {
            Some(row) => {
                patch.apply_to(row);
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.rows.retain(|r| r.id != id);
        Ok(())
    }
}
