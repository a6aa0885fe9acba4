//! Session persistence.
//!
//! The engine talks to persistence only through [`SessionStore`]; it never
//! assumes a concrete backend. [`SqliteStore`] is the on-disk default,
//! [`MemoryStore`] backs tests and ephemeral runs.

pub mod config;
pub mod memory;
pub mod sqlite;

pub use config::Config;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::StoreError;
use crate::session::{NewSession, SessionPatch, SessionRecord};

/// Narrow CRUD interface over the one-active-session-per-user table.
///
/// Implementations enforce the single-active-session invariant:
/// [`list_active`](SessionStore::list_active) fails with
/// [`StoreError::MultipleActiveSessions`] rather than returning a violating
/// result set, and [`create`](SessionStore::create) is idempotent — if an
/// active session already exists for the user it is returned instead of a
/// second row being inserted.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All sessions with state `focus` or `break` for the user.
    async fn list_active(&self, user_id: i64) -> Result<Vec<SessionRecord>, StoreError>;

    /// Insert a new session, or return the pre-existing active one.
    async fn create(&self, new_session: NewSession) -> Result<SessionRecord, StoreError>;

    /// Apply a partial update. Returns `None` when no such id exists.
    async fn update(
        &self,
        id: i64,
        patch: SessionPatch,
    ) -> Result<Option<SessionRecord>, StoreError>;

    /// Remove a session. Deleting an unknown id is not an error.
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

/// Returns `~/.config/focal[-dev]/` based on FOCAL_ENV.
///
/// Set FOCAL_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FOCAL_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("focal-dev")
    } else {
        base_dir.join("focal")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
