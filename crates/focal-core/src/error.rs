//! Error types for focal-core.
//!
//! Each concern carries its own thiserror enum; the engine maps store
//! failures into its own taxonomy at the command boundary so callers see a
//! single error surface.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by a [`SessionStore`](crate::store::SessionStore)
/// implementation.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The backing store could not be reached or a query failed.
    /// Recoverable: the caller decides whether to retry.
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    /// More than one active session exists for a user. A data-integrity
    /// violation, never silently repaired.
    #[error("{count} active sessions found for user {user_id}, expected at most one")]
    MultipleActiveSessions { user_id: i64, count: usize },
}

/// Failures surfaced by the [`TimerEngine`](crate::timer::TimerEngine)
/// command boundary.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// The session store failed; in-memory engine state is preserved.
    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),

    /// Store integrity violation: more than one active session per user.
    #[error("{count} active sessions found for user {user_id}, expected at most one")]
    MultipleActiveSessions { user_id: i64, count: usize },

    /// An adopted record is internally inconsistent (e.g. break state
    /// without break timestamps). Fatal to this engine instance.
    #[error("corrupt session {id}: {reason}")]
    CorruptSession { id: i64, reason: String },

    /// A record's state requires a timestamp field that is absent. Signals
    /// a store-contract violation upstream.
    #[error("session {id} is missing {field}")]
    MissingTimestamp { id: i64, field: &'static str },

    /// Not enough break budget for another break increment. An expected
    /// user-facing condition, not a fault.
    #[error("insufficient break budget: {remaining} of {required} minutes remaining")]
    InsufficientBreakBudget { remaining: i64, required: i64 },

    /// A command was issued with no active session (before `initialize` or
    /// after `discard`).
    #[error("no active session")]
    NoActiveSession,

    /// A mutating command was issued after the session completed.
    #[error("session is already complete")]
    SessionComplete,
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => EngineError::StoreUnavailable(message),
            StoreError::MultipleActiveSessions { user_id, count } => {
                EngineError::MultipleActiveSessions { user_id, count }
            }
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Configuration load/save errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot resolve configuration directory: {0}")]
    DataDir(String),

    #[error("failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("unknown configuration key: {0}")]
    UnknownKey(String),
}
