//! The persisted session record and its partial-update form.
//!
//! Field names and the `focus`/`break`/`complete` state strings are the wire
//! contract shared with the persistence layer and must not drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Phase of a persisted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Focus,
    Break,
    Complete,
}

impl SessionState {
    /// Active means the session still owns the user's "one active session"
    /// slot: focus or break, not complete.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Focus | SessionState::Break)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Focus => "focus",
            SessionState::Break => "break",
            SessionState::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "focus" => Some(SessionState::Focus),
            "break" => Some(SessionState::Break),
            "complete" => Some(SessionState::Complete),
            _ => None,
        }
    }
}

/// One session row. The store assigns `id`; everything else is owned by the
/// engine's lifecycle rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub user_id: i64,
    pub session_state: SessionState,
    pub focus_start_time: DateTime<Utc>,
    pub focus_end_time: DateTime<Utc>,
    pub break_start_time: Option<DateTime<Utc>>,
    pub break_end_time: Option<DateTime<Utc>>,
    /// Remaining break budget, a multiple of the break increment.
    pub break_minutes_remaining: i64,
    /// Originally planned focus duration, kept for reporting.
    pub planned_minutes: i64,
    /// Actual focus minutes accrued; set exactly once, on completion.
    pub total_minutes_done: Option<i64>,
}

impl SessionRecord {
    pub fn is_active(&self) -> bool {
        self.session_state.is_active()
    }

    /// The start/end timestamps governing the current phase.
    ///
    /// A break-state record without break timestamps violates the store
    /// contract; a complete record reports its focus window.
    pub fn phase_window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), EngineError> {
        match self.session_state {
            SessionState::Break => {
                let start = self.break_start_time.ok_or(EngineError::MissingTimestamp {
                    id: self.id,
                    field: "break_start_time",
                })?;
                let end = self.break_end_time.ok_or(EngineError::MissingTimestamp {
                    id: self.id,
                    field: "break_end_time",
                })?;
                Ok((start, end))
            }
            SessionState::Focus | SessionState::Complete => {
                Ok((self.focus_start_time, self.focus_end_time))
            }
        }
    }

    /// Integrity check run before the engine adopts a stored record.
    pub fn validate_adoptable(&self) -> Result<(), EngineError> {
        if self.session_state == SessionState::Break
            && (self.break_start_time.is_none() || self.break_end_time.is_none())
        {
            return Err(EngineError::CorruptSession {
                id: self.id,
                reason: "break state without break timestamps".into(),
            });
        }
        if self.break_minutes_remaining < 0 {
            return Err(EngineError::CorruptSession {
                id: self.id,
                reason: format!(
                    "negative break budget ({})",
                    self.break_minutes_remaining
                ),
            });
        }
        Ok(())
    }
}

/// A session record before the store has assigned an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub user_id: i64,
    pub session_state: SessionState,
    pub focus_start_time: DateTime<Utc>,
    pub focus_end_time: DateTime<Utc>,
    pub break_start_time: Option<DateTime<Utc>>,
    pub break_end_time: Option<DateTime<Utc>>,
    pub break_minutes_remaining: i64,
    pub planned_minutes: i64,
}

impl NewSession {
    /// A fresh focus session starting now.
    pub fn focus(
        user_id: i64,
        now: DateTime<Utc>,
        planned_minutes: i64,
        break_budget_minutes: i64,
    ) -> Self {
        Self {
            user_id,
            session_state: SessionState::Focus,
            focus_start_time: now,
            focus_end_time: crate::clock::add_minutes(now, planned_minutes),
            break_start_time: None,
            break_end_time: None,
            break_minutes_remaining: break_budget_minutes,
            planned_minutes,
        }
    }

    /// Materialize with a store-assigned id.
    pub fn into_record(self, id: i64) -> SessionRecord {
        SessionRecord {
            id,
            user_id: self.user_id,
            session_state: self.session_state,
            focus_start_time: self.focus_start_time,
            focus_end_time: self.focus_end_time,
            break_start_time: self.break_start_time,
            break_end_time: self.break_end_time,
            break_minutes_remaining: self.break_minutes_remaining,
            planned_minutes: self.planned_minutes,
            total_minutes_done: None,
        }
    }
}

/// Partial update applied through [`SessionStore::update`](crate::store::SessionStore::update).
///
/// Absent fields are left untouched by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_state: Option<SessionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_minutes_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_minutes_done: Option<i64>,
}

impl SessionPatch {
    pub fn is_empty(&self) -> bool {
        self.session_state.is_none()
            && self.break_start_time.is_none()
            && self.break_end_time.is_none()
            && self.break_minutes_remaining.is_none()
            && self.total_minutes_done.is_none()
    }

    /// Fold `later` into `self`; fields present in `later` win.
    pub fn merge(&mut self, later: SessionPatch) {
        if later.session_state.is_some() {
            self.session_state = later.session_state;
        }
        if later.break_start_time.is_some() {
            self.break_start_time = later.break_start_time;
        }
        if later.break_end_time.is_some() {
            self.break_end_time = later.break_end_time;
        }
        if later.break_minutes_remaining.is_some() {
            self.break_minutes_remaining = later.break_minutes_remaining;
        }
        if later.total_minutes_done.is_some() {
            self.total_minutes_done = later.total_minutes_done;
        }
    }

    /// Apply the present fields to `record` in place.
    pub fn apply_to(&self, record: &mut SessionRecord) {
        if let Some(state) = self.session_state {
            record.session_state = state;
        }
        if let Some(start) = self.break_start_time {
            record.break_start_time = Some(start);
        }
        if let Some(end) = self.break_end_time {
            record.break_end_time = Some(end);
        }
        if let Some(budget) = self.break_minutes_remaining {
            record.break_minutes_remaining = budget;
        }
        if let Some(total) = self.total_minutes_done {
            record.total_minutes_done = Some(total);
        }
    }
}
