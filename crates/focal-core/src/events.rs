use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionState;
use crate::timer::EnginePhase;

/// Every state change in the engine produces an Event.
/// The presentation adapter polls for these; commands return the one they
/// produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A fresh focus session was created in the store.
    SessionStarted {
        session_id: i64,
        user_id: i64,
        planned_minutes: i64,
        focus_end_time: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// An existing active session was adopted at initialization.
    SessionAdopted {
        session_id: i64,
        user_id: i64,
        session_state: SessionState,
        at: DateTime<Utc>,
    },
    BreakStarted {
        session_id: i64,
        break_end_time: DateTime<Utc>,
        break_minutes_remaining: i64,
        at: DateTime<Utc>,
    },
    /// An already-running break was extended from its current deadline.
    BreakExtended {
        session_id: i64,
        break_end_time: DateTime<Utc>,
        break_minutes_remaining: i64,
        at: DateTime<Utc>,
    },
    /// Back in the focus phase, by command or by break expiry.
    FocusResumed {
        session_id: i64,
        seconds_remaining: i64,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        session_id: i64,
        total_minutes_done: i64,
        /// Floored to the nearest 15-minute step, for the summary display.
        total_minutes_done_rounded: i64,
        at: DateTime<Utc>,
    },
    SessionDiscarded {
        session_id: i64,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        phase: EnginePhase,
        seconds_remaining: i64,
        seconds_elapsed: i64,
        /// `seconds_remaining` formatted as `hh:mm:ss`.
        clock: String,
        break_minutes_remaining: i64,
        planned_minutes: i64,
        is_completed: bool,
        total_minutes_done_rounded: Option<i64>,
        at: DateTime<Utc>,
    },
}
