//! Session timing engine.
//!
//! The engine is a wall-clock-based state machine: every derived value is
//! recomputed from the absolute timestamps stored on the session record, so
//! the displayed time survives process restarts, clock drift, and missed
//! ticks. It does not schedule itself - the caller (normally
//! [`TickRunner`](super::TickRunner)) invokes `tick()` once per second.
//!
//! ## State transitions
//!
//! ```text
//! Uninitialized -> Focus <-> Break
//!                    |
//!                    v
//!                 Complete   (terminal; discard returns to Uninitialized)
//! ```
//!
//! Persistence-mutating commands (`take_break`, `return_to_focus`,
//! `complete`, `discard`) are async and await the store. The tick path stays
//! synchronous: writes caused by phase expiry are spawned onto the runtime
//! and never awaited inside the tick.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock;
use crate::error::EngineError;
use crate::events::Event;
use crate::session::{NewSession, SessionPatch, SessionRecord, SessionState};
use crate::storage::SessionStore;

/// Timer durations, in minutes. Serde-defaulted so the TOML config may omit
/// any field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Length of the focus phase, fixed at session creation.
    #[serde(default = "default_planned_focus")]
    pub planned_focus_minutes: i64,
    /// Total break allowance per session. Must be a multiple of the
    /// increment.
    #[serde(default = "default_break_budget")]
    pub break_budget_minutes: i64,
    /// Length of one break slice, and what each slice costs from the budget.
    #[serde(default = "default_break_increment")]
    pub break_increment_minutes: i64,
}

fn default_planned_focus() -> i64 {
    180
}
fn default_break_budget() -> i64 {
    30
}
fn default_break_increment() -> i64 {
    5
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            planned_focus_minutes: default_planned_focus(),
            break_budget_minutes: default_break_budget(),
            break_increment_minutes: default_break_increment(),
        }
    }
}

/// Engine phase as observed by the presentation adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnginePhase {
    Uninitialized,
    Focus,
    Break,
    Complete,
}

/// The session state machine.
///
/// Owns the in-memory mirror of the active session; all mutation goes
/// through the command methods below.
pub struct TimerEngine {
    store: Arc<dyn SessionStore>,
    config: TimerConfig,
    user_id: Option<i64>,
    record: Option<SessionRecord>,
    /// Whole seconds until the current phase deadline (ceiling).
    seconds_remaining: i64,
    /// Whole seconds since the current phase started (floor).
    seconds_elapsed: i64,
    initialized: bool,
    /// Guards against a second `initialize` racing the first on this
    /// instance; the loser returns without touching the store.
    init_in_flight: bool,
    /// Most recent failure, shared with deferred writes spawned by `tick`.
    last_error: Arc<Mutex<Option<EngineError>>>,
}

impl TimerEngine {
    pub fn new(store: Arc<dyn SessionStore>, config: TimerConfig) -> Self {
        Self {
            store,
            config,
            user_id: None,
            record: None,
            seconds_remaining: 0,
            seconds_elapsed: 0,
            initialized: false,
            init_in_flight: false,
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> EnginePhase {
        match &self.record {
            None => EnginePhase::Uninitialized,
            Some(r) => match r.session_state {
                SessionState::Focus => EnginePhase::Focus,
                SessionState::Break => EnginePhase::Break,
                SessionState::Complete => EnginePhase::Complete,
            },
        }
    }

    pub fn seconds_remaining(&self) -> i64 {
        self.seconds_remaining.max(0)
    }

    pub fn seconds_elapsed(&self) -> i64 {
        self.seconds_elapsed.max(0)
    }

    pub fn break_minutes_remaining(&self) -> i64 {
        self.record
            .as_ref()
            .map(|r| r.break_minutes_remaining)
            .unwrap_or(0)
    }

    pub fn planned_minutes(&self) -> i64 {
        self.record
            .as_ref()
            .map(|r| r.planned_minutes)
            .unwrap_or(self.config.planned_focus_minutes)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_completed(&self) -> bool {
        self.phase() == EnginePhase::Complete
    }

    pub fn session_id(&self) -> Option<i64> {
        self.record.as_ref().map(|r| r.id)
    }

    pub fn total_minutes_done(&self) -> Option<i64> {
        self.record.as_ref().and_then(|r| r.total_minutes_done)
    }

    /// Completion summary value: floored to the nearest 15-minute step.
    /// The persisted `total_minutes_done` stays unrounded.
    pub fn total_minutes_done_rounded(&self) -> Option<i64> {
        self.total_minutes_done().map(|t| (t / 15) * 15)
    }

    /// Most recent store failure, including ones raised by deferred writes.
    pub fn last_error(&self) -> Option<EngineError> {
        self.last_error.lock().ok().and_then(|slot| slot.clone())
    }

    /// Full state snapshot for the presentation adapter.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot {
            phase: self.phase(),
            seconds_remaining: self.seconds_remaining(),
            seconds_elapsed: self.seconds_elapsed(),
            clock: clock::seconds_to_clock(self.seconds_remaining()),
            break_minutes_remaining: self.break_minutes_remaining(),
            planned_minutes: self.planned_minutes(),
            is_completed: self.is_completed(),
            total_minutes_done_rounded: self.total_minutes_done_rounded(),
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Bind the engine to the user's active session, creating one if none
    /// exists.
    ///
    /// Idempotent: a repeated or concurrent call on this instance returns
    /// `None` without issuing store traffic. If the adopted session is
    /// already past a deadline, the expiry transition runs (and is
    /// persisted) before this returns, so initialization after a long
    /// absence lands in the right state.
    pub async fn initialize(&mut self, user_id: i64) -> Result<Option<Event>, EngineError> {
        if self.initialized || self.init_in_flight {
            debug!(user_id, "initialize dropped: already initialized or in flight");
            return Ok(None);
        }
        self.init_in_flight = true;
        let result = self.initialize_inner(user_id).await;
        self.init_in_flight = false;
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    async fn initialize_inner(&mut self, user_id: i64) -> Result<Option<Event>, EngineError> {
        let now = Utc::now();
        let active = self.store.list_active(user_id).await?;
        let (record, event) = match active.into_iter().next() {
            Some(existing) => Self::adopt(existing, user_id, now)?,
            None => {
                // A concurrent caller (another tab, another process) may have
                // created a session since the first query. Re-check right
                // before inserting; the store's create is idempotent on top.
                let recheck = self.store.list_active(user_id).await?;
                match recheck.into_iter().next() {
                    Some(existing) => Self::adopt(existing, user_id, now)?,
                    None => {
                        let new_session = NewSession::focus(
                            user_id,
                            now,
                            self.config.planned_focus_minutes,
                            self.config.break_budget_minutes,
                        );
                        let created = self.store.create(new_session).await?;
                        debug!(session_id = created.id, user_id, "session created");
                        let event = Event::SessionStarted {
                            session_id: created.id,
                            user_id,
                            planned_minutes: created.planned_minutes,
                            focus_end_time: created.focus_end_time,
                            at: now,
                        };
                        (created, event)
                    }
                }
            }
        };

        self.user_id = Some(user_id);
        self.record = Some(record);
        self.initialized = true;
        self.recompute(now)?;

        // Adoption-time expiry: the user may return long past a deadline.
        // This is a command boundary, so the resulting write is awaited.
        if let Some((id, patch, expiry_event)) = self.evaluate_expiry(now)? {
            self.persist_patch(id, patch).await?;
            return Ok(Some(expiry_event));
        }
        Ok(Some(event))
    }

    fn adopt(
        existing: SessionRecord,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(SessionRecord, Event), EngineError> {
        existing.validate_adoptable()?;
        debug!(session_id = existing.id, user_id, "adopting active session");
        let event = Event::SessionAdopted {
            session_id: existing.id,
            user_id,
            session_state: existing.session_state,
            at: now,
        };
        Ok((existing, event))
    }

    /// Start a break, or extend the one already running.
    ///
    /// Extension moves the deadline from its current value, not from now, so
    /// stacked calls compose additively. The budget decrements exactly once
    /// per successful call, only after the store accepted the update.
    pub async fn take_break(&mut self) -> Result<Event, EngineError> {
        let now = Utc::now();
        let record = self.active_record()?;
        let increment = self.config.break_increment_minutes;
        if record.break_minutes_remaining < increment {
            return Err(EngineError::InsufficientBreakBudget {
                remaining: record.break_minutes_remaining,
                required: increment,
            });
        }
        let id = record.id;
        let extending = record.session_state == SessionState::Break;
        let (start, end) = if extending {
            let (start, current_end) = record.phase_window()?;
            (start, clock::add_minutes(current_end, increment))
        } else {
            (now, clock::add_minutes(now, increment))
        };
        let new_budget = record.break_minutes_remaining - increment;

        if let Some(r) = self.record.as_mut() {
            r.session_state = SessionState::Break;
            r.break_start_time = Some(start);
            r.break_end_time = Some(end);
        }
        let patch = SessionPatch {
            session_state: Some(SessionState::Break),
            break_start_time: Some(start),
            break_end_time: Some(end),
            break_minutes_remaining: Some(new_budget),
            total_minutes_done: None,
        };
        self.persist_patch(id, patch).await?;
        if let Some(r) = self.record.as_mut() {
            r.break_minutes_remaining = new_budget;
        }
        self.recompute(now)?;
        debug!(
            session_id = id,
            extending, new_budget, "break window now ends at {end}"
        );

        let event = if extending {
            Event::BreakExtended {
                session_id: id,
                break_end_time: end,
                break_minutes_remaining: new_budget,
                at: now,
            }
        } else {
            Event::BreakStarted {
                session_id: id,
                break_end_time: end,
                break_minutes_remaining: new_budget,
                at: now,
            }
        };
        Ok(event)
    }

    /// End the break and resume the focus phase.
    ///
    /// The focus deadline is not extended to compensate for break time
    /// taken: the deadline is fixed at session creation. Calling while
    /// already in focus is a no-op apart from the persist round trip.
    pub async fn return_to_focus(&mut self) -> Result<Event, EngineError> {
        let now = Utc::now();
        let record = self.active_record()?;
        let id = record.id;
        if let Some(r) = self.record.as_mut() {
            r.session_state = SessionState::Focus;
        }
        let patch = SessionPatch {
            session_state: Some(SessionState::Focus),
            ..SessionPatch::default()
        };
        self.persist_patch(id, patch).await?;
        self.recompute(now)?;
        Ok(Event::FocusResumed {
            session_id: id,
            seconds_remaining: self.seconds_remaining(),
            at: now,
        })
    }

    /// Save the session: persist the accrued focus minutes and enter the
    /// terminal state.
    pub async fn complete(&mut self) -> Result<Event, EngineError> {
        let now = Utc::now();
        let id = self.active_record()?.id;
        let (event, patch) = match self.apply_completion(now) {
            Some(applied) => applied,
            None => return Err(EngineError::NoActiveSession),
        };
        self.persist_patch(id, patch).await?;
        Ok(event)
    }

    /// Delete the session without writing a completion summary. The engine
    /// returns to Uninitialized and may be initialized again.
    pub async fn discard(&mut self) -> Result<Event, EngineError> {
        let id = self.active_record()?.id;
        if let Err(err) = self.store.delete(id).await {
            let err: EngineError = err.into();
            self.report(&err);
            return Err(err);
        }
        self.record = None;
        self.user_id = None;
        self.initialized = false;
        self.seconds_remaining = 0;
        self.seconds_elapsed = 0;
        debug!(session_id = id, "session discarded");
        Ok(Event::SessionDiscarded {
            session_id: id,
            at: Utc::now(),
        })
    }

    /// One recomputation pass: refresh remaining/elapsed from the phase
    /// window, then evaluate expiry.
    ///
    /// Synchronous by design; a store write caused by expiry is spawned onto
    /// the runtime, never awaited here, so a slow backend cannot stall the
    /// cadence. Must therefore be called from within a Tokio runtime. Errors
    /// never escape: they are logged and parked in the observable error
    /// slot, because a tick must not kill the periodic loop.
    pub fn tick(&mut self) -> Option<Event> {
        let now = Utc::now();
        if !self.record.as_ref().map(|r| r.is_active()).unwrap_or(false) {
            return None;
        }
        if let Err(err) = self.recompute(now) {
            self.report(&err);
            return None;
        }
        match self.evaluate_expiry(now) {
            Ok(Some((id, patch, event))) => {
                self.spawn_persist(id, patch);
                Some(event)
            }
            Ok(None) => None,
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn active_record(&self) -> Result<&SessionRecord, EngineError> {
        let record = self.record.as_ref().ok_or(EngineError::NoActiveSession)?;
        if record.session_state == SessionState::Complete {
            return Err(EngineError::SessionComplete);
        }
        Ok(record)
    }

    /// Derive remaining/elapsed from the current phase window.
    ///
    /// Remaining uses the ceiling so the countdown shows the last whole
    /// second before flipping to zero; elapsed uses the floor.
    fn recompute(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        let Some(record) = &self.record else {
            self.seconds_remaining = 0;
            self.seconds_elapsed = 0;
            return Ok(());
        };
        if record.session_state == SessionState::Complete {
            self.seconds_remaining = 0;
            self.seconds_elapsed = 0;
            return Ok(());
        }
        let (start, end) = record.phase_window()?;
        self.seconds_remaining = clock::seconds_between_ceil(now, end);
        self.seconds_elapsed = clock::seconds_between(start, now).max(0);
        Ok(())
    }

    /// Apply any due phase transitions in memory and collect the patch to
    /// persist. Runs on every tick and once at adoption.
    ///
    /// A break past its deadline falls back into focus, and a focus window
    /// that meanwhile ran out completes the session in the same pass, so a
    /// single evaluation lands in the right state no matter how long the
    /// process was away.
    fn evaluate_expiry(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Option<(i64, SessionPatch, Event)>, EngineError> {
        let id = match &self.record {
            Some(r) => r.id,
            None => return Ok(None),
        };
        let mut patch = SessionPatch::default();
        let mut event: Option<Event> = None;

        loop {
            let state = match &self.record {
                Some(r) if r.is_active() => r.session_state,
                _ => break,
            };
            if self.seconds_remaining > 0 {
                break;
            }
            // Seconds past the deadline before this evaluation ran
            // (scheduler jitter, or a long absence). Elapsed is capped at
            // the nominal phase length, not overshot.
            let overflow = -self.seconds_remaining;
            self.seconds_elapsed -= overflow;
            self.seconds_remaining = 0;

            match state {
                SessionState::Break => {
                    if let Some(r) = self.record.as_mut() {
                        r.session_state = SessionState::Focus;
                    }
                    patch.merge(SessionPatch {
                        session_state: Some(SessionState::Focus),
                        ..SessionPatch::default()
                    });
                    self.recompute(now)?;
                    debug!(session_id = id, "break expired, back to focus");
                    event = Some(Event::FocusResumed {
                        session_id: id,
                        seconds_remaining: self.seconds_remaining(),
                        at: now,
                    });
                }
                SessionState::Focus => {
                    if let Some((completion_event, completion_patch)) =
                        self.apply_completion(now)
                    {
                        patch.merge(completion_patch);
                        event = Some(completion_event);
                    }
                    break;
                }
                SessionState::Complete => break,
            }
        }

        Ok(event.map(|ev| (id, patch, ev)))
    }

    /// Enter the terminal state in memory and build the completion patch.
    ///
    /// `total_minutes_done` means focus minutes accrued, so the measurement
    /// always runs over the focus window (a save issued mid-break must not
    /// count break seconds) and is capped at the planned focus length. On
    /// the expiry path this equals the overflow-corrected elapsed value.
    fn apply_completion(&mut self, now: DateTime<Utc>) -> Option<(Event, SessionPatch)> {
        let record = self.record.as_mut()?;
        let planned_seconds =
            clock::seconds_between(record.focus_start_time, record.focus_end_time);
        let focus_elapsed =
            clock::seconds_between(record.focus_start_time, now).clamp(0, planned_seconds.max(0));
        let total = focus_elapsed / 60;

        record.session_state = SessionState::Complete;
        record.total_minutes_done = Some(total);
        self.seconds_remaining = 0;
        self.seconds_elapsed = 0;
        debug!(session_id = record.id, total, "session complete");

        let patch = SessionPatch {
            session_state: Some(SessionState::Complete),
            total_minutes_done: Some(total),
            ..SessionPatch::default()
        };
        let event = Event::SessionCompleted {
            session_id: record.id,
            total_minutes_done: total,
            total_minutes_done_rounded: (total / 15) * 15,
            at: now,
        };
        Some((event, patch))
    }

    /// Awaited store write for the command paths. In-memory state is not
    /// rolled back on failure; the caller decides whether to retry.
    async fn persist_patch(&mut self, id: i64, patch: SessionPatch) -> Result<(), EngineError> {
        match self.store.update(id, patch).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => {
                let err = EngineError::CorruptSession {
                    id,
                    reason: "active session vanished from the store".into(),
                };
                self.report(&err);
                Err(err)
            }
            Err(store_err) => {
                let err: EngineError = store_err.into();
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Fire-and-forget store write for the tick path.
    fn spawn_persist(&self, id: i64, patch: SessionPatch) {
        let store = Arc::clone(&self.store);
        let error_slot = Arc::clone(&self.last_error);
        tokio::spawn(async move {
            let outcome = match store.update(id, patch).await {
                Ok(Some(_)) => None,
                Ok(None) => Some(EngineError::CorruptSession {
                    id,
                    reason: "active session vanished from the store".into(),
                }),
                Err(store_err) => Some(store_err.into()),
            };
            if let Some(err) = outcome {
                warn!(session_id = id, error = %err, "deferred session update failed");
                if let Ok(mut slot) = error_slot.lock() {
                    *slot = Some(err);
                }
            }
        });
    }

    fn report(&self, err: &EngineError) {
        warn!(error = %err, "engine command failed");
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(err.clone());
        }
    }
}
