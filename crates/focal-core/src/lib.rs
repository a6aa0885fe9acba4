//! # Focal Core Library
//!
//! Core business logic for Focal, a single-user focus/break session timer.
//! All operations are available through this library; the CLI binary is a
//! thin presentation layer over it.
//!
//! ## Architecture
//!
//! - **Timer Engine**: a wall-clock-based state machine. Remaining and
//!   elapsed time are derived from absolute timestamps on the persisted
//!   session record, so a restart or a missed tick never skews the display.
//!   The caller drives it by invoking `tick()` once per second.
//! - **Storage**: persistence goes through the narrow [`SessionStore`]
//!   trait; [`SqliteStore`] is the on-disk default and [`MemoryStore`]
//!   backs tests. Configuration is TOML on disk.
//! - **Events**: every state change produces an [`Event`] the presentation
//!   layer can render or serialize.
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: the session state machine
//! - [`TickRunner`]: 1 Hz tick scheduling with clean cancellation
//! - [`SessionStore`]: persistence seam (one active session per user)
//! - [`Config`]: application configuration

pub mod clock;
pub mod error;
pub mod events;
pub mod session;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, EngineError, StoreError};
pub use events::Event;
pub use session::{NewSession, SessionPatch, SessionRecord, SessionState};
pub use storage::{Config, MemoryStore, SessionStore, SqliteStore};
pub use timer::{EnginePhase, TickRunner, TimerConfig, TimerEngine};
