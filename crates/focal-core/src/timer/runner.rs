//! Periodic tick scheduling.
//!
//! The engine never schedules itself; this runner drives a shared engine at
//! a fixed 1-second cadence on a tokio task. Ticks are serialized behind the
//! engine lock, so a slow tick can never overlap the next one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use super::TimerEngine;

/// Owns the tick loop for one engine.
///
/// The loop stops on its own once the engine completes or is discarded.
/// Dropping the runner aborts the task, leaving no dangling callback behind.
pub struct TickRunner {
    handle: Option<JoinHandle<()>>,
}

impl TickRunner {
    pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

    /// Start ticking an initialized engine.
    pub fn spawn(engine: Arc<Mutex<TimerEngine>>) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval(Self::TICK_INTERVAL);
            // Missed ticks are skipped, not burst: the timing math is
            // absolute, so catch-up ticks would only produce duplicate work.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let mut engine = engine.lock().await;
                engine.tick();
                if engine.is_completed() || !engine.is_initialized() {
                    debug!("tick loop stopping");
                    break;
                }
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Wait until the loop stops on its own (completion or discard).
    pub async fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Cancel the loop immediately.
    pub fn shutdown(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TickRunner {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
