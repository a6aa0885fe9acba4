mod engine;
mod runner;

pub use engine::{EnginePhase, TimerConfig, TimerEngine};
pub use runner::TickRunner;
