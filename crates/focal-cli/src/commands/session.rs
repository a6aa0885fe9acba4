use std::sync::Arc;

use clap::Subcommand;
use focal_core::{
    Config, EngineError, Event, SessionStore, SqliteStore, TickRunner, TimerEngine,
};
use tokio::sync::Mutex;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start the session (or resume the active one) and print its state
    Start {
        /// Planned focus minutes for a newly created session
        #[arg(long)]
        minutes: Option<i64>,
    },
    /// Print current session state as JSON
    Status,
    /// Take a break, or extend the current one
    Break,
    /// End the break and return to focus
    Focus,
    /// Save the session and print the completion summary
    Save,
    /// Discard the session without saving
    Discard,
    /// Run the timer in the foreground until the session completes
    Watch,
}

/// Open the store, load config, and bind an engine to the configured user.
/// An existing active session is adopted; otherwise one is created.
async fn build_engine(
    minutes_override: Option<i64>,
) -> Result<TimerEngine, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let mut timer = config.timer.clone();
    if let Some(minutes) = minutes_override {
        timer.planned_focus_minutes = minutes;
    }
    let store: Arc<dyn SessionStore> = Arc::new(SqliteStore::open()?);
    let mut engine = TimerEngine::new(store, timer);
    engine.initialize(config.session.user_id).await?;
    Ok(engine)
}

fn print_event(event: &Event) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(event)?);
    Ok(())
}

pub async fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SessionAction::Start { minutes } => {
            let engine = build_engine(minutes).await?;
            print_event(&engine.snapshot())?;
        }
        SessionAction::Status => {
            let engine = build_engine(None).await?;
            print_event(&engine.snapshot())?;
        }
        SessionAction::Break => {
            let mut engine = build_engine(None).await?;
            match engine.take_break().await {
                Ok(event) => print_event(&event)?,
                Err(EngineError::InsufficientBreakBudget {
                    remaining,
                    required,
                }) => {
                    // Expected condition, not a failure: the command is a no-op.
                    println!(
                        "not enough break budget: {remaining} of the {required} minutes needed remain"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        SessionAction::Focus => {
            let mut engine = build_engine(None).await?;
            let event = engine.return_to_focus().await?;
            print_event(&event)?;
        }
        SessionAction::Save => {
            let mut engine = build_engine(None).await?;
            let event = engine.complete().await?;
            print_event(&event)?;
        }
        SessionAction::Discard => {
            let mut engine = build_engine(None).await?;
            let event = engine.discard().await?;
            print_event(&event)?;
        }
        SessionAction::Watch => watch().await?,
    }
    Ok(())
}

/// Foreground mode: a TickRunner drives the engine while we print one
/// snapshot line per second until the session completes.
async fn watch() -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(None).await?;
    if engine.is_completed() {
        print_event(&engine.snapshot())?;
        return Ok(());
    }

    let engine = Arc::new(Mutex::new(engine));
    let runner = TickRunner::spawn(Arc::clone(&engine));
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let engine = engine.lock().await;
        println!("{}", serde_json::to_string(&engine.snapshot())?);
        if engine.is_completed() {
            break;
        }
    }
    runner.join().await;
    Ok(())
}
