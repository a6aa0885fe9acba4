//! End-to-end engine scenarios over real stores.
//!
//! These exercise the full command surface the way the CLI drives it,
//! including the restart path where a fresh engine instance adopts the
//! session a previous instance persisted.

use std::sync::Arc;

use focal_core::{
    Event, MemoryStore, SessionState, SessionStore, SqliteStore, TimerConfig, TimerEngine,
};

fn engine(store: Arc<dyn SessionStore>, config: TimerConfig) -> TimerEngine {
    TimerEngine::new(store, config)
}

#[tokio::test]
async fn full_lifecycle_over_sqlite() {
    let store: Arc<dyn SessionStore> = Arc::new(SqliteStore::open_memory().unwrap());
    let mut eng = engine(
        Arc::clone(&store),
        TimerConfig {
            planned_focus_minutes: 60,
            break_budget_minutes: 15,
            break_increment_minutes: 5,
        },
    );

    let started = eng.initialize(42).await.unwrap();
    assert!(matches!(started, Some(Event::SessionStarted { .. })));
    assert_eq!(eng.planned_minutes(), 60);
    assert_eq!(eng.break_minutes_remaining(), 15);

    eng.take_break().await.unwrap();
    eng.take_break().await.unwrap();
    assert_eq!(eng.break_minutes_remaining(), 5);

    let resumed = eng.return_to_focus().await.unwrap();
    assert!(matches!(resumed, Event::FocusResumed { .. }));

    let completed = eng.complete().await.unwrap();
    match completed {
        Event::SessionCompleted {
            total_minutes_done,
            total_minutes_done_rounded,
            ..
        } => {
            // The session just started; no whole focus minute accrued yet.
            assert_eq!(total_minutes_done, 0);
            assert_eq!(total_minutes_done_rounded, 0);
        }
        other => panic!("expected SessionCompleted, got {other:?}"),
    }

    // The active slot is free again: a new initialize starts a new session.
    let mut next = engine(Arc::clone(&store), TimerConfig::default());
    let event = next.initialize(42).await.unwrap();
    assert!(matches!(event, Some(Event::SessionStarted { .. })));
    assert_ne!(next.session_id(), eng.session_id());
}

#[tokio::test]
async fn session_survives_an_engine_restart() {
    // A file-backed store so both the engine and the store itself go away
    // between the two halves, as in a real process restart.
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("focal.db");

    let first_id = {
        let store: Arc<dyn SessionStore> = Arc::new(SqliteStore::open_at(&db_path).unwrap());
        let mut eng = engine(Arc::clone(&store), TimerConfig::default());
        eng.initialize(1).await.unwrap();
        eng.take_break().await.unwrap();
        eng.session_id().unwrap()
        // Engine and store dropped here: the process went away.
    };

    let store: Arc<dyn SessionStore> = Arc::new(SqliteStore::open_at(&db_path).unwrap());
    let mut eng = engine(Arc::clone(&store), TimerConfig::default());
    let event = eng.initialize(1).await.unwrap();
    assert!(matches!(
        event,
        Some(Event::SessionAdopted {
            session_state: SessionState::Break,
            ..
        })
    ));
    assert_eq!(eng.session_id(), Some(first_id));
    assert_eq!(eng.break_minutes_remaining(), 25);
    // The break window was persisted with absolute timestamps, so the
    // countdown picks up mid-break rather than restarting.
    assert!(eng.seconds_remaining() > 0);
    assert!(eng.seconds_remaining() <= 5 * 60);
}

#[tokio::test]
async fn discard_frees_the_slot_across_instances() {
    let store: Arc<dyn SessionStore> = Arc::new(SqliteStore::open_memory().unwrap());

    let mut eng = engine(Arc::clone(&store), TimerConfig::default());
    eng.initialize(1).await.unwrap();
    let discarded_id = eng.session_id().unwrap();
    eng.discard().await.unwrap();

    let mut next = engine(Arc::clone(&store), TimerConfig::default());
    let event = next.initialize(1).await.unwrap();
    assert!(matches!(event, Some(Event::SessionStarted { .. })));
    assert_ne!(next.session_id(), Some(discarded_id));
}

#[tokio::test]
async fn two_instances_share_one_session() {
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    let mut a = engine(Arc::clone(&store), TimerConfig::default());
    let mut b = engine(Arc::clone(&store), TimerConfig::default());

    let (ra, rb) = tokio::join!(a.initialize(7), b.initialize(7));
    ra.unwrap();
    rb.unwrap();

    assert_eq!(a.session_id(), b.session_id());
    assert_eq!(store.list_active(7).await.unwrap().len(), 1);
}

#[tokio::test]
async fn stores_agree_on_the_contract() {
    for store in [
        Arc::new(MemoryStore::new()) as Arc<dyn SessionStore>,
        Arc::new(SqliteStore::open_memory().unwrap()) as Arc<dyn SessionStore>,
    ] {
        let mut eng = engine(Arc::clone(&store), TimerConfig::default());
        eng.initialize(1).await.unwrap();
        let id = eng.session_id().unwrap();

        // Idempotent create: a second engine adopts rather than duplicates.
        let mut other = engine(Arc::clone(&store), TimerConfig::default());
        other.initialize(1).await.unwrap();
        assert_eq!(other.session_id(), Some(id));

        // Unknown ids update to None, delete is idempotent.
        assert!(store
            .update(id + 1000, Default::default())
            .await
            .unwrap()
            .is_none());
        store.delete(id + 1000).await.unwrap();
    }
}
