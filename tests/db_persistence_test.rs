//! Wallet, history and undelivered events survive stopping and restarting
//! the engine on a RocksDB store.

use gridstake::games::{EventKind, SequenceRandom};
use gridstake::{GameConfig, GameEngine, KeyValueStore, MemorySink, Money, RocksStore, SessionStatus, SyncWorker};
use std::sync::Arc;
use tempfile::TempDir;

fn config(data_dir: &str) -> GameConfig {
    let mut config = GameConfig::web();
    config.storage.data_dir = data_dir.to_string();
    config.bombs.default_probability = 0.0;
    config
}

#[tokio::test]
async fn test_db_persistence_across_restarts() {
    let dir = TempDir::new().expect("temp dir");
    let data_dir = dir.path().to_str().expect("utf-8 path").to_string();

    // === PHASE 1: play offline, then stop ===
    let (session_id, balance_before) = {
        let store: Arc<dyn KeyValueStore> = Arc::new(RocksStore::open(&data_dir).expect("open store"));
        let engine = GameEngine::with_store(config(&data_dir), store)
            .expect("engine")
            .with_random(SequenceRandom::constant(0.5));

        let session = engine.start_default(Money::from_units(100)).unwrap();
        engine.reveal(session.session_id, 0, 0).unwrap();
        engine.reveal(session.session_id, 0, 1).unwrap();
        engine.cash_out(session.session_id).unwrap();

        assert_eq!(engine.balance(), Money::from_units(1_020));
        assert_eq!(engine.events().pending_count(), 4);
        (session.session_id, engine.balance())
    };

    // === PHASE 2: restart and verify ===
    let store: Arc<dyn KeyValueStore> = Arc::new(RocksStore::open(&data_dir).expect("reopen store"));
    let engine = GameEngine::with_store(config(&data_dir), store).expect("engine after restart");

    assert_eq!(engine.balance(), balance_before);
    assert!(engine.wallet().is_consistent());

    let history = engine.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].session_id, session_id);
    assert_eq!(history[0].outcome, SessionStatus::CashedOut);

    let kinds: Vec<EventKind> = engine
        .events()
        .events_for(&session_id)
        .iter()
        .map(|event| event.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![EventKind::Started, EventKind::Flip, EventKind::Flip, EventKind::CashOut]
    );

    // delivering after the restart empties the stored queue
    let sink = Arc::new(MemorySink::new());
    let worker = SyncWorker::new(
        engine.events(),
        sink.clone(),
        engine.player_store(),
        engine.config().sync.clone(),
    );
    let report = worker.flush_once().await;
    assert!(report.is_clean());
    assert_eq!(report.delivered, 4);
    assert_eq!(sink.delivered_for(&session_id).len(), 3);
    assert!(engine.player_store().unwrap().load_pending().unwrap().is_empty());
}

#[tokio::test]
async fn test_new_sessions_continue_sequence_after_restart() {
    let dir = TempDir::new().expect("temp dir");
    let data_dir = dir.path().to_str().expect("utf-8 path").to_string();

    let last_seq = {
        let store: Arc<dyn KeyValueStore> = Arc::new(RocksStore::open(&data_dir).unwrap());
        let engine = GameEngine::with_store(config(&data_dir), store)
            .unwrap()
            .with_random(SequenceRandom::constant(0.5));
        let session = engine.start_default(Money::from_units(10)).unwrap();
        engine.reveal(session.session_id, 1, 1).unwrap();
        engine
            .events()
            .events_for(&session.session_id)
            .last()
            .map(|event| event.seq)
            .unwrap()
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(RocksStore::open(&data_dir).unwrap());
    let engine = GameEngine::with_store(config(&data_dir), store)
        .unwrap()
        .with_random(SequenceRandom::constant(0.5));

    // the unfinished session is not resumed; its stake stays debited
    assert!(engine.active_session().is_none());
    assert_eq!(engine.balance(), Money::from_units(990));

    let session = engine.start_default(Money::from_units(10)).unwrap();
    let first = engine.events().events_for(&session.session_id)[0].seq;
    assert!(first > last_seq);
}

#[tokio::test]
async fn test_sequence_survives_restart_with_empty_queue() {
    let dir = TempDir::new().expect("temp dir");
    let data_dir = dir.path().to_str().expect("utf-8 path").to_string();

    let last_seq = {
        let store: Arc<dyn KeyValueStore> = Arc::new(RocksStore::open(&data_dir).unwrap());
        let engine = GameEngine::with_store(config(&data_dir), store)
            .unwrap()
            .with_random(SequenceRandom::constant(0.5));
        let session = engine.start_default(Money::from_units(10)).unwrap();
        engine.reveal(session.session_id, 0, 0).unwrap();
        engine.cash_out(session.session_id).unwrap();

        // everything delivered: the stored queue is gone
        let worker = SyncWorker::new(
            engine.events(),
            Arc::new(MemorySink::new()),
            engine.player_store(),
            engine.config().sync.clone(),
        );
        assert!(worker.flush_once().await.is_clean());
        assert!(engine.player_store().unwrap().load_pending().unwrap().is_empty());
        engine.events().next_seq() - 1
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(RocksStore::open(&data_dir).unwrap());
    let engine = GameEngine::with_store(config(&data_dir), store)
        .unwrap()
        .with_random(SequenceRandom::constant(0.5));
    let session = engine.start_default(Money::from_units(10)).unwrap();
    let first = engine.events().events_for(&session.session_id)[0].seq;
    assert_eq!(first, last_seq + 1);
}
