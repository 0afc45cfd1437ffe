//! End-to-end gameplay through the engine: payouts, wallet identity and
//! at-most-once transitions under concurrent callers.

use gridstake::games::{EventKind, SequenceRandom, StdRandom};
use gridstake::{GameConfig, GameEngine, GameError, Money, Multiplier, RevealOutcome, SessionStatus};
use std::sync::Arc;
use std::thread;

fn engine_with(config: GameConfig, samples: Vec<f64>) -> GameEngine {
    GameEngine::new(config)
        .expect("valid config")
        .with_random(SequenceRandom::new(samples))
}

fn no_bombs_config() -> GameConfig {
    let mut config = GameConfig::default();
    config.bombs.default_probability = 0.0;
    config
}

#[test]
fn test_cash_out_after_five_reveals_pays_stake_times_multiplier() {
    let engine = engine_with(no_bombs_config(), vec![0.5]);
    let start_balance = engine.balance();

    let session = engine.start_session(Money::from_units(100), 5, 0.0).unwrap();
    for col in 0..5 {
        engine.reveal(session.session_id, 2, col).unwrap();
    }

    let snapshot = engine.snapshot(session.session_id).unwrap();
    assert_eq!(snapshot.multiplier, Multiplier::from_bps(12_500));
    assert_eq!(snapshot.multiplier.reported(), 1.25);

    let receipt = engine.cash_out(session.session_id).unwrap();
    assert_eq!(receipt.payout.to_string(), "125.00");
    assert_eq!(engine.balance(), start_balance.saturating_add(Money::from_units(25)));
}

#[test]
fn test_cash_out_floor_is_exact() {
    let mut config = no_bombs_config();
    config.cashout.min_reveals = 3;
    let engine = engine_with(config, vec![0.5]);
    let session = engine.start_default(Money::from_units(10)).unwrap();

    for col in 0..2 {
        engine.reveal(session.session_id, 0, col).unwrap();
        assert_eq!(
            engine.cash_out(session.session_id),
            Err(GameError::CashOutNotAllowed {
                safe_reveals: col as u32 + 1,
                required: 3,
            })
        );
    }

    engine.reveal(session.session_id, 0, 2).unwrap();
    assert!(engine.cash_out(session.session_id).is_ok());
}

#[test]
fn test_stake_above_balance_creates_nothing() {
    let mut config = GameConfig::default();
    config.wallet.starting_balance = Money::from_units(50);
    let engine = engine_with(config, vec![0.5]);

    assert_eq!(
        engine.start_default(Money::from_units(100)),
        Err(GameError::InsufficientFunds {
            requested: Money::from_units(100),
            available: Money::from_units(50),
        })
    );
    assert_eq!(engine.balance(), Money::from_units(50));
    assert!(engine.active_session().is_none());
    assert_eq!(engine.events().pending_count(), 0);
}

#[test]
fn test_reveal_after_bomb_is_rejected_without_side_effects() {
    // every cell is a bomb
    let engine = engine_with(GameConfig::default(), vec![0.0]);
    let session = engine.start_default(Money::from_units(100)).unwrap();

    let outcome = engine.reveal(session.session_id, 1, 1).unwrap();
    assert!(matches!(outcome, RevealOutcome::Bomb { .. }));

    let events_before = engine.events().events_for(&session.session_id);
    let balance_before = engine.balance();

    assert_eq!(
        engine.reveal(session.session_id, 2, 2),
        Err(GameError::SessionAlreadyEnded(session.session_id))
    );
    assert_eq!(
        engine.cash_out(session.session_id),
        Err(GameError::SessionAlreadyEnded(session.session_id))
    );
    assert_eq!(engine.events().events_for(&session.session_id), events_before);
    assert_eq!(engine.balance(), balance_before);
    assert_eq!(
        events_before.last().map(|event| event.kind),
        Some(EventKind::BombHit)
    );
}

#[test]
fn test_revealing_every_safe_cell_resolves_as_perfect_game() {
    // 3x3 with a single bomb at (0, 0)
    let mut samples = vec![0.0];
    samples.extend(std::iter::repeat(0.99).take(8));
    let engine = engine_with(GameConfig::default(), samples);
    let config_policy = engine.config().multiplier_policy().unwrap();

    let session = engine.start_session(Money::from_units(100), 3, 50.0).unwrap();
    assert_eq!(session.safe_cells, 8);

    let mut outcomes = Vec::new();
    for row in 0..3 {
        for col in 0..3 {
            if (row, col) != (0, 0) {
                outcomes.push(engine.reveal(session.session_id, row, col).unwrap());
            }
        }
    }

    let expected_multiplier = config_policy.multiplier_after(8);
    let expected_payout = Money::from_units(100).apply_multiplier(expected_multiplier);
    assert_eq!(expected_payout, Money::from_units(140));
    assert!(matches!(
        outcomes.last(),
        Some(RevealOutcome::Perfect { payout, .. }) if *payout == expected_payout
    ));

    let snapshot = engine.snapshot(session.session_id).unwrap();
    assert_eq!(snapshot.status, SessionStatus::CashedOut);
    assert!(snapshot.perfect);
    assert_eq!(engine.balance(), Money::from_units(1_040));
}

#[test]
fn test_balance_identity_holds_over_many_sessions() {
    let mut config = GameConfig::default();
    config.cashout.min_reveals = 2;
    config.wallet.starting_balance = Money::from_units(10_000);
    let engine = GameEngine::new(config)
        .unwrap()
        .with_random(StdRandom::seeded(99));
    let opening = engine.balance();

    let mut staked = 0u64;
    let mut paid = 0u64;
    for round in 0..200u64 {
        let stake = Money::from_units(1 + round % 7);
        let session = engine.start_session(stake, 4, 25.0).unwrap();
        staked += stake.cents();

        let mut ended = false;
        'cells: for row in 0..4 {
            for col in 0..4 {
                match engine.reveal(session.session_id, row, col).unwrap() {
                    RevealOutcome::Safe { safe_reveals, .. } if safe_reveals as u64 >= 2 + round % 4 => {
                        paid += engine.cash_out(session.session_id).unwrap().payout.cents();
                        ended = true;
                        break 'cells;
                    }
                    RevealOutcome::Safe { .. } => {}
                    RevealOutcome::Bomb { .. } => {
                        ended = true;
                        break 'cells;
                    }
                    RevealOutcome::Perfect { payout, .. } => {
                        paid += payout.cents();
                        ended = true;
                        break 'cells;
                    }
                }
            }
        }
        assert!(ended);
    }

    let wallet = engine.wallet();
    assert!(wallet.is_consistent());
    assert_eq!(wallet.total_debited().cents(), staked);
    assert_eq!(wallet.total_credited().cents(), paid);
    assert_eq!(engine.balance().cents(), opening.cents() + paid - staked);

    let history = engine.history();
    assert_eq!(history.len(), 200);
    let bomb_payouts: u64 = history
        .iter()
        .filter(|summary| summary.outcome == SessionStatus::BombHit)
        .map(|summary| summary.payout.cents())
        .sum();
    assert_eq!(bomb_payouts, 0);
}

#[test]
fn test_concurrent_cash_out_credits_once() {
    let engine = Arc::new(engine_with(no_bombs_config(), vec![0.5]));
    let session = engine.start_default(Money::from_units(100)).unwrap();
    for col in 0..5 {
        engine.reveal(session.session_id, 4, col).unwrap();
    }

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || engine.cash_out(session.session_id))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .all(|err| *err == GameError::SessionAlreadyEnded(session.session_id)));

    assert_eq!(engine.balance(), Money::from_units(1_025));
    let cash_outs = engine
        .events()
        .events_for(&session.session_id)
        .iter()
        .filter(|event| event.kind == EventKind::CashOut)
        .count();
    assert_eq!(cash_outs, 1);
}

#[test]
fn test_concurrent_reveals_of_one_cell_flip_once() {
    let engine = Arc::new(engine_with(no_bombs_config(), vec![0.5]));
    let session = engine.start_default(Money::from_units(10)).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || engine.reveal(session.session_id, 3, 3))
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(Result::is_ok)
        .count();

    assert_eq!(successes, 1);
    let flips = engine
        .events()
        .events_for(&session.session_id)
        .iter()
        .filter(|event| event.kind == EventKind::Flip)
        .count();
    assert_eq!(flips, 1);
}
