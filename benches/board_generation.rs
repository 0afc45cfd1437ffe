//! Board generation and full-session benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gridstake::games::{Board, StdRandom};
use gridstake::{GameConfig, GameEngine, Money};

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("board_generate");
    let mut random = StdRandom::seeded(42);

    for size in [3usize, 5, 8, 10] {
        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| Board::generate(black_box(size), black_box(20.0), &mut random))
        });
    }

    group.finish();
}

fn bench_session_round(c: &mut Criterion) {
    let mut config = GameConfig::web();
    config.wallet.starting_balance = Money::from_units(1_000_000_000);
    let engine = GameEngine::new(config)
        .expect("valid config")
        .with_random(StdRandom::seeded(7));

    c.bench_function("session_start_reveal_resolve", |b| {
        b.iter(|| {
            let Ok(session) = engine.start_session(Money::from_units(1), 5, 15.0) else {
                return;
            };
            if let Ok(outcome) = engine.reveal(session.session_id, 2, 2) {
                if !outcome.ends_session() {
                    let _ = engine.cash_out(session.session_id);
                }
            }
        })
    });
}

criterion_group!(benches, bench_generate, bench_session_round);
criterion_main!(benches);
