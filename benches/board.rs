use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use gozero::board::{Board, Color, BOARD_SQ};
use gozero::network::Evaluation;
use gozero::state::GameState;

/// Scatter stones with plenty of contact fighting so the group bookkeeping
/// earns its keep.
fn scatter(board: &mut Board, stones: usize, rng: &mut SmallRng) {
    let mut color = Color::Black;
    let mut placed = 0;
    let mut attempts = 0;
    while placed < stones && attempts < 100_000 {
        attempts += 1;
        let v = rng.gen_range(0..BOARD_SQ);
        if board.square(v) == Color::Empty && !board.is_suicide(v, color) {
            board.update_board(color, v);
            color = color.opponent();
            placed += 1;
        }
    }
}

fn bench_update_board(c: &mut Criterion) {
    c.bench_function("update_board 120 stones", |b| {
        b.iter(|| {
            let mut rng = SmallRng::seed_from_u64(17);
            let mut board = Board::new();
            scatter(&mut board, 120, &mut rng);
            board.ko_hash()
        })
    });
}

fn bench_fast_test_move(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(17);
    let mut board = Board::new();
    scatter(&mut board, 120, &mut rng);
    c.bench_function("fast_test_move full scan", |b| {
        b.iter(|| {
            let mut hits = 0u64;
            for v in 0..BOARD_SQ {
                if board.fast_test_move(Color::Black, v).is_some() {
                    hits += 1;
                }
            }
            hits
        })
    });
}

fn played_out_state(moves: usize) -> GameState {
    let mut rng = SmallRng::seed_from_u64(23);
    let mut state = GameState::new(7.5);
    while state.move_num() < moves {
        let v = rng.gen_range(0..BOARD_SQ) as i32;
        let color = state.to_move();
        if state.is_move_legal(color, v) {
            state.play_move(color, v);
        }
    }
    state
}

fn bench_state_clone(c: &mut Criterion) {
    let state = played_out_state(60);
    c.bench_function("gamestate clone", |b| b.iter(|| state.clone()));
}

fn bench_gather_features(c: &mut Criterion) {
    let state = played_out_state(60);
    c.bench_function("gather_features", |b| {
        b.iter(|| Evaluation::gather_features(&state, 3))
    });
}

criterion_group!(
    board,
    bench_update_board,
    bench_fast_test_move,
    bench_state_clone,
    bench_gather_features
);
criterion_main!(board);
