use clap::Parser;
use std::sync::Arc;

use gozero::board::{move_to_text, Color, PASS, RESIGN};
use gozero::config::EngineConfig;
use gozero::engine::Engine;
use gozero::network::UniformNet;

/// Self-play demo: the engine plays itself with a uniform stand-in network.
///
/// Useful for eyeballing search behaviour and producing sample training
/// records without real weights.
#[derive(Parser)]
#[command(name = "selfplay")]
struct Cli {
    /// Playouts per move.
    #[arg(long, default_value_t = 100)]
    playouts: usize,

    /// Worker threads.
    #[arg(long, default_value_t = 2)]
    threads: usize,

    /// Maximum moves before the game is adjudicated by area score.
    #[arg(long, default_value_t = 120)]
    max_moves: usize,

    /// Search RNG seed.
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,

    /// Disable root Dirichlet noise.
    #[arg(long)]
    no_noise: bool,

    /// Print the recorded training steps as JSON lines to stdout.
    #[arg(long)]
    dump_steps: bool,

    /// Show the board after every move.
    #[arg(long)]
    show_board: bool,
}

fn main() {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = EngineConfig::new()
        .num_threads(cli.threads)
        .max_playouts(cli.playouts)
        .noise(!cli.no_noise)
        .random_cnt(30)
        .resign_pct(1)
        .rng_seed(cli.seed);

    let mut engine = Engine::new(config, Arc::new(UniformNet));

    let mut prev_move = -100;
    let mut winner = Color::Empty;
    for _ in 0..cli.max_moves {
        let who = engine.game().to_move();
        let mv = engine.genmove(who);
        eprintln!(
            "{} {}",
            if who == Color::Black { "B" } else { "W" },
            move_to_text(mv)
        );
        if cli.show_board {
            eprintln!("{}", engine.game());
        }

        if mv == RESIGN {
            winner = who.opponent();
            break;
        }
        if mv == PASS && prev_move == PASS {
            break;
        }
        prev_move = mv;
    }

    if winner == Color::Empty {
        let score = engine.final_score();
        if score > 0.1 {
            winner = Color::Black;
        } else if score < -0.1 {
            winner = Color::White;
        }
        eprintln!("area score: {score:+.1}");
    }

    match winner {
        Color::Black => eprintln!("result: B wins"),
        Color::White => eprintln!("result: W wins"),
        Color::Empty => eprintln!("result: jigo"),
    }

    let stats = engine.cache_stats();
    eprintln!(
        "cache: {} lookups, {} hits, {} inserts",
        stats.lookups, stats.hits, stats.inserts
    );

    if cli.dump_steps {
        for step in engine.take_time_steps() {
            println!("{}", serde_json::to_string(&step).expect("steps serialize"));
        }
    }
}
