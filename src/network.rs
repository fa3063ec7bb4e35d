use rand::rngs::SmallRng;
use rand::Rng;
use std::fmt;
use std::sync::Arc;

use crate::board::{Color, Vertex, BOARD_SQ, PASS};
use crate::cache::{CacheStats, EvalCache};
use crate::state::GameState;
use crate::symmetry::{symmetry_index, NUM_SYMMETRIES};

/// History planes per side fed to the network.
pub const INPUT_MOVES: usize = 8;
/// Two sides of history plus the two to-move planes.
pub const INPUT_CHANNELS: usize = 2 * INPUT_MOVES + 2;
/// Policy entries: one per square plus pass.
pub const POLICY_OUTPUTS: usize = BOARD_SQ + 1;

////////////////////////////////////////////////////////////////////////////////

/// The network failed to produce an evaluation. The search treats this as
/// "stop thinking about this move", never as a crash.
#[derive(Debug, Clone)]
pub struct EvalError(pub String);

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "network evaluation failed: {}", self.0)
    }
}

impl std::error::Error for EvalError {}

/// Raw forward-pass output: 362 policy entries in input orientation and a
/// side-to-move value in [-1, 1]. Softmax (with the configured temperature)
/// is the implementation's business.
#[derive(Debug, Clone)]
pub struct RawNetOutput {
    pub policy: Vec<f32>,
    pub value: f32,
}

/// The one runtime-polymorphic seam of the engine: anything that can map
/// input planes to (policy, value) can drive the search.
pub trait Network: Send + Sync {
    fn evaluate(&self, planes: &[f32]) -> Result<RawNetOutput, EvalError>;
}

/// Unpacked network answer in board orientation: `(prior, vertex)` for every
/// empty square plus pass, and the side-to-move winrate in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct NetResult {
    pub moves: Vec<(f32, Vertex)>,
    pub winrate: f32,
}

/// Which board orientation to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensemble {
    /// A fixed symmetry, mainly for tests and analysis.
    Direct(usize),
    /// One of the eight symmetries uniformly at random; over many
    /// evaluations this averages out orientation bias in the weights.
    RandomSymmetry,
}

////////////////////////////////////////////////////////////////////////////////

/// Owns the network handle and the shared evaluation cache; everything the
/// tree search knows about the network goes through here.
pub struct Evaluation {
    net: Arc<dyn Network>,
    cache: EvalCache,
}

impl Evaluation {
    pub fn new(net: Arc<dyn Network>, cache_capacity: usize) -> Self {
        Evaluation {
            net,
            cache: EvalCache::new(cache_capacity),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Input planes for `state` under `symmetry`, flattened
    /// `[INPUT_CHANNELS][19][19]` row-major.
    ///
    /// Planes 0..8 hold the side to move at the current and seven previous
    /// positions, planes 8..16 the opponent, and the last two planes are
    /// constant one for Black respectively White to move.
    pub fn gather_features(state: &GameState, symmetry: usize) -> Vec<f32> {
        debug_assert!(symmetry < NUM_SYMMETRIES);
        let mut planes = vec![0.0f32; INPUT_CHANNELS * BOARD_SQ];

        let to_move = state.to_move();
        let moves = (state.move_num() + 1).min(INPUT_MOVES);

        for h in 0..moves {
            let board = state.get_past_board(h);
            let (me, rest) = planes[h * BOARD_SQ..].split_at_mut(BOARD_SQ);
            let opp = &mut rest[(INPUT_MOVES - 1) * BOARD_SQ..INPUT_MOVES * BOARD_SQ];
            for idx in 0..BOARD_SQ {
                let color = board.square(symmetry_index(symmetry, idx));
                if color == to_move {
                    me[idx] = 1.0;
                } else if color.is_stone() {
                    opp[idx] = 1.0;
                }
            }
        }

        let plane = if to_move == Color::Black {
            2 * INPUT_MOVES
        } else {
            2 * INPUT_MOVES + 1
        };
        planes[plane * BOARD_SQ..(plane + 1) * BOARD_SQ].fill(1.0);

        planes
    }

    /// Evaluate `state`, going through the cache keyed on the positional
    /// hash. Cache hits are symmetry-agnostic: whichever orientation was
    /// evaluated first is what every later probe of the position sees.
    pub fn get_scored_moves(
        &self,
        state: &GameState,
        ensemble: Ensemble,
        skip_cache: bool,
        rng: &mut SmallRng,
    ) -> Result<NetResult, EvalError> {
        let hash = state.board.ko_hash();
        if !skip_cache {
            if let Some(result) = self.cache.lookup(hash) {
                return Ok(result);
            }
        }

        let symmetry = match ensemble {
            Ensemble::Direct(symmetry) => {
                debug_assert!(symmetry < NUM_SYMMETRIES);
                symmetry
            }
            Ensemble::RandomSymmetry => rng.gen_range(0..NUM_SYMMETRIES),
        };

        let result = self.get_scored_moves_internal(state, symmetry)?;
        self.cache.insert(hash, result.clone());
        Ok(result)
    }

    fn get_scored_moves_internal(
        &self,
        state: &GameState,
        symmetry: usize,
    ) -> Result<NetResult, EvalError> {
        let planes = Self::gather_features(state, symmetry);
        let out = self.net.evaluate(&planes)?;
        if out.policy.len() != POLICY_OUTPUTS {
            return Err(EvalError(format!(
                "policy has {} entries, expected {}",
                out.policy.len(),
                POLICY_OUTPUTS
            )));
        }

        // [-1, 1] side-to-move value to a winrate.
        let winrate = (1.0 + out.value) / 2.0;

        // Undo the input rotation on the policy; the pass entry is
        // orientation-free. Occupied squares carry no probability mass worth
        // keeping.
        let mut moves = Vec::with_capacity(BOARD_SQ + 1 - state.move_num().min(BOARD_SQ));
        for (idx, &score) in out.policy[..BOARD_SQ].iter().enumerate() {
            let vertex = symmetry_index(symmetry, idx);
            if state.board.square(vertex) == Color::Empty {
                moves.push((score, vertex as Vertex));
            }
        }
        moves.push((out.policy[BOARD_SQ], PASS));

        Ok(NetResult { moves, winrate })
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Flat prior over all 362 outputs and an even value; stands in for the real
/// network in tests, benchmarks and the demo.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformNet;

impl Network for UniformNet {
    fn evaluate(&self, _planes: &[f32]) -> Result<RawNetOutput, EvalError> {
        Ok(RawNetOutput {
            policy: vec![1.0 / POLICY_OUTPUTS as f32; POLICY_OUTPUTS],
            value: 0.0,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
