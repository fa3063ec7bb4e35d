use std::sync::Arc;

use crate::board::{Color, Vertex};
use crate::cache::{CacheStats, EvalCache};
use crate::config::{EngineConfig, TimeControl};
use crate::network::{Evaluation, Network};
use crate::search::{TimeStep, TreeSearch};
use crate::state::GameState;

pub const DEFAULT_KOMI: f32 = 7.5;

/// Front-end facing engine: one game, one search tree, one network handle.
///
/// This is the surface a protocol layer talks to; it owns the state so that
/// `genmove` and `play` keep the tree in sync with the game.
pub struct Engine {
    config: EngineConfig,
    evaluation: Arc<Evaluation>,
    search: TreeSearch,
    time_control: TimeControl,
    time_steps: Vec<TimeStep>,
}

impl Engine {
    pub fn new(config: EngineConfig, network: Arc<dyn Network>) -> Self {
        let capacity = EvalCache::size_from_playouts(config.max_playouts);
        let evaluation = Arc::new(Evaluation::new(network, capacity));
        let search = TreeSearch::new(
            GameState::new(DEFAULT_KOMI),
            config.clone(),
            evaluation.clone(),
        );
        Engine {
            config,
            evaluation,
            search,
            time_control: TimeControl::default(),
            time_steps: Vec::new(),
        }
    }

    /// Fresh game: state reset, tree dropped. Cached evaluations stay; they
    /// are keyed by position and remain valid for the same weights.
    pub fn clear_board(&mut self) {
        let komi = self.search.rootstate().komi();
        self.search = TreeSearch::new(
            GameState::new(komi),
            self.config.clone(),
            self.evaluation.clone(),
        );
        self.time_steps.clear();
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.search.set_komi(komi);
    }

    pub fn set_time_control(&mut self, time_control: TimeControl) {
        self.time_control = time_control;
    }

    pub fn time_control(&self) -> TimeControl {
        self.time_control
    }

    /// Apply an externally decided move (the opponent's, or a forced one).
    /// Returns false and leaves everything untouched if the move is illegal.
    pub fn play(&mut self, color: Color, vertex: Vertex) -> bool {
        if !self.search.rootstate().is_move_legal(color, vertex) {
            return false;
        }
        self.search.apply_move(color, vertex);
        true
    }

    /// Search and play the engine's move for `color`.
    pub fn genmove(&mut self, color: Color) -> Vertex {
        self.search.think(color, &mut self.time_steps)
    }

    pub fn final_score(&self) -> f32 {
        self.search.rootstate().final_score()
    }

    pub fn game(&self) -> &GameState {
        self.search.rootstate()
    }

    /// Training records accumulated by `genmove` since the last take.
    pub fn take_time_steps(&mut self) -> Vec<TimeStep> {
        std::mem::take(&mut self.time_steps)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.evaluation.cache_stats()
    }
}

////////////////////////////////////////////////////////////////////////////////
