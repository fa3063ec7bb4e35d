use log::{debug, info, warn};
use rand::rngs::SmallRng;
use rand::Rng;
use rand_core::SeedableRng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::board::{move_to_text, Color, Vertex, BOARD_SQ, PASS, RESIGN};
use crate::config::EngineConfig;
use crate::network::{Evaluation, EvalError};
use crate::search::node::{Expansion, Node};
use crate::state::GameState;

/// Upper bound on live tree nodes across all workers. Nodes are on the
/// order of 100 bytes, so this caps the tree at a few gigabytes.
pub const MAX_TREE_SIZE: usize = 25_000_000;

const DIRICHLET_EPSILON: f32 = 0.25;
const DIRICHLET_ALPHA: f32 = 0.03;

/// One training record: the position as the network saw it and the search's
/// visit distribution over its answers.
#[derive(Clone, Debug, Serialize)]
pub struct TimeStep {
    pub to_move: Color,
    pub features: Vec<f32>,
    pub probabilities: Vec<f32>,
}

/// Black-perspective result of a finished game reached inside the search.
fn terminal_eval(state: &GameState) -> f32 {
    let score = state.final_score();
    if score > 0.0 {
        1.0
    } else if score < 0.0 {
        0.0
    } else {
        0.5
    }
}

/// The search proper: a game state at the root, the shared tree above it,
/// and the worker pool that grows the tree.
pub struct TreeSearch {
    rootstate: GameState,
    root: Node,
    config: EngineConfig,
    evaluation: Arc<Evaluation>,
    nodes: AtomicUsize,
    max_tree_size: usize,
    playouts: AtomicUsize,
    eval_failed: AtomicBool,
    rng: SmallRng,
}

impl TreeSearch {
    pub fn new(rootstate: GameState, config: EngineConfig, evaluation: Arc<Evaluation>) -> Self {
        let rng = SmallRng::seed_from_u64(config.rng_seed);
        TreeSearch {
            rootstate,
            root: Node::new(PASS, 0.0, 0.5),
            config,
            evaluation,
            nodes: AtomicUsize::new(1),
            max_tree_size: MAX_TREE_SIZE,
            playouts: AtomicUsize::new(0),
            eval_failed: AtomicBool::new(false),
            rng,
        }
    }

    #[inline]
    pub fn rootstate(&self) -> &GameState {
        &self.rootstate
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.rootstate.set_komi(komi);
    }

    #[inline]
    pub fn root(&self) -> &Node {
        &self.root
    }

    #[inline]
    pub fn playouts(&self) -> usize {
        self.playouts.load(Ordering::Relaxed)
    }

    /// One full simulation: descend with virtual losses, expand or score the
    /// leaf, and back the result up the visited path. `Ok(false)` means the
    /// descent was abandoned (contended expansion or no selectable child)
    /// and no playout was counted.
    fn play_simulation(&self, rng: &mut SmallRng) -> Result<bool, EvalError> {
        let mut currstate = self.rootstate.clone();
        let mut color = currstate.to_move();
        let mut node = &self.root;
        let mut visited: Vec<&Node> = Vec::with_capacity(64);
        let mut result: Option<f32> = None;

        loop {
            node.virtual_loss();
            visited.push(node);

            if !node.has_children() {
                if currstate.passes() >= 2 {
                    result = Some(terminal_eval(&currstate));
                } else if self.nodes.load(Ordering::Relaxed) < self.max_tree_size {
                    match node.create_children(&self.nodes, &currstate, &self.evaluation, rng) {
                        Ok(Expansion::Value(eval)) => result = Some(eval),
                        Ok(Expansion::Busy) => {}
                        Err(err) => {
                            for n in visited.iter().rev() {
                                n.virtual_loss_undo();
                            }
                            return Err(err);
                        }
                    }
                } else {
                    // No room to expand: fall back to the eval the node was
                    // born with, flipped to Black's perspective.
                    let init = node.init_eval();
                    result = Some(if color == Color::Black { init } else { 1.0 - init });
                }
            }

            if result.is_none() && node.has_children() {
                let mut selected = None;
                while let Some(next) = node.uct_select_child(color, &self.config) {
                    let mv = next.get_move();
                    // The expansion-time legality check used the history as
                    // of expansion; positions reached during this descent
                    // can still repeat. Probe before playing.
                    if mv != PASS && currstate.superko_move(color, mv) {
                        next.invalidate();
                    } else {
                        selected = Some(next);
                        break;
                    }
                }
                if let Some(next) = selected {
                    currstate.play_move(color, next.get_move());
                    node = next;
                    color = currstate.to_move();
                    continue;
                }
            }

            break;
        }

        for n in visited.iter().rev() {
            if let Some(eval) = result {
                n.update(eval as f64);
            }
            n.virtual_loss_undo();
        }

        if result.is_some() {
            self.playouts.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn stop_thinking(&self) -> bool {
        self.playouts() >= self.config.max_playouts
            || self.root.visits() as usize >= self.config.max_visits
    }

    fn should_resign(&self, bestscore: f32) -> bool {
        if self.config.resign_pct == 0 {
            return false;
        }
        let visits = self.root.visits() as usize;
        if visits < 500.min(self.config.max_playouts) {
            return false;
        }
        if self.rootstate.move_num() <= BOARD_SQ / 4 {
            return false;
        }
        let pct = if self.config.resign_pct < 0 {
            10
        } else {
            self.config.resign_pct
        };
        bestscore <= 0.01 * pct as f32
    }

    /// Best line by visit count, for the log.
    fn pv_string(&self, from: &Node, limit: usize) -> String {
        let mut line = Vec::new();
        let mut node = from;
        while line.len() < limit {
            let Some(next) = node
                .children()
                .iter()
                .filter(|c| c.visits() > 0)
                .max_by_key(|c| c.visits())
            else {
                break;
            };
            line.push(move_to_text(next.get_move()));
            node = next;
        }
        line.join(" ")
    }

    fn dump_analysis(&self, color: Color) {
        if !log::log_enabled!(log::Level::Info) {
            return;
        }
        info!(
            "Playouts: {}, Win: {:5.2}%, PV: {}",
            self.playouts(),
            self.root.get_eval(color) * 100.0,
            self.pv_string(&self.root, 8),
        );
    }

    /// Per-child breakdown of the finished search; assumes children are
    /// already sorted best-first.
    fn dump_stats(&self, color: Color) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        for (movecount, child) in self.root.children().iter().enumerate() {
            // Always show at least two moves so a forced answer still gets
            // some context.
            if movecount >= 2 && child.visits() == 0 {
                break;
            }
            debug!(
                "{:>4} -> {:7} (V: {:5.2}%) (N: {:5.2}%) PV: {} {}",
                move_to_text(child.get_move()),
                child.visits(),
                child.get_eval(color) * 100.0,
                child.prior() * 100.0,
                move_to_text(child.get_move()),
                self.pv_string(child, 8),
            );
        }
    }

    fn record_time_step(&self, color: Color, steps: &mut Vec<TimeStep>) {
        let children = self.root.children();
        let sum_visits: u64 = children.iter().map(|c| c.visits() as u64).sum();
        // A terminal root accumulates no child visits; there is no
        // distribution to learn from there.
        if sum_visits == 0 {
            return;
        }

        let mut probabilities = vec![0.0f32; BOARD_SQ + 1];
        for child in children {
            let prob = child.visits() as f32 / sum_visits as f32;
            let idx = match child.get_move() {
                PASS => BOARD_SQ,
                v => v as usize,
            };
            probabilities[idx] = prob;
        }

        steps.push(TimeStep {
            to_move: color,
            features: Evaluation::gather_features(&self.rootstate, 0),
            probabilities,
        });
    }

    /// Run the search for `color` and return the chosen move, advancing both
    /// the game state and the tree root past it. Search effort is bounded by
    /// the configured playout and visit limits.
    pub fn think(&mut self, color: Color, steps: &mut Vec<TimeStep>) -> Vertex {
        self.playouts.store(0, Ordering::Relaxed);
        self.eval_failed.store(false, Ordering::Relaxed);
        self.rootstate.set_to_move(color);

        let start = Instant::now();

        // Make sure the root is expanded and carries its own eval before
        // anything races on it.
        let root_eval = if !self.root.has_children() {
            match self
                .root
                .create_children(&self.nodes, &self.rootstate, &self.evaluation, &mut self.rng)
            {
                Ok(Expansion::Value(eval)) => {
                    self.root.update(eval as f64);
                    eval
                }
                Ok(Expansion::Busy) => self.root.get_eval(color),
                Err(err) => {
                    warn!("root evaluation failed ({err}); passing");
                    return self.commit_move(color, PASS);
                }
            }
        } else {
            self.root.get_eval(color)
        };

        self.root.kill_superkos(&self.rootstate);
        if self.config.noise {
            self.root
                .dirichlet_noise(DIRICHLET_EPSILON, DIRICHLET_ALPHA, &mut self.rng);
        }

        info!(
            "NN eval = {:.2}%",
            100.0 * if color == Color::Black { root_eval } else { 1.0 - root_eval }
        );

        let threads = self.config.num_threads.max(1);
        let seeds: Vec<u64> = (0..threads).map(|_| self.rng.gen()).collect();
        let running = AtomicBool::new(true);

        let this: &TreeSearch = &*self;
        std::thread::scope(|scope| {
            let running = &running;
            for &seed in &seeds[1..] {
                scope.spawn(move || {
                    let mut rng = SmallRng::seed_from_u64(seed);
                    while running.load(Ordering::Relaxed) {
                        if this.play_simulation(&mut rng).is_err() {
                            this.eval_failed.store(true, Ordering::Relaxed);
                            break;
                        }
                    }
                });
            }

            let mut rng = SmallRng::seed_from_u64(seeds[0]);
            let mut last_update = 0;
            loop {
                if let Err(err) = this.play_simulation(&mut rng) {
                    warn!("evaluation failed during search: {err}");
                    this.eval_failed.store(true, Ordering::Relaxed);
                }
                if this.eval_failed.load(Ordering::Relaxed) || this.stop_thinking() {
                    break;
                }

                let elapsed_centis = start.elapsed().as_millis() / 10;
                if elapsed_centis - last_update > 250 {
                    last_update = elapsed_centis;
                    this.dump_analysis(color);
                }
            }
            running.store(false, Ordering::Relaxed);
        });

        if self.eval_failed.load(Ordering::Relaxed) {
            warn!("aborting search after evaluation failure; passing");
            return self.commit_move(color, PASS);
        }
        if !self.root.has_children() {
            // Terminal root; nothing to pick from.
            return self.commit_move(color, PASS);
        }

        self.root.sort_children(color);
        self.dump_stats(color);
        self.record_time_step(color, steps);

        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "{} visits, {} nodes, {} playouts, {:.0} p/s",
            self.root.visits(),
            self.nodes.load(Ordering::Relaxed),
            self.playouts(),
            self.playouts() as f64 / elapsed.max(1e-6),
        );

        // Early-game exploration for self-play: sample the move by visits.
        if self.rootstate.move_num() < self.config.random_cnt {
            self.root.randomize_first_proportionally(&mut self.rng);
        }

        let first_child = self.root.get_first_child().expect("children exist");
        let mut best_move = first_child.get_move();
        let best_score = first_child.get_eval(color);

        if best_move != PASS && self.should_resign(best_score) {
            info!(
                "eval ({:.2}%) looks hopeless, resigning",
                best_score * 100.0
            );
            best_move = RESIGN;
        }

        self.commit_move(color, best_move)
    }

    /// Play `vertex` on the root state and move the root down to the
    /// matching child, keeping its subtree. A move the tree never expanded
    /// gets a fresh root.
    pub fn apply_move(&mut self, color: Color, vertex: Vertex) {
        self.commit_move(color, vertex);
    }

    fn commit_move(&mut self, color: Color, vertex: Vertex) -> Vertex {
        self.rootstate.play_move(color, vertex);

        let old_root = std::mem::replace(&mut self.root, Node::new(PASS, 0.0, 0.5));
        if let Some(new_root) = old_root.find_child(vertex) {
            self.root = new_root;
        }
        self.nodes.store(self.root.count_nodes(), Ordering::Relaxed);

        vertex
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::UniformNet;

    fn search_with(config: EngineConfig) -> TreeSearch {
        let evaluation = Arc::new(Evaluation::new(Arc::new(UniformNet), 4096));
        TreeSearch::new(GameState::new(7.5), config, evaluation)
    }

    fn quiet_config() -> EngineConfig {
        EngineConfig::new()
            .num_threads(1)
            .max_playouts(64)
            .noise(false)
            .resign_pct(0)
            .rng_seed(11)
    }

    #[test]
    fn single_playout_visits_root_once() {
        let mut search = search_with(quiet_config().max_playouts(1));
        let mut steps = Vec::new();
        let mv = search.think(Color::Black, &mut steps);
        assert!(mv == PASS || (0..BOARD_SQ as Vertex).contains(&mv));
        // The root advanced; the previous root saw exactly its creation
        // visit plus one playout before the move was committed.
        assert_eq!(search.rootstate().move_num(), 1);
    }

    #[test]
    fn terminal_root_is_not_expanded() {
        let mut search = search_with(quiet_config().max_playouts(4));
        search.apply_move(Color::Black, PASS);
        search.apply_move(Color::White, PASS);
        assert_eq!(search.rootstate().passes(), 2);

        let mut steps = Vec::new();
        let mv = search.think(Color::Black, &mut steps);
        assert_eq!(mv, PASS);
        assert!(steps.is_empty());
        assert_eq!(search.rootstate().final_score(), -7.5);
    }

    #[test]
    fn search_is_deterministic_single_threaded() {
        let run = || {
            let mut search = search_with(quiet_config());
            let mut steps = Vec::new();
            search.think(Color::Black, &mut steps);
            steps
        };
        // The recorded probability distribution captures the entire root
        // visit spread, so equal steps mean equal searches.
        let a = run();
        let b = run();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].probabilities, b[0].probabilities);
        assert_eq!(a[0].to_move, Color::Black);
    }

    #[test]
    fn conservation_laws_hold_after_search() {
        let search = search_with(quiet_config());
        // Drive simulations directly so the tree is still rooted where we
        // can see it.
        let mut rng = SmallRng::seed_from_u64(3);
        let mut playouts = 0;
        while playouts < 50 {
            if search.play_simulation(&mut rng).unwrap() {
                playouts += 1;
            }
        }

        fn check(node: &Node) -> (u64, u64) {
            assert_eq!(node.virtual_loss_count(), 0);
            let mut child_visits = 0;
            for child in node.children() {
                let (v, _) = check(child);
                child_visits += v;
            }
            if node.has_children() && node.visits() > 0 {
                // Every visit after the first descended into some child.
                assert_eq!(child_visits, node.visits() as u64 - 1);
            }
            (node.visits() as u64, child_visits)
        }

        // The root was never seeded with its creation visit here, so each
        // playout updated it exactly once.
        let root = search.root();
        assert_eq!(root.visits(), 50);
        let mut child_visits = 0;
        for child in root.children() {
            child_visits += check(child).0;
        }
        assert_eq!(child_visits, 50 - 1);
    }

    #[test]
    fn parallel_search_drains_virtual_losses() {
        let mut search = search_with(
            EngineConfig::new()
                .num_threads(4)
                .max_playouts(400)
                .noise(false)
                .resign_pct(0)
                .rng_seed(5),
        );
        let mut steps = Vec::new();
        let mv = search.think(Color::Black, &mut steps);
        assert!(mv == PASS || (0..BOARD_SQ as Vertex).contains(&mv));

        // The advanced root kept a searched subtree; no virtual loss may
        // survive anywhere in it, and visit conservation holds throughout.
        fn check(node: &Node) {
            assert_eq!(node.virtual_loss_count(), 0);
            let child_visits: u64 = node.children().iter().map(|c| c.visits() as u64).sum();
            if node.has_children() && node.visits() > 0 {
                assert_eq!(child_visits, node.visits() as u64 - 1);
            }
            for child in node.children() {
                check(child);
            }
        }
        check(search.root());
    }

    #[test]
    fn eval_failure_passes_conservatively() {
        struct FailingNet;
        impl crate::network::Network for FailingNet {
            fn evaluate(
                &self,
                _planes: &[f32],
            ) -> Result<crate::network::RawNetOutput, EvalError> {
                Err(EvalError("gpu went away".into()))
            }
        }

        let evaluation = Arc::new(Evaluation::new(Arc::new(FailingNet), 64));
        let mut search = TreeSearch::new(GameState::new(7.5), quiet_config(), evaluation);
        let mut steps = Vec::new();
        let mv = search.think(Color::Black, &mut steps);
        assert_eq!(mv, PASS);
        assert!(steps.is_empty());
        assert_eq!(search.rootstate().passes(), 1);
    }

    #[test]
    fn full_tree_uses_init_eval_fallback() {
        let mut search = search_with(quiet_config());
        search.max_tree_size = 1;
        let mut rng = SmallRng::seed_from_u64(9);
        assert!(search.play_simulation(&mut rng).unwrap());
        // No expansion happened; the root scored itself with the eval it
        // was born with, from Black's point of view.
        assert!(!search.root().has_children());
        assert_eq!(search.root().visits(), 1);
        assert_eq!(search.playouts(), 1);
        assert!((search.root().get_eval(Color::Black) - 0.5).abs() < 1e-6);
    }
}
