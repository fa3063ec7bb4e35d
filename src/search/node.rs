use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::{Distribution, Gamma};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::board::{Color, Vertex, PASS};
use crate::config::EngineConfig;
use crate::network::{Ensemble, EvalError, Evaluation};
use crate::state::GameState;

/// Atomic add for an f64 stored as its bit pattern. Relaxed is enough here:
/// the release on the virtual-loss decrement is what publishes a completed
/// backup to later selectors.
fn atomic_add_f64(cell: &AtomicU64, delta: f64) {
    let mut old = cell.load(Ordering::Relaxed);
    loop {
        let new = f64::from_bits(old) + delta;
        match cell.compare_exchange_weak(old, new.to_bits(), Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(current) => old = current,
        }
    }
}

/// Outcome of an expansion attempt.
pub enum Expansion {
    /// This caller created the children; carries the network's value for
    /// the expanded position from Black's point of view.
    Value(f32),
    /// Children already exist, the node is terminal, or another worker holds
    /// the expansion; the caller should not treat this descent as a playout.
    Busy,
}

/// One node of the shared search tree.
///
/// The child list is created exactly once under `expand_lock` and is
/// structurally immutable afterwards; all statistics are atomics so any
/// number of workers may read and update them concurrently. The only `&mut`
/// operations are root-only preparation steps that run while no workers are
/// alive (noise, sorting, randomisation).
pub struct Node {
    mv: Vertex,
    prior: f32,
    init_eval: f32,
    visits: AtomicU32,
    virtual_loss: AtomicU32,
    blackevals: AtomicU64,
    valid: AtomicBool,
    children: OnceLock<Vec<Node>>,
    expand_lock: Mutex<()>,
}

impl Node {
    pub fn new(mv: Vertex, prior: f32, init_eval: f32) -> Self {
        Node {
            mv,
            prior,
            init_eval,
            visits: AtomicU32::new(0),
            virtual_loss: AtomicU32::new(0),
            blackevals: AtomicU64::new(0f64.to_bits()),
            valid: AtomicBool::new(true),
            children: OnceLock::new(),
            expand_lock: Mutex::new(()),
        }
    }

    #[inline(always)]
    pub fn get_move(&self) -> Vertex {
        self.mv
    }

    #[inline(always)]
    pub fn prior(&self) -> f32 {
        self.prior
    }

    /// Side-to-move winrate estimate this node was born with; the cheap
    /// stand-in for an evaluation when the tree is full.
    #[inline(always)]
    pub fn init_eval(&self) -> f32 {
        self.init_eval
    }

    #[inline(always)]
    pub fn visits(&self) -> u32 {
        self.visits.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn valid(&self) -> bool {
        self.valid.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn has_children(&self) -> bool {
        self.children.get().is_some()
    }

    #[inline]
    pub fn children(&self) -> &[Node] {
        self.children.get().map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn first_visit(&self) -> bool {
        self.visits() == 0
    }

    fn blackevals(&self) -> f64 {
        f64::from_bits(self.blackevals.load(Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn virtual_loss_count(&self) -> u32 {
        self.virtual_loss.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn virtual_loss(&self) {
        self.virtual_loss.fetch_add(1, Ordering::Relaxed);
    }

    /// The release pairs with the acquire in [`Node::get_eval`]: once the
    /// loss is lifted, the preceding visit/eval updates are visible.
    #[inline]
    pub fn virtual_loss_undo(&self) {
        self.virtual_loss.fetch_sub(1, Ordering::Release);
    }

    /// Fold one black-perspective simulation result into the node.
    pub fn update(&self, eval: f64) {
        self.visits.fetch_add(1, Ordering::Relaxed);
        atomic_add_f64(&self.blackevals, eval);
    }

    /// Mean outcome from `color`'s point of view, with every outstanding
    /// virtual loss counted as a loss for `color`. Readers may observe a
    /// visit before its eval lands; the in-flight simulation then shows up
    /// as a virtual loss, which is the conservative direction.
    pub fn get_eval(&self, color: Color) -> f32 {
        let virtual_loss = self.virtual_loss.load(Ordering::Acquire) as u64;
        let visits = self.visits.load(Ordering::Relaxed) as u64 + virtual_loss;
        if visits == 0 {
            return 0.5;
        }
        let mut blackevals = self.blackevals();
        if color == Color::White {
            blackevals += virtual_loss as f64;
        }
        let score = blackevals / visits as f64;
        if color == Color::White {
            (1.0 - score) as f32
        } else {
            score as f32
        }
    }

    /// One-shot child creation: evaluate the position, keep the legal moves,
    /// renormalise their priors and publish the list, best prior first with
    /// pass at the end.
    ///
    /// Contention is resolved without waiting: whoever fails the try-lock
    /// reports [`Expansion::Busy`] and abandons the simulation.
    pub fn create_children(
        &self,
        node_count: &AtomicUsize,
        state: &GameState,
        evaluation: &Evaluation,
        rng: &mut SmallRng,
    ) -> Result<Expansion, EvalError> {
        if self.has_children() || state.passes() >= 2 {
            return Ok(Expansion::Busy);
        }
        let Ok(_guard) = self.expand_lock.try_lock() else {
            return Ok(Expansion::Busy);
        };
        if self.has_children() {
            return Ok(Expansion::Busy);
        }

        let raw = evaluation.get_scored_moves(state, Ensemble::RandomSymmetry, false, rng)?;

        let to_move = state.to_move();
        // The network scores the side to move; the tree accumulates from
        // Black's point of view.
        let net_eval = if to_move == Color::White {
            1.0 - raw.winrate
        } else {
            raw.winrate
        };

        let mut pass_prior = 0.0;
        let mut nodelist: Vec<(f32, Vertex)> = Vec::with_capacity(raw.moves.len());
        let mut legal_sum = 0.0f32;
        for &(prior, vertex) in &raw.moves {
            if vertex == PASS {
                pass_prior = prior;
                legal_sum += prior;
            } else if state.is_move_legal(to_move, vertex) {
                nodelist.push((prior, vertex));
                legal_sum += prior;
            }
        }

        nodelist.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(CmpOrdering::Equal));
        nodelist.push((pass_prior, PASS));

        if legal_sum > f32::MIN_POSITIVE {
            for entry in &mut nodelist {
                entry.0 /= legal_sum;
            }
        }

        // Children evaluate for the other side.
        let child_eval = 1.0 - raw.winrate;
        let children: Vec<Node> = nodelist
            .into_iter()
            .map(|(prior, vertex)| Node::new(vertex, prior, child_eval))
            .collect();

        node_count.fetch_add(children.len(), Ordering::Relaxed);
        let published = self.children.set(children).is_ok();
        debug_assert!(published);

        Ok(Expansion::Value(net_eval))
    }

    /// PUCT child selection for `color`. Unvisited children take the parent
    /// eval reduced by the first-play-urgency term. Invalid children are
    /// skipped; `None` if nothing is selectable. Ties resolve to the earlier
    /// child, which keeps single-threaded search deterministic.
    pub fn uct_select_child(&self, color: Color, config: &EngineConfig) -> Option<&Node> {
        let children = self.children.get()?;

        let mut parent_visits = 0u64;
        let mut total_visited_policy = 0.0f32;
        for child in children.iter().filter(|c| c.valid()) {
            let visits = child.visits();
            parent_visits += visits as u64;
            if visits > 0 {
                total_visited_policy += child.prior();
            }
        }

        let numerator = (parent_visits as f64).sqrt();
        let fpu_reduction = config.fpu_reduction * total_visited_policy.sqrt();
        let fpu_eval = (self.get_eval(color) - fpu_reduction) as f64;

        let mut best: Option<&Node> = None;
        let mut best_value = f64::NEG_INFINITY;
        for child in children {
            if !child.valid() {
                continue;
            }
            let visits = child.visits();
            let winrate = if visits > 0 {
                child.get_eval(color) as f64
            } else {
                fpu_eval
            };
            let psa = child.prior() as f64;
            let denom = 1.0 + visits as f64;
            let value = winrate + config.puct as f64 * psa * (numerator / denom);
            debug_assert!(!value.is_nan());

            if value > best_value {
                best_value = value;
                best = Some(child);
            }
        }

        best
    }

    /// Mark children whose move would recreate an earlier position. Run on
    /// the root before each search; never fatal.
    pub fn kill_superkos(&self, state: &GameState) {
        for child in self.children() {
            let mv = child.get_move();
            if mv != PASS && state.superko_move(state.to_move(), mv) {
                child.invalidate();
            }
        }
    }

    /// Mix a Dirichlet(alpha) draw into the children's priors at weight
    /// `epsilon`. Root-only, before workers start.
    pub fn dirichlet_noise(&mut self, epsilon: f32, alpha: f32, rng: &mut SmallRng) {
        let Some(children) = self.children.get_mut() else {
            return;
        };
        let gamma = Gamma::new(alpha as f64, 1.0).expect("alpha is positive");
        let mut noise: Vec<f64> = children.iter().map(|_| gamma.sample(rng)).collect();

        let sample_sum: f64 = noise.iter().sum();
        // A degenerate draw (all mass lost to underflow) is left unused.
        if sample_sum < f64::MIN_POSITIVE {
            return;
        }
        for eta in &mut noise {
            *eta /= sample_sum;
        }

        for (child, eta) in children.iter_mut().zip(noise) {
            child.prior = child.prior * (1.0 - epsilon) + epsilon * eta as f32;
        }
    }

    /// Order children best-first for reporting and move choice: by visits,
    /// unvisited ties by prior, visited ties by eval for `color`.
    pub fn sort_children(&mut self, color: Color) {
        let Some(children) = self.children.get_mut() else {
            return;
        };
        children.sort_by(|a, b| {
            let (va, vb) = (a.visits(), b.visits());
            if va != vb {
                return vb.cmp(&va);
            }
            if va == 0 {
                return b.prior.partial_cmp(&a.prior).unwrap_or(CmpOrdering::Equal);
            }
            b.get_eval(color)
                .partial_cmp(&a.get_eval(color))
                .unwrap_or(CmpOrdering::Equal)
        });
    }

    pub fn get_first_child(&self) -> Option<&Node> {
        self.children().first()
    }

    /// Self-play exploration: move one child to the front with probability
    /// proportional to its visit count. No-op while nothing has visits.
    pub fn randomize_first_proportionally(&mut self, rng: &mut SmallRng) {
        let Some(children) = self.children.get_mut() else {
            return;
        };
        let mut accum = 0u64;
        let cumulative: Vec<u64> = children
            .iter()
            .map(|c| {
                accum += c.visits() as u64;
                accum
            })
            .collect();
        if accum == 0 {
            return;
        }
        let pick = rng.gen_range(0..accum);
        let index = cumulative.partition_point(|&c| c <= pick);
        children[..=index].rotate_right(1);
    }

    /// Detach the subtree reached by `mv`, consuming the rest of the tree.
    pub fn find_child(self, mv: Vertex) -> Option<Node> {
        self.children
            .into_inner()
            .and_then(|children| children.into_iter().find(|c| c.mv == mv))
    }

    /// Nodes in this subtree, itself included. Iterative: endgame trees can
    /// be hundreds of plies deep.
    pub fn count_nodes(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children().iter());
        }
        count
    }
}

////////////////////////////////////////////////////////////////////////////////
