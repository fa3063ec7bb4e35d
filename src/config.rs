use serde::Serialize;

/// Hard ceiling on worker threads.
pub const MAX_THREADS: usize = 64;

/// Everything tunable about the engine, fixed at construction. Builder
/// setters allow chaining from `EngineConfig::default()`.
#[derive(Clone, Debug, Serialize)]
pub struct EngineConfig {
    /// Worker threads; clamped to the host CPU count.
    pub num_threads: usize,
    /// Stop after this many completed simulations per move.
    pub max_playouts: usize,
    /// Stop once the root has accumulated this many visits.
    pub max_visits: usize,
    /// PUCT exploration constant.
    pub puct: f32,
    /// Policy temperature, applied inside the network's softmax.
    pub softmax_temp: f32,
    /// First-play-urgency reduction for unvisited children.
    pub fpu_reduction: f32,
    /// Mix Dirichlet noise into the root priors each turn.
    pub noise: bool,
    /// Below this move number the move is sampled proportionally to visit
    /// counts instead of taking the maximum (self-play exploration).
    pub random_cnt: usize,
    /// Resignation threshold in percent. Negative selects the default 10%,
    /// zero disables resigning.
    pub resign_pct: i32,
    /// Seed for the search RNG (position hashing is seeded separately and
    /// deterministically).
    pub rng_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            num_threads: num_cpus::get().clamp(1, MAX_THREADS),
            max_playouts: 1600,
            max_visits: usize::MAX,
            puct: 0.8,
            softmax_temp: 1.0,
            fpu_reduction: 0.25,
            noise: true,
            random_cnt: 0,
            resign_pct: -1,
            rng_seed: 0x5eed,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads.clamp(1, num_cpus::get().clamp(1, MAX_THREADS));
        self
    }

    pub fn max_playouts(mut self, max_playouts: usize) -> Self {
        self.max_playouts = max_playouts;
        self
    }

    pub fn max_visits(mut self, max_visits: usize) -> Self {
        self.max_visits = max_visits;
        self
    }

    pub fn puct(mut self, puct: f32) -> Self {
        self.puct = puct;
        self
    }

    pub fn softmax_temp(mut self, softmax_temp: f32) -> Self {
        self.softmax_temp = softmax_temp;
        self
    }

    pub fn fpu_reduction(mut self, fpu_reduction: f32) -> Self {
        self.fpu_reduction = fpu_reduction;
        self
    }

    pub fn noise(mut self, noise: bool) -> Self {
        self.noise = noise;
        self
    }

    pub fn random_cnt(mut self, random_cnt: usize) -> Self {
        self.random_cnt = random_cnt;
        self
    }

    pub fn resign_pct(mut self, resign_pct: i32) -> Self {
        self.resign_pct = resign_pct.min(100);
        self
    }

    pub fn rng_seed(mut self, rng_seed: u64) -> Self {
        self.rng_seed = rng_seed;
        self
    }
}

/// Time settings as handed over by the protocol front end. The search core
/// runs on playout/visit budgets; this is stored so a front end can read its
/// own settings back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct TimeControl {
    pub main_time: u32,
    pub byo_yomi_time: u32,
    pub byo_yomi_stones: u32,
    pub byo_yomi_periods: u32,
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chains() {
        let config = EngineConfig::new()
            .max_playouts(800)
            .puct(1.1)
            .noise(false)
            .resign_pct(250)
            .rng_seed(42);
        assert_eq!(config.max_playouts, 800);
        assert_eq!(config.puct, 1.1);
        assert!(!config.noise);
        assert_eq!(config.resign_pct, 100);
        assert_eq!(config.rng_seed, 42);
    }

    #[test]
    fn threads_are_clamped() {
        let config = EngineConfig::new().num_threads(10_000);
        assert!(config.num_threads <= MAX_THREADS);
        assert!(config.num_threads >= 1);
        assert_eq!(EngineConfig::new().num_threads(0).num_threads, 1);
    }
}
