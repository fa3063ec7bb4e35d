use rand::rngs::StdRng;
use rand::Rng;
use rand_core::SeedableRng;
use std::sync::OnceLock;

use crate::board::{Color, BOARD_SQ};

// Hashing must be stable across runs and configurations: cache entries and
// superko histories are keyed by these values. The fill therefore uses a
// fixed seed rather than the engine's search seed.
const HASH_SEED: u64 = 5489;

////////////////////////////////////////////////////////////////////////////////////////

pub struct ZobristTable {
    // One key per (color, square), including a distinct key for Empty so
    // that vacating a square changes the hash.
    keys: [Box<[u64; BOARD_SQ]>; 3],
    base: u64,
}

impl ZobristTable {
    fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut fill = || {
            let mut keys = Box::new([0u64; BOARD_SQ]);
            for k in keys.iter_mut() {
                *k = rng.gen::<u64>();
            }
            keys
        };

        let black = fill();
        let white = fill();
        let empty = fill();
        let base = rng.gen::<u64>();

        ZobristTable {
            keys: [black, white, empty],
            base,
        }
    }

    #[inline(always)]
    pub fn key(&self, color: Color, vertex: usize) -> u64 {
        debug_assert!(vertex < BOARD_SQ);
        self.keys[color as usize][vertex]
    }

    /// Constant folded into every position hash.
    #[inline(always)]
    pub fn base_hash(&self) -> u64 {
        self.base
    }

    /// Hash of a board with every square empty.
    #[inline]
    pub fn empty_board(&self) -> u64 {
        let mut hash = self.base;
        for v in 0..BOARD_SQ {
            hash ^= self.key(Color::Empty, v);
        }
        hash
    }
}

////////////////////////////////////////////////////////////////////////////////////////

struct LazyZobristTable {
    once: OnceLock<ZobristTable>,
    seed: u64,
}

impl LazyZobristTable {
    const fn new(seed: u64) -> Self {
        LazyZobristTable {
            once: OnceLock::new(),
            seed,
        }
    }

    #[inline(always)]
    fn get_or_init(&self) -> &ZobristTable {
        self.once.get_or_init(|| ZobristTable::new(self.seed))
    }
}

static ZOBRIST: LazyZobristTable = LazyZobristTable::new(HASH_SEED);

#[inline(always)]
pub fn zobrist() -> &'static ZobristTable {
    ZOBRIST.get_or_init()
}

////////////////////////////////////////////////////////////////////////////////////////
