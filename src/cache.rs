use rustc_hash::FxHashMap;
use std::sync::Mutex;

use crate::network::NetResult;

/// Entries below this size are not worth evicting over; small playout
/// budgets still see plenty of transpositions near the root.
const MIN_CACHE_SIZE: usize = 50_000;

/// Entries per configured playout. Hits come mostly from the last few
/// moves' searches, so the bound scales with the per-move budget.
const ENTRIES_PER_PLAYOUT: usize = 18;

const NIL: usize = usize::MAX;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub lookups: usize,
    pub hits: usize,
    pub inserts: usize,
}

struct Slot {
    key: u64,
    result: NetResult,
    prev: usize,
    next: usize,
}

struct Inner {
    capacity: usize,
    index: FxHashMap<u64, usize>,
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    stats: CacheStats,
}

/// Bounded position-hash → network-result map shared by all workers.
///
/// Least-recently-used eviction over an intrusive list of slots; one mutex
/// guards the whole structure and is held only for pointer swaps and a map
/// probe.
pub struct EvalCache {
    inner: Mutex<Inner>,
}

impl EvalCache {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        EvalCache {
            inner: Mutex::new(Inner {
                capacity,
                index: FxHashMap::default(),
                slots: Vec::new(),
                free: Vec::new(),
                head: NIL,
                tail: NIL,
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn size_from_playouts(max_playouts: usize) -> usize {
        max_playouts
            .saturating_mul(ENTRIES_PER_PLAYOUT)
            .max(MIN_CACHE_SIZE)
    }

    pub fn lookup(&self, hash: u64) -> Option<NetResult> {
        let mut inner = self.inner.lock().unwrap();
        inner.stats.lookups += 1;
        let slot = match inner.index.get(&hash) {
            Some(&slot) => slot,
            None => return None,
        };
        inner.stats.hits += 1;
        inner.unlink(slot);
        inner.push_front(slot);
        Some(inner.slots[slot].result.clone())
    }

    /// Stores a result, evicting the stalest entry at capacity. A hash that
    /// is already present is left untouched (first evaluation wins; later
    /// ones only differ by symmetry).
    pub fn insert(&self, hash: u64, result: NetResult) {
        let mut inner = self.inner.lock().unwrap();
        if inner.index.contains_key(&hash) {
            return;
        }
        if inner.index.len() >= inner.capacity {
            inner.evict_tail();
        }

        let slot = match inner.free.pop() {
            Some(slot) => {
                inner.slots[slot] = Slot {
                    key: hash,
                    result,
                    prev: NIL,
                    next: NIL,
                };
                slot
            }
            None => {
                inner.slots.push(Slot {
                    key: hash,
                    result,
                    prev: NIL,
                    next: NIL,
                });
                inner.slots.len() - 1
            }
        };
        inner.index.insert(hash, slot);
        inner.push_front(slot);
        inner.stats.inserts += 1;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.index.clear();
        inner.slots.clear();
        inner.free.clear();
        inner.head = NIL;
        inner.tail = NIL;
        inner.stats = CacheStats::default();
    }
}

impl Inner {
    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.slots[slot].prev, self.slots[slot].next);
        match prev {
            NIL => self.head = next,
            p => self.slots[p].next = next,
        }
        match next {
            NIL => self.tail = prev,
            n => self.slots[n].prev = prev,
        }
        self.slots[slot].prev = NIL;
        self.slots[slot].next = NIL;
    }

    fn push_front(&mut self, slot: usize) {
        self.slots[slot].prev = NIL;
        self.slots[slot].next = self.head;
        match self.head {
            NIL => self.tail = slot,
            h => self.slots[h].prev = slot,
        }
        self.head = slot;
    }

    fn evict_tail(&mut self) {
        let tail = self.tail;
        debug_assert_ne!(tail, NIL);
        let key = self.slots[tail].key;
        self.unlink(tail);
        self.index.remove(&key);
        self.free.push(tail);
    }
}

////////////////////////////////////////////////////////////////////////////////
