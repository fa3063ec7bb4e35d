use std::sync::OnceLock;

use crate::board::{BOARD_SIZE, BOARD_SQ};

/// The dihedral group of the square board: four rotations/reflections, each
/// with and without a transposition first.
pub const NUM_SYMMETRIES: usize = 8;

/// Image of `vertex` under symmetry `symmetry`; symmetry 0 is the identity.
pub fn rotate_vertex(vertex: usize, symmetry: usize) -> usize {
    debug_assert!(vertex < BOARD_SQ);
    debug_assert!(symmetry < NUM_SYMMETRIES);

    let mut x = vertex % BOARD_SIZE;
    let mut y = vertex / BOARD_SIZE;
    let mut s = symmetry;

    if s >= 4 {
        std::mem::swap(&mut x, &mut y);
        s -= 4;
    }

    let (newx, newy) = match s {
        0 => (x, y),
        1 => (x, BOARD_SIZE - y - 1),
        2 => (BOARD_SIZE - x - 1, y),
        _ => (BOARD_SIZE - x - 1, BOARD_SIZE - y - 1),
    };

    newy * BOARD_SIZE + newx
}

////////////////////////////////////////////////////////////////////////////////

static TABLE: OnceLock<Box<[[u16; BOARD_SQ]; NUM_SYMMETRIES]>> = OnceLock::new();

fn table() -> &'static [[u16; BOARD_SQ]; NUM_SYMMETRIES] {
    TABLE.get_or_init(|| {
        let mut perm = Box::new([[0u16; BOARD_SQ]; NUM_SYMMETRIES]);
        for (s, row) in perm.iter_mut().enumerate() {
            for (v, entry) in row.iter_mut().enumerate() {
                *entry = rotate_vertex(v, s) as u16;
            }
        }
        perm
    })
}

/// Table-backed version of [`rotate_vertex`] for the hot path.
#[inline(always)]
pub fn symmetry_index(symmetry: usize, vertex: usize) -> usize {
    table()[symmetry][vertex] as usize
}

////////////////////////////////////////////////////////////////////////////////
