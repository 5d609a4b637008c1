//! Stateless edge placement functions.

use crate::types::{Edge, VertexId};

#[inline]
fn modulo(raw: i64, workers: usize) -> usize {
    raw.rem_euclid(workers as i64) as usize
}

/// Owner by source hash.
pub fn one_d<V: VertexId>(workers: usize, edge: &Edge<V>) -> usize {
    modulo(edge.src.to_i64(), workers)
}

/// Owner by destination hash.
pub fn one_d_dst<V: VertexId>(workers: usize, edge: &Edge<V>) -> usize {
    modulo(edge.dst.to_i64(), workers)
}

/// Pairing of `(2·src, 2·dst)` reduced modulo the worker count.
///
/// The branch for `a >= b` keeps the full `a² + a + b` term; the other branch halves.
pub fn random_vertex_cut<V: VertexId>(workers: usize, edge: &Edge<V>) -> usize {
    pair_owner(workers, edge.src.to_i64(), edge.dst.to_i64())
}

/// Random vertex cut on `(min, max)` so both orientations land together.
pub fn canonical_random<V: VertexId>(workers: usize, edge: &Edge<V>) -> usize {
    let (a, b) = (edge.src.to_i64(), edge.dst.to_i64());
    pair_owner(workers, a.min(b), a.max(b))
}

fn pair_owner(workers: usize, src: i64, dst: i64) -> usize {
    let a = (src as u64).wrapping_mul(2);
    let b = (dst as u64).wrapping_mul(2);
    let c = if a >= b {
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    } else {
        a.wrapping_add(b.wrapping_mul(b)) / 2
    };
    (c % workers as u64) as usize
}

/// PowerGraph grid placement with a ragged last row when `workers` is not a square.
pub fn grid<V: VertexId>(workers: usize, edge: &Edge<V>) -> usize {
    let src = edge.src.to_i64();
    let dst = edge.dst.to_i64();
    let side = ceil_sqrt(workers);
    if side * side == workers {
        let row = modulo(src, side);
        let col = modulo(dst, side);
        return (row * side + col) % workers;
    }
    let cols = side;
    let rows = workers.div_ceil(cols);
    let last_row_cols = workers - (rows - 1) * cols;
    let row = modulo(src, workers) / cols;
    let col = if row < rows - 1 {
        modulo(dst, cols)
    } else {
        modulo(dst, last_row_cols)
    };
    cols * row + col
}

fn ceil_sqrt(n: usize) -> usize {
    let mut root = (n as f64).sqrt() as usize;
    while root * root < n {
        root += 1;
    }
    while root > 1 && (root - 1) * (root - 1) >= n {
        root -= 1;
    }
    root
}
