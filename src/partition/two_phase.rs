//! Second phase of the PowerLyra strategies.
//!
//! Both run after a destination-hash pass, so every in-edge of a destination is local
//! and its in-degree is exact.

use std::collections::{BTreeMap, BTreeSet};

use super::hash;
use crate::types::{Edge, VertexId};

fn group_by_destination<V: VertexId>(edges: &[Edge<V>]) -> BTreeMap<V, Vec<Edge<V>>> {
    let mut groups: BTreeMap<V, Vec<Edge<V>>> = BTreeMap::new();
    for edge in edges {
        groups.entry(edge.dst).or_default().push(*edge);
    }
    groups
}

/// Hybrid cut: low in-degree destinations stay on `rank`, the rest go by source hash.
pub fn hybrid<V: VertexId>(
    edges: &[Edge<V>],
    rank: usize,
    workers: usize,
    threshold: usize,
) -> Vec<Vec<Edge<V>>> {
    let mut buckets = vec![Vec::new(); workers];
    for (_, group) in group_by_destination(edges) {
        if group.len() <= threshold {
            buckets[rank].extend(group);
        } else {
            for edge in group {
                buckets[hash::one_d(workers, &edge)].push(edge);
            }
        }
    }
    buckets
}

/// Global totals the Ginger score normalizes by.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GraphTotals {
    /// Distinct vertices across the cluster.
    pub vertices: u64,
    /// Input edges across the cluster.
    pub edges: u64,
}

/// Ginger: low in-degree destinations are placed greedily, the rest by source hash.
///
/// The greedy score for candidate partition `p` is
/// `|Vp ∩ in-neighbours(dst)| - (|Vp| + V·|Ep| / E) / 2`, highest first, lowest index on ties.
/// `Vp` and `Ep` are the vertices and edges placed into `p` by this call so far.
pub fn ginger<V: VertexId>(
    edges: &[Edge<V>],
    workers: usize,
    threshold: usize,
    totals: GraphTotals,
) -> Vec<Vec<Edge<V>>> {
    let mut buckets: Vec<Vec<Edge<V>>> = vec![Vec::new(); workers];
    let mut placed: Vec<BTreeSet<V>> = vec![BTreeSet::new(); workers];
    let all_v = totals.vertices as f64;
    let all_e = totals.edges.max(1) as f64;

    for (_, group) in group_by_destination(edges) {
        let target = if group.len() <= threshold {
            let sources: BTreeSet<V> = group.iter().map(|e| e.src).collect();
            let mut best = 0;
            let mut best_score = f64::NEG_INFINITY;
            for p in 0..workers {
                let shared = placed[p].intersection(&sources).count() as f64;
                let vp = placed[p].len() as f64;
                let ep = buckets[p].len() as f64;
                let score = shared - (vp + all_v * ep / all_e) / 2.0;
                if score > best_score {
                    best_score = score;
                    best = p;
                }
            }
            Some(best)
        } else {
            None
        };
        for edge in group {
            let p = target.unwrap_or_else(|| hash::one_d(workers, &edge));
            placed[p].insert(edge.src);
            placed[p].insert(edge.dst);
            buckets[p].push(edge);
        }
    }
    buckets
}
