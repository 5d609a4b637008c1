//! Streaming vertex-cut heuristics that carry state across edges.
//!
//! State lives in explicit objects so independent partition runs never share counters.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::types::{Edge, VertexId};

/// Index of the least-loaded worker among `candidates`; first minimum wins.
fn least_loaded(loads: &[u64], candidates: impl IntoIterator<Item = usize>) -> Option<usize> {
    let mut best: Option<usize> = None;
    for worker in candidates {
        match best {
            Some(current) if loads[current] <= loads[worker] => {}
            _ => best = Some(worker),
        }
    }
    best
}

/// PowerGraph oblivious placement state.
#[derive(Debug, Clone)]
pub struct ObliviousState<V> {
    replicas: FxHashMap<V, BTreeSet<usize>>,
    loads: Vec<u64>,
}

impl<V: VertexId> ObliviousState<V> {
    /// Fresh state for `workers` partitions.
    pub fn new(workers: usize) -> Self {
        Self {
            replicas: FxHashMap::default(),
            loads: vec![0; workers],
        }
    }

    /// Edge count assigned to each worker so far.
    pub fn loads(&self) -> &[u64] {
        &self.loads
    }

    /// Workers currently holding a replica of `v`.
    pub fn replicas_of(&self, v: V) -> Option<&BTreeSet<usize>> {
        self.replicas.get(&v)
    }

    /// Places one edge and updates replica sets and loads.
    pub fn assign(&mut self, edge: &Edge<V>) -> usize {
        let empty = BTreeSet::new();
        let src_set = self.replicas.get(&edge.src).unwrap_or(&empty);
        let dst_set = self.replicas.get(&edge.dst).unwrap_or(&empty);

        let choice = if let Some(w) = least_loaded(&self.loads, src_set.intersection(dst_set).copied()) {
            w
        } else if !src_set.is_empty() || !dst_set.is_empty() {
            // Disjoint or one-sided: candidates are whatever replicas exist.
            least_loaded(&self.loads, src_set.iter().chain(dst_set.iter()).copied())
                .unwrap_or_default()
        } else {
            least_loaded(&self.loads, 0..self.loads.len()).unwrap_or_default()
        };

        self.replicas.entry(edge.src).or_default().insert(choice);
        self.replicas.entry(edge.dst).or_default().insert(choice);
        self.loads[choice] += 1;
        choice
    }
}

/// High-Degree-Replicated-First placement state.
#[derive(Debug, Clone)]
pub struct HdrfState<V> {
    lambda: f64,
    epsilon: f64,
    partial_degree: FxHashMap<V, u64>,
    replicas: FxHashMap<V, BTreeSet<usize>>,
    loads: Vec<u64>,
}

impl<V: VertexId> HdrfState<V> {
    /// Fresh state with balance weight `lambda` and smoothing `epsilon`.
    pub fn new(workers: usize, lambda: f64, epsilon: f64) -> Self {
        Self {
            lambda,
            epsilon,
            partial_degree: FxHashMap::default(),
            replicas: FxHashMap::default(),
            loads: vec![0; workers],
        }
    }

    /// Edge count assigned to each worker so far.
    pub fn loads(&self) -> &[u64] {
        &self.loads
    }

    /// Places one edge, maximizing replication plus balance score.
    pub fn assign(&mut self, edge: &Edge<V>) -> usize {
        let pd_src = {
            let entry = self.partial_degree.entry(edge.src).or_insert(0);
            *entry += 1;
            *entry
        };
        let pd_dst = {
            let entry = self.partial_degree.entry(edge.dst).or_insert(0);
            *entry += 1;
            *entry
        };
        let theta_src = pd_src as f64 / (pd_src + pd_dst) as f64;
        let theta_dst = 1.0 - theta_src;

        let max_load = self.loads.iter().copied().max().unwrap_or(0) as f64;
        let min_load = self.loads.iter().copied().min().unwrap_or(0) as f64;

        let src_set = self.replicas.get(&edge.src);
        let dst_set = self.replicas.get(&edge.dst);
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (worker, load) in self.loads.iter().enumerate() {
            let g_src = if src_set.is_some_and(|s| s.contains(&worker)) {
                2.0 - theta_src
            } else {
                0.0
            };
            let g_dst = if dst_set.is_some_and(|s| s.contains(&worker)) {
                2.0 - theta_dst
            } else {
                0.0
            };
            let balance =
                self.lambda * (max_load - *load as f64) / (self.epsilon + max_load - min_load);
            let score = g_src + g_dst + balance;
            if score > best_score {
                best_score = score;
                best = worker;
            }
        }

        self.replicas.entry(edge.src).or_default().insert(best);
        self.replicas.entry(edge.dst).or_default().insert(best);
        self.loads[best] += 1;
        best
    }
}
