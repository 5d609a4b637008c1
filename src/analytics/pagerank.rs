use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use super::{all_local, global_vertex_count, out_degree};
use crate::comm::{GasEngine, ScalarOp};
use crate::error::{GasError, Result};
use crate::graph::Graph;
use crate::transport::Transport;
use crate::types::{Direction, VertexId};

/// Damping factor used by the reporting layer.
pub const DEFAULT_DAMPING: f64 = 0.85;

/// Runs `iterations` synchronous PageRank rounds.
///
/// Ranks start at `1 / N`. Each round a vertex's master computes
/// `(1 - damping) / N + damping * sum(rank(u) / outdeg(u))` over its in-neighbours `u` and
/// pushes the result to every replica. Returns the ranks of the vertices mastered here.
pub fn pagerank<V: VertexId, T: Transport>(
    engine: &GasEngine<'_, V, T>,
    iterations: usize,
    damping: f64,
) -> Result<BTreeMap<V, f64>> {
    if !(0.0..=1.0).contains(&damping) {
        return Err(GasError::InvalidArgument(format!(
            "damping {damping} is outside [0, 1]"
        )));
    }
    let replicas = engine.replicas();
    let n = global_vertex_count(engine.comm(), replicas)?.max(1) as f64;
    let out_deg = out_degree(engine)?;
    let active = all_local(engine);
    let mut ranks: BTreeMap<V, f64> = active.iter().map(|&v| (v, 1.0 / n)).collect();

    for iteration in 0..iterations {
        let prev = &ranks;
        let contributions = engine.gather_scalar(
            &active,
            ScalarOp::Sum,
            &|graph: &Graph<V>, active: &BTreeSet<V>| {
                active
                    .iter()
                    .map(|&v| {
                        let sum: f64 = graph
                            .neighbors(v, Direction::In)
                            .into_iter()
                            .map(|u| {
                                let degree = out_deg.get(&u).copied().unwrap_or(1).max(1);
                                prev.get(&u).copied().unwrap_or(0.0) / degree as f64
                            })
                            .sum();
                        (v, sum)
                    })
                    .collect::<BTreeMap<V, f64>>()
            },
        )?;

        let mut next: BTreeMap<V, f64> = active
            .iter()
            .filter(|&&v| replicas.is_master(v))
            .map(|&v| {
                let sum = contributions.get(&v).copied().unwrap_or(0.0);
                (v, (1.0 - damping) / n + damping * sum)
            })
            .collect();
        engine.apply_scalar(&active, &mut next)?;
        ranks = next;
        debug!(rank = engine.comm().rank(), iteration, "analytics.pagerank.iteration");
    }

    ranks.retain(|v, _| replicas.is_master(*v));
    info!(
        rank = engine.comm().rank(),
        iterations,
        masters = ranks.len(),
        "analytics.pagerank.done"
    );
    Ok(ranks)
}
