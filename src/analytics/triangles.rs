//! Triangle counting and the global clustering coefficient.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use super::{all_local, global_vertex_count};
use crate::comm::GasEngine;
use crate::error::Result;
use crate::graph::Graph;
use crate::transport::Transport;
use crate::types::{Direction, VertexId};

/// Full neighbour lists of every local vertex, replicated to every worker holding it.
pub(crate) fn replicated_neighbors<V: VertexId, T: Transport>(
    engine: &GasEngine<'_, V, T>,
    active: &BTreeSet<V>,
) -> Result<BTreeMap<V, Vec<V>>> {
    let mut merged = engine.gather_merge(active, &|graph: &Graph<V>, active: &BTreeSet<V>| {
        active
            .iter()
            .map(|&v| (v, graph.neighbors(v, Direction::Both)))
            .collect::<BTreeMap<V, Vec<V>>>()
    })?;
    engine.apply_vector(active, &mut merged)?;
    Ok(merged)
}

/// Number of triangles in the whole graph, ignoring edge direction.
///
/// Each local edge contributes the common neighbours of its endpoints, divided by the
/// number of parallel edges between them; the cluster sum counts every triangle three times.
pub fn triangles<V: VertexId, T: Transport>(engine: &GasEngine<'_, V, T>) -> Result<f64> {
    let graph = engine.graph();
    let neighbors = replicated_neighbors(engine, &all_local(engine))?;
    let sets: BTreeMap<V, BTreeSet<V>> = neighbors
        .iter()
        .map(|(&v, list)| (v, list.iter().copied().filter(|&u| u != v).collect()))
        .collect();
    let empty = BTreeSet::new();

    let mut local = 0.0;
    for edge in graph.edges() {
        if edge.src == edge.dst || (!graph.is_directed() && edge.src > edge.dst) {
            continue;
        }
        let parallel = neighbors
            .get(&edge.src)
            .map_or(0, |list| list.iter().filter(|&&u| u == edge.dst).count());
        if parallel == 0 {
            continue;
        }
        let src_set = sets.get(&edge.src).unwrap_or(&empty);
        let dst_set = sets.get(&edge.dst).unwrap_or(&empty);
        let common = src_set.intersection(dst_set).count();
        local += common as f64 / parallel as f64;
    }

    let total = engine.comm().all_reduce_sum_f64(&[local])?[0] / 3.0;
    info!(rank = engine.comm().rank(), triangles = total, "analytics.triangles.done");
    Ok(total)
}

/// Triangles divided by the number of vertex triples `n (n - 1) (n - 2) / 6`.
///
/// Zero for graphs with fewer than three vertices.
pub fn global_clustering_coefficient<V: VertexId, T: Transport>(
    engine: &GasEngine<'_, V, T>,
) -> Result<f64> {
    let n = global_vertex_count(engine.comm(), engine.replicas())? as f64;
    let found = triangles(engine)?;
    let triples = n * (n - 1.0) * (n - 2.0) / 6.0;
    Ok(if triples > 0.0 { found / triples } else { 0.0 })
}
