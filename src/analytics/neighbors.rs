use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::{all_local, triangles::replicated_neighbors};
use crate::comm::GasEngine;
use crate::error::Result;
use crate::transport::Transport;
use crate::types::VertexId;

/// Ordered vertex pairs mapped to the vertices adjacent to both.
pub type CommonNeighbors<V> = BTreeMap<(V, V), BTreeSet<V>>;

/// All-pair common neighbours, as seen from the vertices mastered here.
///
/// For every master `v` and every ordered pair `(a, b)` of distinct positions in `v`'s
/// neighbour list, `v` is recorded under `(a, b)`. Merging the maps of all ranks yields the
/// cluster-wide relation.
pub fn all_pair_common_neighbors<V: VertexId, T: Transport>(
    engine: &GasEngine<'_, V, T>,
) -> Result<CommonNeighbors<V>> {
    let replicas = engine.replicas();
    let neighbors = replicated_neighbors(engine, &all_local(engine))?;

    let mut pairs: CommonNeighbors<V> = BTreeMap::new();
    for (&v, list) in neighbors.iter().filter(|(v, _)| replicas.is_master(**v)) {
        for (i, &a) in list.iter().enumerate() {
            for (j, &b) in list.iter().enumerate() {
                if i != j {
                    pairs.entry((a, b)).or_default().insert(v);
                }
            }
        }
    }
    debug!(rank = engine.comm().rank(), pairs = pairs.len(), "analytics.apcn.done");
    Ok(pairs)
}
