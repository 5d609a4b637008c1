use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::all_local;
use crate::comm::{GasEngine, ScalarOp};
use crate::error::Result;
use crate::graph::Graph;
use crate::transport::Transport;
use crate::types::{Direction, VertexId};

fn gather_degree<V: VertexId, T: Transport>(
    engine: &GasEngine<'_, V, T>,
    active: &BTreeSet<V>,
    direction: Direction,
) -> Result<BTreeMap<V, u64>> {
    engine.gather_scalar(
        active,
        ScalarOp::Sum,
        &|graph: &Graph<V>, active: &BTreeSet<V>| {
            active
                .iter()
                .map(|&v| (v, graph.degree(v, direction) as u64))
                .collect::<BTreeMap<V, u64>>()
        },
    )
}

/// Global in-degree of every vertex mastered on this rank.
pub fn in_degree<V: VertexId, T: Transport>(engine: &GasEngine<'_, V, T>) -> Result<BTreeMap<V, u64>> {
    let degrees = gather_degree(engine, &all_local(engine), Direction::In)?;
    debug!(rank = engine.comm().rank(), masters = degrees.len(), "analytics.in_degree.done");
    Ok(degrees)
}

/// Global out-degree of every local vertex, masters and slaves alike.
pub fn out_degree<V: VertexId, T: Transport>(engine: &GasEngine<'_, V, T>) -> Result<BTreeMap<V, u64>> {
    let active = all_local(engine);
    let mut degrees = gather_degree(engine, &active, Direction::Out)?;
    engine.apply_scalar(&active, &mut degrees)?;
    debug!(rank = engine.comm().rank(), vertices = degrees.len(), "analytics.out_degree.done");
    Ok(degrees)
}
