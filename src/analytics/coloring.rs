//! Synchronous round-robin greedy colouring.
//!
//! Each cycle every rank proposes a colour for one of its masters (its frontier pivot). A
//! proposal commits unless an adjacent pivot with a lower id proposed the same colour in the
//! same cycle; rejected pivots retry in the next cycle. The lowest pivot of a cycle always
//! commits, so the loop terminates, and the result is a proper colouring.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use super::all_local;
use crate::comm::GasEngine;
use crate::error::Result;
use crate::graph::Graph;
use crate::transport::Transport;
use crate::types::{Direction, VertexId};

/// Colours every vertex; returns the colours of the vertices mastered here.
pub fn greedy_coloring<V: VertexId, T: Transport>(
    engine: &GasEngine<'_, V, T>,
) -> Result<BTreeMap<V, u32>> {
    let (graph, replicas, comm) = (engine.graph(), engine.replicas(), engine.comm());
    let rank = comm.rank();
    let adjacency = engine.gather_merge(&all_local(engine), &|graph: &Graph<V>, active: &BTreeSet<V>| {
        active
            .iter()
            .map(|&v| (v, graph.neighbors(v, Direction::Both)))
            .collect::<BTreeMap<V, Vec<V>>>()
    })?;

    let frontier: Vec<V> = replicas.masters().collect();
    let mut cursor = 0usize;
    let mut colors: BTreeMap<V, u32> = BTreeMap::new();
    let mut cycles = 0u64;

    while comm.global_active_count(frontier.len() - cursor)? > 0 {
        cycles += 1;
        let pivot = frontier.get(cursor).copied();
        let pivots: Vec<Option<V>> = comm.all_gather(&pivot)?;
        let active: BTreeSet<V> = pivots.iter().flatten().copied().collect();

        let committed = &colors;
        let seen = engine.gather_merge(&active, &|graph: &Graph<V>, active: &BTreeSet<V>| {
            active
                .iter()
                .map(|&v| {
                    let used = graph
                        .neighbors(v, Direction::Both)
                        .into_iter()
                        .filter(|&u| u != v)
                        .filter_map(|u| committed.get(&u).copied())
                        .collect::<Vec<u32>>();
                    (v, used)
                })
                .collect::<BTreeMap<V, Vec<u32>>>()
        })?;

        let proposal = pivot.map(|v| smallest_unused(seen.get(&v).map_or(&[][..], Vec::as_slice)));
        let proposals: Vec<Option<u32>> = comm.all_gather(&proposal)?;

        let can_commit = match (pivot, proposal) {
            (Some(v), Some(color)) => {
                let neighbors = adjacency.get(&v).map_or(&[][..], Vec::as_slice);
                !pivots.iter().zip(&proposals).enumerate().any(|(r, pair)| match pair {
                    (Some(u), Some(other)) => {
                        r != rank && *u < v && *other == color && neighbors.contains(u)
                    }
                    _ => false,
                })
            }
            _ => false,
        };
        let commits: Vec<bool> = comm.all_gather(&can_commit)?;

        for ((pivot, proposal), ok) in pivots.iter().zip(&proposals).zip(&commits) {
            if let (Some(v), Some(color), true) = (pivot, proposal, *ok) {
                if graph.contains_vertex(*v) {
                    colors.insert(*v, *color);
                }
            }
        }
        if can_commit {
            cursor += 1;
        }
        comm.barrier()?;
    }

    colors.retain(|v, _| replicas.is_master(*v));
    debug!(rank, cycles, "analytics.coloring.cycles");
    info!(
        rank,
        colored = colors.len(),
        palette = colors.values().max().map_or(0, |c| c + 1),
        "analytics.coloring.done"
    );
    Ok(colors)
}

fn smallest_unused(used: &[u32]) -> u32 {
    let used: BTreeSet<u32> = used.iter().copied().collect();
    (0..).find(|c| !used.contains(c)).unwrap_or(0)
}
