//! Graph analytics expressed as gather, apply, and scatter rounds.
//!
//! Every function here is collective: all ranks call it with engines over the same
//! cluster, and per-vertex results are reported by each vertex's master.

pub mod coloring;
pub mod degree;
pub mod neighbors;
pub mod pagerank;
pub mod triangles;
pub mod walk;

use std::collections::BTreeSet;

pub use coloring::greedy_coloring;
pub use degree::{in_degree, out_degree};
pub use neighbors::{all_pair_common_neighbors, CommonNeighbors};
pub use pagerank::{pagerank, DEFAULT_DAMPING};
pub use triangles::{global_clustering_coefficient, triangles};
pub use walk::{random_walks, PathRecord, WalkToken};

use crate::comm::{Communicator, GasEngine};
use crate::error::Result;
use crate::graph::Graph;
use crate::replica::ReplicaMap;
use crate::transport::Transport;
use crate::types::VertexId;

/// Input edges across the cluster. Mirrored halves of undirected edges are not counted.
pub fn global_edge_count<V: VertexId, T: Transport>(
    comm: &Communicator<T>,
    graph: &Graph<V>,
) -> Result<u64> {
    let local = if graph.is_directed() {
        graph.edge_count()
    } else {
        graph.edge_count() / 2
    };
    Ok(comm.all_reduce_sum_u64(&[local as u64])?[0])
}

/// Distinct vertices across the cluster, counted once at their master.
pub fn global_vertex_count<V: VertexId, T: Transport>(
    comm: &Communicator<T>,
    replicas: &ReplicaMap<V>,
) -> Result<u64> {
    Ok(comm.all_reduce_sum_u64(&[replicas.master_count() as u64])?[0])
}

/// Every local vertex; the usual starting active set.
pub(crate) fn all_local<V: VertexId, T: Transport>(engine: &GasEngine<'_, V, T>) -> BTreeSet<V> {
    engine.graph().vertices().clone()
}
