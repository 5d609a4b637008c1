//! Sharded edge-list loading, partitioning, and redistribution.
//!
//! Each worker reads a contiguous line range of the input, partitions its edges, and ships
//! every bucket to its owner. The final local graph is indexed before this module returns,
//! so callers can resolve replicas straight away.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::codec::{from_bytes, to_bytes};
use crate::comm::Communicator;
use crate::error::{GasError, Result};
use crate::graph::Graph;
use crate::partition::two_phase::{self, GraphTotals};
use crate::partition::{partition_local, PartitionStrategy};
use crate::profile::DataDirection;
use crate::transport::{Tag, Transport};
use crate::types::{Edge, VertexId, UNASSIGNED_EDGE};

/// A worker's partitioned graph plus cluster-wide input totals.
#[derive(Clone, Debug)]
pub struct LoadedGraph<V> {
    /// Local, indexed graph.
    pub graph: Graph<V>,
    /// Distinct vertex ids across the whole input.
    pub total_vertices: u64,
    /// Edge lines across the whole input.
    pub total_edges: u64,
}

/// One input line with its 1-based line number.
pub type NumberedLine = (usize, String);

/// Line range owned by `rank` when `lines` are spread over `size` workers.
///
/// Every rank gets `lines / size` lines and the lowest `lines % size` ranks get one more.
pub fn shard_range(lines: usize, rank: usize, size: usize) -> Range<usize> {
    let base = lines / size;
    let rem = lines % size;
    let start = rank * base + rank.min(rem);
    let len = base + usize::from(rank < rem);
    start..start + len
}

/// Reads this rank's share of the lines of `path`.
pub fn read_shard(path: impl AsRef<Path>, rank: usize, size: usize) -> Result<Vec<NumberedLine>> {
    let path = path.as_ref();
    if size == 0 || rank >= size {
        return Err(GasError::InvalidArgument(format!(
            "rank {rank} is outside a cluster of {size}"
        )));
    }
    let total = BufReader::new(File::open(path)?).lines().try_fold(0usize, |n, line| {
        line.map(|_| n + 1)
    })?;
    let range = shard_range(total, rank, size);

    let mut shard = Vec::with_capacity(range.len());
    for (index, line) in BufReader::new(File::open(path)?)
        .lines()
        .enumerate()
        .skip(range.start)
        .take(range.len())
    {
        shard.push((index + 1, line?));
    }
    debug!(
        rank,
        path = %path.display(),
        total_lines = total,
        first = range.start,
        lines = shard.len(),
        "loader.read_shard.done"
    );
    Ok(shard)
}

/// Parses edge lines. Comments (`#`) and blank lines are skipped; extra tokens are ignored.
pub fn parse_edges<V: VertexId>(lines: &[NumberedLine]) -> Result<Vec<Edge<V>>> {
    let mut edges = Vec::with_capacity(lines.len());
    for (line, content) in lines {
        let trimmed = content.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let malformed = || GasError::Parse {
            line: *line,
            content: content.clone(),
        };
        let mut tokens = trimmed.split_whitespace();
        let src = tokens
            .next()
            .and_then(|t| t.parse::<V>().ok())
            .ok_or_else(malformed)?;
        let dst = tokens
            .next()
            .and_then(|t| t.parse::<V>().ok())
            .ok_or_else(malformed)?;
        edges.push(Edge::new(UNASSIGNED_EDGE, src, dst));
    }
    Ok(edges)
}

/// Loads, partitions, and indexes the graph stored at `path`.
pub fn load_partitioned<V: VertexId, T: Transport>(
    comm: &Communicator<T>,
    path: impl AsRef<Path>,
    directed: bool,
    strategy: PartitionStrategy,
) -> Result<LoadedGraph<V>> {
    let shard = read_shard(path, comm.rank(), comm.size())?;
    if shard.is_empty() {
        warn!(rank = comm.rank(), "loader.read_shard.empty");
    }
    let edges = parse_edges(&shard)?;
    load_edges(comm, edges, directed, strategy)
}

/// Partitions edges already read on this rank and builds the local graph.
///
/// Every rank must call this with the same `directed` and `strategy`.
pub fn load_edges<V: VertexId, T: Transport>(
    comm: &Communicator<T>,
    edges: Vec<Edge<V>>,
    directed: bool,
    strategy: PartitionStrategy,
) -> Result<LoadedGraph<V>> {
    let (rank, size) = (comm.rank(), comm.size());
    let options = comm.options();
    let total_edges = comm.all_reduce_sum_u64(&[edges.len() as u64])?[0];
    let total_vertices = count_distinct_vertices(comm, &edges)?;

    let owned = match strategy {
        PartitionStrategy::Hybrid | PartitionStrategy::Ginger => {
            let by_dst = partition_local(PartitionStrategy::OneDDst, size, &edges, options.hdrf_epsilon)?;
            let grouped = redistribute(comm, by_dst)?;
            let threshold = options.two_phase_threshold;
            let buckets = if strategy == PartitionStrategy::Hybrid {
                two_phase::hybrid(&grouped, rank, size, threshold)
            } else {
                let totals = GraphTotals {
                    vertices: total_vertices,
                    edges: total_edges,
                };
                two_phase::ginger(&grouped, size, threshold, totals)
            };
            redistribute(comm, buckets)?
        }
        single_pass => {
            let buckets = partition_local(single_pass, size, &edges, options.hdrf_epsilon)?;
            redistribute(comm, buckets)?
        }
    };
    comm.barrier()?;

    let mut graph = Graph::new(directed);
    for (index, edge) in owned.iter().enumerate() {
        graph.add_edge_with_vertices((index * size + rank) as i64, edge);
    }
    graph.finalize(rank, size);
    info!(
        rank,
        strategy = %strategy,
        local_edges = owned.len(),
        local_vertices = graph.vertex_count(),
        total_vertices,
        total_edges,
        "loader.load.done"
    );
    Ok(LoadedGraph {
        graph,
        total_vertices,
        total_edges,
    })
}

/// Ships `buckets[i]` to rank `i`; returns the local bucket followed by received edges in
/// root order.
///
/// One round per root: the root scatters bucket sizes, sends every non-empty bucket, and the
/// round closes with a barrier.
fn redistribute<V: VertexId, T: Transport>(
    comm: &Communicator<T>,
    mut buckets: Vec<Vec<Edge<V>>>,
) -> Result<Vec<Edge<V>>> {
    let (rank, size) = (comm.rank(), comm.size());
    let transport = comm.transport();
    let mut owned = std::mem::take(&mut buckets[rank]);

    for root in 0..size {
        if root == rank {
            let counts = buckets.iter().map(|b| to_bytes(&(b.len() as u64))).collect();
            transport.scatter(root, Some(counts))?;
            let mut requests = Vec::new();
            for (dest, bucket) in buckets.iter().enumerate() {
                if dest == rank || bucket.is_empty() {
                    continue;
                }
                let payload = to_bytes(bucket);
                comm.profiler().add_bytes(DataDirection::Sent, payload.len());
                requests.push(transport.isend(dest, Tag::EdgeTransfer, payload)?);
            }
            for request in &requests {
                request.wait();
            }
        } else {
            let count: u64 = from_bytes(&transport.scatter(root, None)?)?;
            if count > 0 {
                let payload = transport.recv(root, Tag::EdgeTransfer)?;
                comm.profiler().add_bytes(DataDirection::Received, payload.len());
                let edges: Vec<Edge<V>> = from_bytes(&payload)?;
                if edges.len() as u64 != count {
                    return Err(GasError::Codec(format!(
                        "rank {root} announced {count} edges but sent {}",
                        edges.len()
                    )));
                }
                owned.extend(edges);
            }
        }
        comm.barrier()?;
    }
    debug!(rank, edges = owned.len(), "loader.redistribute.done");
    Ok(owned)
}

/// Counts distinct endpoint ids across the cluster by hashing each id to one owner rank.
pub fn count_distinct_vertices<V: VertexId, T: Transport>(
    comm: &Communicator<T>,
    edges: &[Edge<V>],
) -> Result<u64> {
    let size = comm.size();
    let mut local = BTreeSet::new();
    for edge in edges {
        local.insert(edge.src);
        local.insert(edge.dst);
    }
    let mut outgoing: Vec<Vec<V>> = vec![Vec::new(); size];
    for v in local {
        outgoing[v.to_i64().rem_euclid(size as i64) as usize].push(v);
    }
    let owned: BTreeSet<V> = comm.exchange_vec_data(outgoing)?.into_iter().collect();
    Ok(comm.all_reduce_sum_u64(&[owned.len() as u64])?[0])
}
