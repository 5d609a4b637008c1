//! Distributed random-walk sampling.
//!
//! A walk is a token carried from master to master. The worker mastering the current pivot
//! samples one of its out-neighbours, forwards the token to that neighbour's master, and
//! reports the new vertex to the master of the walk's source, which assembles the path.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::all_local;
use crate::codec::{Cursor, Wire};
use crate::comm::GasEngine;
use crate::error::Result;
use crate::graph::Graph;
use crate::replica::ReplicaMap;
use crate::transport::Transport;
use crate::types::{Direction, VertexId};

/// In-flight walk state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WalkToken<V> {
    /// Start vertex of the walk.
    pub source: V,
    /// Rank mastering `source`, where path records are sent.
    pub source_master: usize,
    /// Vertex the next hop starts from.
    pub pivot: V,
    /// Vertices still to be added, counting the one the next hop produces.
    pub remaining: u32,
}

/// One hop reported back to the walk's source master.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PathRecord<V> {
    /// Start vertex of the walk.
    pub source: V,
    /// Vertex appended to the path.
    pub next: V,
}

impl<V: VertexId> Wire for WalkToken<V> {
    fn encode(&self, out: &mut Vec<u8>) {
        self.source.encode(out);
        self.source_master.encode(out);
        self.pivot.encode(out);
        self.remaining.encode(out);
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            source: V::decode(cur)?,
            source_master: usize::decode(cur)?,
            pivot: V::decode(cur)?,
            remaining: u32::decode(cur)?,
        })
    }
}

impl<V: VertexId> Wire for PathRecord<V> {
    fn encode(&self, out: &mut Vec<u8>) {
        self.source.encode(out);
        self.next.encode(out);
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            source: V::decode(cur)?,
            next: V::decode(cur)?,
        })
    }
}

fn master_rank<V: VertexId>(replicas: &ReplicaMap<V>, rank: usize, v: V) -> usize {
    replicas.master_of(v).unwrap_or(rank)
}

/// Samples one walk of `walk_len` vertices from every vertex, including the start vertex.
///
/// A walk stops early at a vertex without out-neighbours. Walk lengths below two yield the
/// start vertex alone. The generator is seeded with `walk_seed + rank`, so repeated runs over
/// the same layout produce the same paths. Returns the paths of the sources mastered here.
pub fn random_walks<V: VertexId, T: Transport>(
    engine: &GasEngine<'_, V, T>,
    walk_len: usize,
) -> Result<BTreeMap<V, Vec<V>>> {
    let (replicas, comm) = (engine.replicas(), engine.comm());
    let (rank, size) = (comm.rank(), comm.size());
    let mut rng = ChaCha8Rng::seed_from_u64(comm.options().walk_seed.wrapping_add(rank as u64));

    let mut out_neighbors = engine.gather_merge(&all_local(engine), &|graph: &Graph<V>, active: &BTreeSet<V>| {
        active
            .iter()
            .map(|&v| {
                let targets = graph
                    .neighbors(v, Direction::Out)
                    .into_iter()
                    .map(|u| (u, master_rank(replicas, rank, u)))
                    .collect::<Vec<(V, usize)>>();
                (v, targets)
            })
            .collect::<BTreeMap<V, Vec<(V, usize)>>>()
    })?;
    // Merge order depends on message arrival; sort so the seed alone fixes the paths.
    for targets in out_neighbors.values_mut() {
        targets.sort_unstable();
    }

    let mut paths: BTreeMap<V, Vec<V>> = BTreeMap::new();
    let mut queue: VecDeque<WalkToken<V>> = VecDeque::new();
    let hops = u32::try_from(walk_len).unwrap_or(u32::MAX);
    for v in replicas.masters() {
        paths.insert(v, vec![v]);
        if hops >= 2 {
            queue.push_back(WalkToken {
                source: v,
                source_master: rank,
                pivot: v,
                remaining: hops,
            });
        }
    }

    let mut rounds = 0u64;
    while comm.global_active_count(queue.len())? > 0 {
        rounds += 1;
        let mut forward: Vec<Vec<WalkToken<V>>> = vec![Vec::new(); size];
        let mut records: Vec<Vec<PathRecord<V>>> = vec![Vec::new(); size];
        while let Some(token) = queue.pop_front() {
            let candidates = out_neighbors.get(&token.pivot).map_or(&[][..], Vec::as_slice);
            let Some(&(next, next_master)) = candidates.choose(&mut rng) else {
                continue;
            };
            if token.remaining > 2 {
                forward[next_master].push(WalkToken {
                    pivot: next,
                    remaining: token.remaining - 1,
                    ..token
                });
            }
            records[token.source_master].push(PathRecord {
                source: token.source,
                next,
            });
        }
        queue.extend(comm.exchange_vec_data(forward)?);
        for record in comm.exchange_vec_data(records)? {
            paths.entry(record.source).or_default().push(record.next);
        }
        debug!(rank, round = rounds, queued = queue.len(), "analytics.walk.round");
    }
    info!(rank, walks = paths.len(), rounds, "analytics.walk.done");
    Ok(paths)
}
