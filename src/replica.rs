//! Master election for vertices replicated by the vertex cut.
//!
//! On every worker a vertex it holds is either a master (with the list of slave ranks) or a
//! slave (with its master's rank), never both. Across the cluster each held id has exactly
//! one master.

use std::collections::BTreeMap;

use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::comm::Communicator;
use crate::error::Result;
use crate::graph::Graph;
use crate::options::ResolverMode;
use crate::transport::Transport;
use crate::types::VertexId;

/// Slave rank list; most vertices have only a handful of replicas.
pub type SlaveList = SmallVec<[usize; 4]>;

/// Replica ownership as seen from one worker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicaMap<V> {
    slave_to_master: BTreeMap<V, usize>,
    master_to_slave: BTreeMap<V, SlaveList>,
}

impl<V: VertexId> ReplicaMap<V> {
    /// Empty layout.
    pub fn new() -> Self {
        Self {
            slave_to_master: BTreeMap::new(),
            master_to_slave: BTreeMap::new(),
        }
    }

    /// Records `v` as mastered here with the given slave ranks.
    pub fn insert_master(&mut self, v: V, slaves: impl IntoIterator<Item = usize>) {
        self.slave_to_master.remove(&v);
        let mut list: SlaveList = slaves.into_iter().collect();
        list.sort_unstable();
        self.master_to_slave.insert(v, list);
    }

    /// Records `v` as a slave of `master`.
    pub fn insert_slave(&mut self, v: V, master: usize) {
        self.master_to_slave.remove(&v);
        self.slave_to_master.insert(v, master);
    }

    /// Whether this worker masters `v`.
    pub fn is_master(&self, v: V) -> bool {
        self.master_to_slave.contains_key(&v)
    }

    /// Master rank of a vertex held here as a slave.
    pub fn master_of(&self, v: V) -> Option<usize> {
        self.slave_to_master.get(&v).copied()
    }

    /// Slave ranks of a vertex mastered here.
    pub fn slaves_of(&self, v: V) -> Option<&[usize]> {
        self.master_to_slave.get(&v).map(SmallVec::as_slice)
    }

    /// Number of vertices mastered here.
    pub fn master_count(&self) -> usize {
        self.master_to_slave.len()
    }

    /// Number of vertices held here as slaves.
    pub fn slave_count(&self) -> usize {
        self.slave_to_master.len()
    }

    /// Vertices mastered here, ascending.
    pub fn masters(&self) -> impl Iterator<Item = V> + '_ {
        self.master_to_slave.keys().copied()
    }

    /// Vertices held here as slaves with their masters, ascending.
    pub fn slaves(&self) -> impl Iterator<Item = (V, usize)> + '_ {
        self.slave_to_master.iter().map(|(v, m)| (*v, *m))
    }

    /// Resolves with the protocol selected in the communicator's options.
    pub fn resolve<T: Transport>(comm: &Communicator<T>, graph: &Graph<V>) -> Result<Self> {
        match comm.options().resolver {
            ResolverMode::IdRange => Self::resolve_by_id_range(comm, graph),
            ResolverMode::HashExchange => Self::resolve_by_hash_exchange(comm, graph),
        }
    }

    /// One collective round per id from 0 to the global maximum.
    ///
    /// A lone holder becomes master. Among several holders the one with the fewest masters
    /// so far wins, lowest rank on ties. The id range cannot enumerate negative ids, so a
    /// cluster holding any falls back to [`ReplicaMap::resolve_by_hash_exchange`].
    pub fn resolve_by_id_range<T: Transport>(
        comm: &Communicator<T>,
        graph: &Graph<V>,
    ) -> Result<Self> {
        let rank = comm.rank();
        let local_max = graph.max_vertex_id().map_or(-1, VertexId::to_i64);
        let local_min = graph.vertices().first().map_or(0, |v| v.to_i64());
        let bounds = comm.all_reduce_max_i64(&[local_max, local_min.saturating_neg()])?;
        let (global_max, global_min) = (bounds[0], -bounds[1]);
        if global_min < 0 {
            warn!(rank, min_id = global_min, "replica.resolve_by_id_range.negative_ids");
            return Self::resolve_by_hash_exchange(comm, graph);
        }
        let mut map = Self::new();

        for id in 0..=global_max {
            let v = V::from_i64(id);
            let holds = graph.contains_vertex(v);
            let holders = comm.all_gather(&holds)?;
            let candidates: Vec<usize> = holders
                .iter()
                .enumerate()
                .filter_map(|(r, held)| held.then_some(r))
                .collect();
            match candidates.as_slice() {
                [] => {}
                [only] => {
                    if *only == rank {
                        map.insert_master(v, []);
                    }
                }
                _ => {
                    let counts: Vec<u64> = comm.all_gather(&(map.master_count() as u64))?;
                    let master = elect(&candidates, |r| counts[r]);
                    if master == rank {
                        map.insert_master(v, candidates.iter().copied().filter(|r| *r != rank));
                    } else if holds {
                        map.insert_slave(v, master);
                    }
                }
            }
        }
        info!(
            rank,
            max_id = global_max,
            masters = map.master_count(),
            slaves = map.slave_count(),
            "replica.resolve_by_id_range.done"
        );
        Ok(map)
    }

    /// Hash-partitioned election: only held ids travel.
    ///
    /// Each id is sent to rank `id mod size`, which elects the holder it has assigned the
    /// fewest masters to so far (lowest rank on ties) and replies to every holder.
    pub fn resolve_by_hash_exchange<T: Transport>(
        comm: &Communicator<T>,
        graph: &Graph<V>,
    ) -> Result<Self> {
        let (rank, size) = (comm.rank(), comm.size());
        let mut announce: Vec<Vec<(V, usize)>> = vec![Vec::new(); size];
        for &v in graph.vertices() {
            announce[owner_rank(v, size)].push((v, rank));
        }
        let announced = comm.exchange_vec_data(announce)?;

        let mut holders: BTreeMap<V, Vec<usize>> = BTreeMap::new();
        for (v, holder) in announced {
            holders.entry(v).or_default().push(holder);
        }
        let mut assigned = vec![0u64; size];
        let mut replies: Vec<Vec<(V, usize, Vec<usize>)>> = vec![Vec::new(); size];
        for (v, mut ranks) in holders {
            ranks.sort_unstable();
            ranks.dedup();
            let master = elect(&ranks, |r| assigned[r]);
            assigned[master] += 1;
            for &holder in &ranks {
                replies[holder].push((v, master, ranks.clone()));
            }
        }
        debug!(rank, owned = assigned.iter().sum::<u64>(), "replica.hash_exchange.elected");

        let mut map = Self::new();
        for (v, master, ranks) in comm.exchange_vec_data(replies)? {
            if master == rank {
                map.insert_master(v, ranks.into_iter().filter(|r| *r != rank));
            } else {
                map.insert_slave(v, master);
            }
        }
        info!(
            rank,
            masters = map.master_count(),
            slaves = map.slave_count(),
            "replica.resolve_by_hash_exchange.done"
        );
        Ok(map)
    }
}

fn owner_rank<V: VertexId>(v: V, size: usize) -> usize {
    v.to_i64().rem_euclid(size as i64) as usize
}

/// Candidate with the smallest load; the earliest candidate wins ties.
fn elect(candidates: &[usize], load: impl Fn(usize) -> u64) -> usize {
    let mut best = candidates[0];
    for &c in &candidates[1..] {
        if load(c) < load(best) {
            best = c;
        }
    }
    best
}
