//! Gather, apply, and scatter over a resolved replica layout.
//!
//! Active sets must agree across replicas: if a vertex is active on one worker holding it,
//! it is active on every worker holding it. The send and receive counts that end each
//! phase are derived from that agreement.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Add, Mul};

use tracing::debug;

use super::Communicator;
use crate::codec::{from_bytes, to_bytes, Wire};
use crate::error::{GasError, Result};
use crate::graph::Graph;
use crate::profile::ProfileKind;
use crate::replica::ReplicaMap;
use crate::transport::{Tag, Transport};
use crate::types::VertexId;

/// Wire code of the vector merge operator.
pub const MERGE_OP_CODE: u16 = 109;

/// Values combinable by the scalar gather operators.
pub trait Scalar: Wire + Copy + PartialOrd + Add<Output = Self> + Mul<Output = Self> {}

impl<T> Scalar for T where T: Wire + Copy + PartialOrd + Add<Output = T> + Mul<Output = T> {}

/// Associative, commutative operators for scalar gathers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScalarOp {
    /// Addition.
    Sum,
    /// Multiplication.
    Product,
    /// Maximum.
    Max,
    /// Minimum.
    Min,
}

impl ScalarOp {
    /// Wire code of the operator.
    pub fn code(self) -> u16 {
        match self {
            ScalarOp::Sum => 100,
            ScalarOp::Product => 101,
            ScalarOp::Max => 104,
            ScalarOp::Min => 105,
        }
    }

    /// Folds `value` into `acc`.
    pub fn combine<W: Scalar>(self, acc: W, value: W) -> W {
        match self {
            ScalarOp::Sum => acc + value,
            ScalarOp::Product => acc * value,
            ScalarOp::Max => {
                if value > acc {
                    value
                } else {
                    acc
                }
            }
            ScalarOp::Min => {
                if value < acc {
                    value
                } else {
                    acc
                }
            }
        }
    }
}

/// Local half of a gather: the partial value of each active vertex on this worker.
pub trait LocalGather<V, W> {
    /// Produces partial values for (a subset of) `active`.
    fn gather(&self, graph: &Graph<V>, active: &BTreeSet<V>) -> BTreeMap<V, W>;
}

impl<V, W, F> LocalGather<V, W> for F
where
    F: Fn(&Graph<V>, &BTreeSet<V>) -> BTreeMap<V, W>,
{
    fn gather(&self, graph: &Graph<V>, active: &BTreeSet<V>) -> BTreeMap<V, W> {
        self(graph, active)
    }
}

/// Scatter step: chooses next round's active set from the current one.
pub trait LocalScatter<V> {
    /// Returns the vertices to activate next.
    fn scatter(&self, graph: &Graph<V>, active: &BTreeSet<V>) -> BTreeSet<V>;
}

impl<V, F> LocalScatter<V> for F
where
    F: Fn(&Graph<V>, &BTreeSet<V>) -> BTreeSet<V>,
{
    fn scatter(&self, graph: &Graph<V>, active: &BTreeSet<V>) -> BTreeSet<V> {
        self(graph, active)
    }
}

/// Binds a local graph and its replica layout to a communicator.
pub struct GasEngine<'a, V, T> {
    graph: &'a Graph<V>,
    replicas: &'a ReplicaMap<V>,
    comm: &'a Communicator<T>,
}

impl<'a, V: VertexId, T: Transport> GasEngine<'a, V, T> {
    /// Creates an engine over borrowed state; nothing is copied.
    pub fn new(graph: &'a Graph<V>, replicas: &'a ReplicaMap<V>, comm: &'a Communicator<T>) -> Self {
        Self {
            graph,
            replicas,
            comm,
        }
    }

    /// Local graph.
    pub fn graph(&self) -> &'a Graph<V> {
        self.graph
    }

    /// Replica layout.
    pub fn replicas(&self) -> &'a ReplicaMap<V> {
        self.replicas
    }

    /// Communicator.
    pub fn comm(&self) -> &'a Communicator<T> {
        self.comm
    }

    /// Scalar gather. Returns the combined value of every active vertex mastered here.
    ///
    /// Vertices for which no worker produced a partial value are absent from the result.
    pub fn gather_scalar<W, G>(
        &self,
        active: &BTreeSet<V>,
        op: ScalarOp,
        local: &G,
    ) -> Result<BTreeMap<V, W>>
    where
        W: Scalar,
        G: LocalGather<V, W> + ?Sized,
    {
        debug!(
            rank = self.comm.rank(),
            active = active.len(),
            op = op.code(),
            "gas.gather.start"
        );
        let partial = self.run_local(active, local);
        self.aggregate(
            active,
            partial,
            self.comm.options().scalar_send_slots,
            |acc, value| *acc = op.combine(*acc, value),
        )
    }

    /// Vector gather with list concatenation; the master's own list comes first.
    pub fn gather_merge<W, G>(&self, active: &BTreeSet<V>, local: &G) -> Result<BTreeMap<V, Vec<W>>>
    where
        W: Wire,
        G: LocalGather<V, Vec<W>> + ?Sized,
    {
        debug!(
            rank = self.comm.rank(),
            active = active.len(),
            op = MERGE_OP_CODE,
            "gas.gather.start"
        );
        let partial = self.run_local(active, local);
        self.aggregate(
            active,
            partial,
            self.comm.options().vector_send_slots,
            |acc: &mut Vec<W>, value| acc.extend(value),
        )
    }

    /// Pushes master values of active vertices to their slaves, which overwrite.
    ///
    /// A master without a value clears the slaves' copy.
    pub fn apply_scalar<W: Wire + Clone>(
        &self,
        active: &BTreeSet<V>,
        values: &mut BTreeMap<V, W>,
    ) -> Result<()> {
        self.push_to_slaves(active, values, self.comm.options().scalar_send_slots)
    }

    /// Vector counterpart of [`GasEngine::apply_scalar`].
    pub fn apply_vector<W: Wire + Clone>(
        &self,
        active: &BTreeSet<V>,
        values: &mut BTreeMap<V, Vec<W>>,
    ) -> Result<()> {
        self.push_to_slaves(active, values, self.comm.options().vector_send_slots)
    }

    /// Local scatter; no messages are exchanged.
    pub fn scatter<S: LocalScatter<V> + ?Sized>(&self, active: &BTreeSet<V>, local: &S) -> BTreeSet<V> {
        self.comm
            .profiler()
            .time(ProfileKind::Local, || local.scatter(self.graph, active))
    }

    fn run_local<W, G>(&self, active: &BTreeSet<V>, local: &G) -> BTreeMap<V, W>
    where
        G: LocalGather<V, W> + ?Sized,
    {
        self.comm
            .profiler()
            .time(ProfileKind::Local, || local.gather(self.graph, active))
    }

    fn aggregate<P: Wire>(
        &self,
        active: &BTreeSet<V>,
        mut partial: BTreeMap<V, P>,
        slot_count: usize,
        mut combine: impl FnMut(&mut P, P),
    ) -> Result<BTreeMap<V, P>> {
        let mut out = BTreeMap::new();
        let mut outgoing = Vec::new();
        let mut expected_recv = 0usize;
        for &v in active {
            if let Some(master) = self.replicas.master_of(v) {
                outgoing.push((master, to_bytes(&(v, partial.remove(&v)))));
            } else if let Some(slaves) = self.replicas.slaves_of(v) {
                expected_recv += slaves.len();
                if let Some(own) = partial.remove(&v) {
                    out.insert(v, own);
                }
            }
        }

        let replicas = self.replicas;
        self.comm.run_phase(
            Tag::Aggregate,
            slot_count,
            outgoing,
            expected_recv,
            |peer, bytes| {
                let (v, value): (V, Option<P>) = from_bytes(&bytes)?;
                if !replicas.is_master(v) {
                    return Err(GasError::misrouted(
                        peer,
                        format!("partial for {v}, which is not mastered here"),
                    ));
                }
                if let Some(value) = value {
                    match out.entry(v) {
                        Entry::Vacant(slot) => {
                            slot.insert(value);
                        }
                        Entry::Occupied(mut slot) => combine(slot.get_mut(), value),
                    }
                }
                Ok(())
            },
        )?;
        Ok(out)
    }

    fn push_to_slaves<P: Wire + Clone>(
        &self,
        active: &BTreeSet<V>,
        values: &mut BTreeMap<V, P>,
        slot_count: usize,
    ) -> Result<()> {
        let mut outgoing = Vec::new();
        let mut expected_recv = 0usize;
        for &v in active {
            if let Some(slaves) = self.replicas.slaves_of(v) {
                if slaves.is_empty() {
                    continue;
                }
                let payload = to_bytes(&(v, values.get(&v).cloned()));
                for &slave in slaves {
                    outgoing.push((slave, payload.clone()));
                }
            } else if self.replicas.master_of(v).is_some() {
                expected_recv += 1;
            }
        }
        debug!(
            rank = self.comm.rank(),
            sends = outgoing.len(),
            expected_recv,
            "gas.apply.start"
        );

        let replicas = self.replicas;
        self.comm.run_phase(
            Tag::Apply,
            slot_count,
            outgoing,
            expected_recv,
            |peer, bytes| {
                let (v, value): (V, Option<P>) = from_bytes(&bytes)?;
                if replicas.master_of(v) != Some(peer) {
                    return Err(GasError::misrouted(
                        peer,
                        format!("apply push for {v} from a rank that is not its master"),
                    ));
                }
                match value {
                    Some(value) => {
                        values.insert(v, value);
                    }
                    None => {
                        values.remove(&v);
                    }
                }
                Ok(())
            },
        )
    }
}
