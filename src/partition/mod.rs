//! Vertex-cut and edge-cut placement strategies.
//!
//! Every strategy maps an edge of the local shard to the worker that will own it. The
//! loader then moves each bucket to its owner, so no edge is lost or duplicated.

pub mod hash;
pub mod stream;
pub mod two_phase;

use std::fmt;

use tracing::debug;

pub use stream::{HdrfState, ObliviousState};
pub use two_phase::GraphTotals;

use crate::error::{GasError, Result};
use crate::types::{Edge, VertexId};

/// Closed set of strategies, addressed by small integer ids.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PartitionStrategy {
    /// 0: source hash.
    OneD,
    /// 1: destination hash.
    OneDDst,
    /// 2: pairing hash of `(src, dst)`.
    RandomVertexCut,
    /// 3: pairing hash of `(min, max)`.
    CanonicalRandom,
    /// 4: PowerGraph grid.
    Grid,
    /// 5: PowerLyra hybrid cut.
    Hybrid,
    /// 6: PowerGraph oblivious greedy.
    Oblivious,
    /// 7 to 10: HDRF with the given balance weight.
    Hdrf {
        /// Skew tolerance; larger values favour balance over replication.
        lambda: f64,
    },
    /// 11: PowerLyra Ginger.
    Ginger,
}

const HDRF_LAMBDAS: [(i64, f64); 4] = [(7, 10.0), (8, 20.0), (9, 50.0), (10, 100.0)];

impl PartitionStrategy {
    /// Resolves a numeric strategy id.
    pub fn from_id(id: i64) -> Result<Self> {
        let strategy = match id {
            0 => Self::OneD,
            1 => Self::OneDDst,
            2 => Self::RandomVertexCut,
            3 => Self::CanonicalRandom,
            4 => Self::Grid,
            5 => Self::Hybrid,
            6 => Self::Oblivious,
            11 => Self::Ginger,
            _ => match HDRF_LAMBDAS.iter().find(|(key, _)| *key == id) {
                Some((_, lambda)) => Self::Hdrf { lambda: *lambda },
                None => return Err(GasError::UnknownStrategy(id)),
            },
        };
        Ok(strategy)
    }

    /// Numeric id; HDRF with a non-standard lambda reports 7.
    pub fn id(&self) -> i64 {
        match self {
            Self::OneD => 0,
            Self::OneDDst => 1,
            Self::RandomVertexCut => 2,
            Self::CanonicalRandom => 3,
            Self::Grid => 4,
            Self::Hybrid => 5,
            Self::Oblivious => 6,
            Self::Hdrf { lambda } => HDRF_LAMBDAS
                .iter()
                .find(|(_, l)| l == lambda)
                .map_or(7, |(id, _)| *id),
            Self::Ginger => 11,
        }
    }

    /// Every strategy in id order.
    pub fn all() -> Vec<Self> {
        (0..=11).filter_map(|id| Self::from_id(id).ok()).collect()
    }

    /// Whether the loader must run a destination-hash pass first.
    pub fn is_two_phase(&self) -> bool {
        matches!(self, Self::Hybrid | Self::Ginger)
    }
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneD => write!(f, "1d"),
            Self::OneDDst => write!(f, "1d-dst"),
            Self::RandomVertexCut => write!(f, "random"),
            Self::CanonicalRandom => write!(f, "canonical-random"),
            Self::Grid => write!(f, "grid"),
            Self::Hybrid => write!(f, "hybrid"),
            Self::Oblivious => write!(f, "oblivious"),
            Self::Hdrf { lambda } => write!(f, "hdrf(lambda={lambda})"),
            Self::Ginger => write!(f, "ginger"),
        }
    }
}

/// Splits `edges` into one bucket per worker with a single-pass strategy.
///
/// Two-phase strategies are rejected here; the loader drives them through
/// [`two_phase::hybrid`] and [`two_phase::ginger`] after a destination-hash exchange.
pub fn partition_local<V: VertexId>(
    strategy: PartitionStrategy,
    workers: usize,
    edges: &[Edge<V>],
    hdrf_epsilon: f64,
) -> Result<Vec<Vec<Edge<V>>>> {
    if workers == 0 {
        return Err(GasError::InvalidArgument("worker count must be positive".into()));
    }
    let mut buckets = vec![Vec::new(); workers];
    match strategy {
        PartitionStrategy::OneD => place(&mut buckets, edges, |e| hash::one_d(workers, e)),
        PartitionStrategy::OneDDst => place(&mut buckets, edges, |e| hash::one_d_dst(workers, e)),
        PartitionStrategy::RandomVertexCut => {
            place(&mut buckets, edges, |e| hash::random_vertex_cut(workers, e))
        }
        PartitionStrategy::CanonicalRandom => {
            place(&mut buckets, edges, |e| hash::canonical_random(workers, e))
        }
        PartitionStrategy::Grid => place(&mut buckets, edges, |e| hash::grid(workers, e)),
        PartitionStrategy::Oblivious => {
            let mut state = ObliviousState::new(workers);
            place(&mut buckets, edges, |e| state.assign(e));
        }
        PartitionStrategy::Hdrf { lambda } => {
            let mut state = HdrfState::new(workers, lambda, hdrf_epsilon);
            place(&mut buckets, edges, |e| state.assign(e));
        }
        PartitionStrategy::Hybrid | PartitionStrategy::Ginger => {
            return Err(GasError::InvalidArgument(format!(
                "{strategy} needs the two-phase loader path"
            )));
        }
    }
    debug!(
        strategy = %strategy,
        edges = edges.len(),
        buckets = ?buckets.iter().map(Vec::len).collect::<Vec<_>>(),
        "partition.local.done"
    );
    Ok(buckets)
}

fn place<V: VertexId>(
    buckets: &mut [Vec<Edge<V>>],
    edges: &[Edge<V>],
    mut owner: impl FnMut(&Edge<V>) -> usize,
) {
    for edge in edges {
        buckets[owner(edge)].push(*edge);
    }
}
