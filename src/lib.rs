//! Distributed vertex-cut graph partitioning and Gather-Apply-Scatter execution.
//!
//! A cluster of workers loads a sharded edge list, partitions it with one of the
//! [`PartitionStrategy`] variants, elects a master for every replicated vertex, and runs
//! analytics as gather, apply, and scatter phases over a [`Transport`].
//!
//! ```no_run
//! use gas_engine::{
//!     analytics, load_partitioned, Communicator, EngineOptions, GasEngine, LocalCluster,
//!     PartitionStrategy, ReplicaMap,
//! };
//!
//! let triangles = LocalCluster::run(4, |transport| {
//!     let comm = Communicator::new(transport, EngineOptions::new())?;
//!     let loaded = load_partitioned::<u64, _>(&comm, "graph.txt", false, PartitionStrategy::Grid)?;
//!     let replicas = ReplicaMap::resolve(&comm, &loaded.graph)?;
//!     let engine = GasEngine::new(&loaded.graph, &replicas, &comm);
//!     analytics::triangles(&engine)
//! })?;
//! # Ok::<(), gas_engine::GasError>(())
//! ```

#![warn(missing_docs)]

pub mod analytics;
pub mod codec;
pub mod comm;
pub mod error;
pub mod graph;
pub mod loader;
pub mod options;
pub mod partition;
pub mod profile;
pub mod replica;
pub mod transport;
pub mod types;

pub use comm::{Communicator, GasEngine, ScalarOp};
pub use error::{GasError, Result};
pub use graph::Graph;
pub use loader::{load_edges, load_partitioned, LoadedGraph};
pub use options::{EngineOptions, ResolverMode};
pub use partition::PartitionStrategy;
pub use profile::{ProfileKind, ProfileSnapshot, Profiler};
pub use replica::ReplicaMap;
pub use transport::{LocalCluster, MemTransport, Tag, TcpTransport, Transport};
pub use types::{Direction, Edge, VertexId};
