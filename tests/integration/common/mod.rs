#![allow(dead_code)]

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Once;

use gas_engine::{
    load_partitioned, Communicator, EngineOptions, LoadedGraph, LocalCluster, MemTransport,
    PartitionStrategy, ReplicaMap, Result,
};
use tempfile::NamedTempFile;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

/// Square 0-1-2-3 with the diagonal 0-2: two triangles.
pub const SQUARE_WITH_DIAGONAL: &[(u64, u64)] = &[(0, 1), (1, 2), (2, 3), (3, 0), (0, 2)];

/// Two directed triangles joined by 2 -> 3.
pub const TWO_TRIANGLES: &[(u64, u64)] =
    &[(0, 1), (1, 2), (2, 0), (2, 3), (3, 4), (4, 5), (5, 3)];

pub fn write_graph(edges: &[(u64, u64)]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "# src dst")?;
    for (src, dst) in edges {
        writeln!(file, "{src} {dst}")?;
    }
    file.flush()?;
    Ok(file)
}

pub struct Worker<'a> {
    pub comm: &'a Communicator<MemTransport>,
    pub loaded: LoadedGraph<u64>,
    pub replicas: ReplicaMap<u64>,
}

/// Loads `file` on a cluster of `size` ranks, resolves replicas, and runs `body` per rank.
pub fn run_loaded<R, F>(
    size: usize,
    file: &NamedTempFile,
    directed: bool,
    strategy: PartitionStrategy,
    options: EngineOptions,
    body: F,
) -> Result<Vec<R>>
where
    R: Send,
    F: Fn(Worker<'_>) -> Result<R> + Sync,
{
    init_tracing();
    let path = file.path().to_path_buf();
    LocalCluster::run(size, |transport| {
        let comm = Communicator::new(transport, options.clone())?;
        let loaded = load_partitioned::<u64, _>(&comm, &path, directed, strategy)?;
        let replicas = ReplicaMap::resolve(&comm, &loaded.graph)?;
        body(Worker {
            comm: &comm,
            loaded,
            replicas,
        })
    })
}

pub fn vertex_set(edges: &[(u64, u64)]) -> BTreeSet<u64> {
    edges.iter().flat_map(|&(s, d)| [s, d]).collect()
}
