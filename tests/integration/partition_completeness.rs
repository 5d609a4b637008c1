#![allow(missing_docs)]

mod common;

use std::collections::BTreeSet;

use common::{run_loaded, write_graph, TWO_TRIANGLES};
use gas_engine::{EngineOptions, PartitionStrategy, Result};
use proptest::prelude::*;

/// Every rank's owned input edges, with their ids, as `(src, dst, id)`.
fn owned_edges(
    edges: &[(u64, u64)],
    size: usize,
    directed: bool,
    strategy: PartitionStrategy,
) -> Result<Vec<Vec<(u64, u64, i64)>>> {
    let file = write_graph(edges)?;
    let options = EngineOptions::new().two_phase_threshold(2);
    run_loaded(size, &file, directed, strategy, options, |worker| {
        let size = worker.comm.size() as i64;
        let graph = &worker.loaded.graph;
        // Mirror edges carry ids past the loader's range; keep only input edges.
        let input_edges = (if directed {
            graph.edge_count()
        } else {
            graph.edge_count() / 2
        }) as i64;
        Ok(graph
            .edges()
            .iter()
            .filter(|e| e.id < input_edges * size)
            .map(|e| (e.src, e.dst, e.id))
            .collect())
    })
}

fn assert_complete(edges: &[(u64, u64)], per_rank: &[Vec<(u64, u64, i64)>]) {
    let mut expected: Vec<(u64, u64)> = edges.to_vec();
    expected.sort_unstable();
    let mut actual: Vec<(u64, u64)> = per_rank
        .iter()
        .flatten()
        .map(|&(s, d, _)| (s, d))
        .collect();
    actual.sort_unstable();
    assert_eq!(actual, expected);

    let ids: BTreeSet<i64> = per_rank.iter().flatten().map(|&(_, _, id)| id).collect();
    assert_eq!(ids.len(), edges.len(), "edge ids are unique across the cluster");
}

#[test]
fn every_strategy_keeps_each_edge_exactly_once() -> Result<()> {
    let mut edges = TWO_TRIANGLES.to_vec();
    edges.extend([(1, 1), (0, 1), (7, 2), (2, 7), (3, 9)]);
    for strategy in PartitionStrategy::all() {
        let per_rank = owned_edges(&edges, 3, true, strategy)?;
        assert_complete(&edges, &per_rank);
    }
    Ok(())
}

#[test]
fn undirected_graphs_hold_both_halves_locally() -> Result<()> {
    let file = write_graph(TWO_TRIANGLES)?;
    let counts = run_loaded(
        3,
        &file,
        false,
        PartitionStrategy::CanonicalRandom,
        EngineOptions::new(),
        |worker| {
            let graph = &worker.loaded.graph;
            for edge in graph.edges() {
                assert!(graph.find_edge(false, edge.dst, edge.src).is_some());
            }
            Ok(graph.edge_count())
        },
    )?;
    assert_eq!(counts.iter().sum::<usize>(), 2 * TWO_TRIANGLES.len());
    Ok(())
}

#[test]
fn totals_are_reported_on_every_rank() -> Result<()> {
    let file = write_graph(TWO_TRIANGLES)?;
    let totals = run_loaded(
        4,
        &file,
        true,
        PartitionStrategy::Ginger,
        EngineOptions::new(),
        |worker| Ok((worker.loaded.total_vertices, worker.loaded.total_edges)),
    )?;
    assert!(totals.iter().all(|t| *t == (6, 7)));
    Ok(())
}

#[test]
fn single_worker_owns_everything() -> Result<()> {
    let per_rank = owned_edges(TWO_TRIANGLES, 1, true, PartitionStrategy::Hdrf { lambda: 20.0 })?;
    assert_eq!(per_rank[0].len(), TWO_TRIANGLES.len());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn random_graphs_partition_completely(
        edges in prop::collection::vec((0u64..24, 0u64..24), 0..40),
        strategy_id in 0i64..12,
        size in 1usize..5,
    ) {
        let strategy = PartitionStrategy::from_id(strategy_id).unwrap();
        let per_rank = owned_edges(&edges, size, true, strategy).unwrap();
        assert_complete(&edges, &per_rank);
    }
}
