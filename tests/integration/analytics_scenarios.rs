#![allow(missing_docs)]

mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::{run_loaded, vertex_set, write_graph, SQUARE_WITH_DIAGONAL, TWO_TRIANGLES};
use gas_engine::analytics::{
    all_pair_common_neighbors, global_clustering_coefficient, global_edge_count,
    global_vertex_count, greedy_coloring, pagerank, random_walks, triangles, DEFAULT_DAMPING,
};
use gas_engine::{EngineOptions, GasEngine, PartitionStrategy, Result};

fn count_triangles(size: usize, directed: bool, strategy: PartitionStrategy) -> Result<Vec<f64>> {
    let file = write_graph(SQUARE_WITH_DIAGONAL)?;
    run_loaded(size, &file, directed, strategy, EngineOptions::new(), |worker| {
        let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
        triangles(&engine)
    })
}

#[test]
fn square_with_diagonal_has_two_triangles_on_one_worker() -> Result<()> {
    for directed in [true, false] {
        let counts = count_triangles(1, directed, PartitionStrategy::OneD)?;
        assert!((counts[0] - 2.0).abs() < 1e-9, "directed={directed}: {counts:?}");
    }
    Ok(())
}

#[test]
fn triangle_count_is_partition_independent() -> Result<()> {
    for strategy in [
        PartitionStrategy::Grid,
        PartitionStrategy::Oblivious,
        PartitionStrategy::Ginger,
    ] {
        for directed in [true, false] {
            let counts = count_triangles(3, directed, strategy)?;
            assert!(counts.iter().all(|c| (c - 2.0).abs() < 1e-9), "{strategy}: {counts:?}");
        }
    }
    Ok(())
}

#[test]
fn clustering_coefficient_and_global_counts() -> Result<()> {
    let file = write_graph(SQUARE_WITH_DIAGONAL)?;
    let results = run_loaded(
        2,
        &file,
        false,
        PartitionStrategy::RandomVertexCut,
        EngineOptions::new(),
        |worker| {
            let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
            let edges = global_edge_count(worker.comm, &worker.loaded.graph)?;
            let vertices = global_vertex_count(worker.comm, &worker.replicas)?;
            Ok((edges, vertices, global_clustering_coefficient(&engine)?))
        },
    )?;
    for (edges, vertices, gcc) in results {
        assert_eq!((edges, vertices), (5, 4));
        assert!((gcc - 0.5).abs() < 1e-9);
    }
    Ok(())
}

#[test]
fn pagerank_on_a_cycle_stays_uniform() -> Result<()> {
    let file = write_graph(&[(0, 1), (1, 2), (2, 0)])?;
    let per_rank = run_loaded(
        3,
        &file,
        true,
        PartitionStrategy::RandomVertexCut,
        EngineOptions::new(),
        |worker| {
            let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
            pagerank(&engine, 10, DEFAULT_DAMPING)
        },
    )?;
    let ranks: BTreeMap<u64, f64> = per_rank.into_iter().flatten().collect();
    assert_eq!(ranks.len(), 3);
    for (v, rank) in ranks {
        assert!((rank - 1.0 / 3.0).abs() < 1e-9, "vertex {v}: {rank}");
    }
    Ok(())
}

#[test]
fn pagerank_favours_the_shared_target() -> Result<()> {
    let file = write_graph(TWO_TRIANGLES)?;
    let per_rank = run_loaded(
        3,
        &file,
        true,
        PartitionStrategy::Hybrid,
        EngineOptions::new(),
        |worker| {
            let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
            pagerank(&engine, 30, DEFAULT_DAMPING)
        },
    )?;
    let ranks: BTreeMap<u64, f64> = per_rank.into_iter().flatten().collect();
    assert_eq!(ranks.len(), 6);
    assert!(ranks[&3] > ranks[&0]);
    assert!(ranks.values().all(|r| *r > 0.0));
    Ok(())
}

#[test]
fn hdrf_placement_is_deterministic() -> Result<()> {
    let file = write_graph(TWO_TRIANGLES)?;
    let run = || {
        run_loaded(
            3,
            &file,
            true,
            PartitionStrategy::Hdrf { lambda: 100.0 },
            EngineOptions::new(),
            |worker| {
                Ok(worker
                    .loaded
                    .graph
                    .edges()
                    .iter()
                    .map(|e| (e.src, e.dst, e.id))
                    .collect::<Vec<_>>())
            },
        )
    };
    assert_eq!(run()?, run()?);
    Ok(())
}

#[test]
fn greedy_coloring_is_proper() -> Result<()> {
    let mut edges = TWO_TRIANGLES.to_vec();
    edges.extend([(0, 3), (1, 4), (4, 4), (6, 0), (6, 1), (6, 2)]);
    let file = write_graph(&edges)?;
    for directed in [true, false] {
        let per_rank = run_loaded(
            3,
            &file,
            directed,
            PartitionStrategy::CanonicalRandom,
            EngineOptions::new(),
            |worker| {
                let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
                greedy_coloring(&engine)
            },
        )?;
        let colors: BTreeMap<u64, u32> = per_rank.into_iter().flatten().collect();
        assert_eq!(colors.keys().copied().collect::<BTreeSet<_>>(), vertex_set(&edges));
        for &(s, d) in &edges {
            if s != d {
                assert_ne!(colors[&s], colors[&d], "edge {s}-{d}");
            }
        }
        // Vertices 0, 1, 2, and 6 form a 4-clique.
        assert!(colors.values().max().copied().unwrap_or(0) >= 3);
    }
    Ok(())
}

#[test]
fn walks_follow_edges_and_have_the_requested_length() -> Result<()> {
    let file = write_graph(&[(0, 1), (1, 2), (2, 0), (1, 0), (2, 3), (3, 1)])?;
    let walk = || {
        run_loaded(
            3,
            &file,
            true,
            PartitionStrategy::Oblivious,
            EngineOptions::new().walk_seed(42),
            |worker| {
                let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
                random_walks(&engine, 6)
            },
        )
    };
    let first = walk()?;
    assert_eq!(first, walk()?);

    let edges: BTreeSet<(u64, u64)> =
        [(0, 1), (1, 2), (2, 0), (1, 0), (2, 3), (3, 1)].into_iter().collect();
    let paths: BTreeMap<u64, Vec<u64>> = first.into_iter().flatten().collect();
    assert_eq!(paths.len(), 4);
    for (source, path) in paths {
        assert_eq!(path.len(), 6);
        assert_eq!(path[0], source);
        for hop in path.windows(2) {
            assert!(edges.contains(&(hop[0], hop[1])), "{hop:?} is not an edge");
        }
    }
    Ok(())
}

#[test]
fn walks_stop_at_sinks() -> Result<()> {
    let file = write_graph(&[(0, 1), (1, 2)])?;
    let per_rank = run_loaded(
        2,
        &file,
        true,
        PartitionStrategy::OneD,
        EngineOptions::new(),
        |worker| {
            let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
            random_walks(&engine, 10)
        },
    )?;
    let paths: BTreeMap<u64, Vec<u64>> = per_rank.into_iter().flatten().collect();
    assert_eq!(paths[&0], vec![0, 1, 2]);
    assert_eq!(paths[&1], vec![1, 2]);
    assert_eq!(paths[&2], vec![2]);
    Ok(())
}

#[test]
fn common_neighbours_of_the_diagonal() -> Result<()> {
    let file = write_graph(SQUARE_WITH_DIAGONAL)?;
    let per_rank = run_loaded(
        3,
        &file,
        false,
        PartitionStrategy::Grid,
        EngineOptions::new(),
        |worker| {
            let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
            all_pair_common_neighbors(&engine)
        },
    )?;
    let mut pairs: BTreeMap<(u64, u64), BTreeSet<u64>> = BTreeMap::new();
    for map in per_rank {
        for (pair, common) in map {
            pairs.entry(pair).or_default().extend(common);
        }
    }
    assert_eq!(pairs[&(0, 2)], BTreeSet::from([1, 3]));
    assert_eq!(pairs[&(2, 0)], BTreeSet::from([1, 3]));
    assert_eq!(pairs[&(1, 3)], BTreeSet::from([0, 2]));
    assert!(!pairs.contains_key(&(0, 0)));
    Ok(())
}
