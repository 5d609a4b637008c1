#![allow(missing_docs)]

mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::{run_loaded, write_graph, TWO_TRIANGLES};
use gas_engine::analytics::{in_degree, out_degree};
use gas_engine::{
    Direction, EngineOptions, GasEngine, Graph, PartitionStrategy, Result, ScalarOp,
};

fn degree_sums(edges: &[(u64, u64)]) -> BTreeMap<u64, u64> {
    let mut sums = BTreeMap::new();
    for &(s, d) in edges {
        *sums.entry(s).or_default() += 1;
        *sums.entry(d).or_default() += 1;
    }
    sums
}

fn local_both_degree(graph: &Graph<u64>, active: &BTreeSet<u64>) -> BTreeMap<u64, u64> {
    active
        .iter()
        .map(|&v| (v, graph.degree(v, Direction::Both) as u64))
        .collect()
}

#[test]
fn sum_gather_then_apply_reaches_every_replica() -> Result<()> {
    let file = write_graph(TWO_TRIANGLES)?;
    let expected = degree_sums(TWO_TRIANGLES);
    for strategy in [
        PartitionStrategy::RandomVertexCut,
        PartitionStrategy::Oblivious,
        PartitionStrategy::Grid,
    ] {
        let options = EngineOptions::new().scalar_send_slots(1);
        let per_rank = run_loaded(3, &file, true, strategy, options, |worker| {
            let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
            let active = worker.loaded.graph.vertices().clone();
            let mut values = engine.gather_scalar(&active, ScalarOp::Sum, &local_both_degree)?;
            let mastered: BTreeSet<u64> = worker.replicas.masters().collect();
            assert_eq!(values.keys().copied().collect::<BTreeSet<_>>(), mastered);
            engine.apply_scalar(&active, &mut values)?;
            assert_eq!(values.keys().copied().collect::<BTreeSet<_>>(), active);
            Ok(values)
        })?;
        for values in &per_rank {
            for (v, degree) in values {
                assert_eq!(expected[v], *degree, "vertex {v} under {strategy}");
            }
        }
    }
    Ok(())
}

#[test]
fn max_gather_combines_partials() -> Result<()> {
    let file = write_graph(TWO_TRIANGLES)?;
    let per_rank = run_loaded(
        3,
        &file,
        true,
        PartitionStrategy::RandomVertexCut,
        EngineOptions::new(),
        |worker| {
            let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
            let rank = worker.comm.rank() as u64;
            let active = worker.loaded.graph.vertices().clone();
            engine.gather_scalar(
                &active,
                ScalarOp::Max,
                &move |_: &Graph<u64>, active: &BTreeSet<u64>| {
                    active.iter().map(|&v| (v, rank)).collect::<BTreeMap<u64, u64>>()
                },
            )
        },
    )?;
    let holders = run_loaded(
        3,
        &file,
        true,
        PartitionStrategy::RandomVertexCut,
        EngineOptions::new(),
        |worker| Ok(worker.loaded.graph.vertices().clone()),
    )?;
    for values in &per_rank {
        for (v, max_rank) in values {
            let highest = (0..3).rev().find(|&r| holders[r].contains(v));
            assert_eq!(highest, Some(*max_rank as usize));
        }
    }
    Ok(())
}

#[test]
fn merge_gather_collects_every_neighbour() -> Result<()> {
    let file = write_graph(TWO_TRIANGLES)?;
    let per_rank = run_loaded(
        3,
        &file,
        true,
        PartitionStrategy::CanonicalRandom,
        EngineOptions::new().vector_send_slots(1),
        |worker| {
            let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
            let active = worker.loaded.graph.vertices().clone();
            engine.gather_merge(&active, &|graph: &Graph<u64>, active: &BTreeSet<u64>| {
                active
                    .iter()
                    .map(|&v| (v, graph.neighbors(v, Direction::Out)))
                    .collect::<BTreeMap<u64, Vec<u64>>>()
            })
        },
    )?;
    let mut merged: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for values in per_rank {
        for (v, mut list) in values {
            list.sort_unstable();
            assert!(merged.insert(v, list).is_none(), "vertex {v} merged twice");
        }
    }
    assert_eq!(merged[&2], vec![0, 3]);
    assert_eq!(merged[&5], vec![3]);
    assert_eq!(merged.len(), 6);
    Ok(())
}

#[test]
fn missing_master_value_clears_slaves() -> Result<()> {
    let file = write_graph(TWO_TRIANGLES)?;
    let per_rank = run_loaded(
        3,
        &file,
        true,
        PartitionStrategy::RandomVertexCut,
        EngineOptions::new(),
        |worker| {
            let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
            let active = worker.loaded.graph.vertices().clone();
            let mut values: BTreeMap<u64, Vec<u64>> =
                active.iter().map(|&v| (v, vec![v; 2])).collect();
            let replicas = &worker.replicas;
            values.retain(|v, _| !replicas.is_master(*v) || v % 2 == 0);
            engine.apply_vector(&active, &mut values)?;
            Ok(values)
        },
    )?;
    for values in &per_rank {
        for (v, list) in values {
            assert_eq!(v % 2, 0);
            assert_eq!(list, &vec![*v; 2]);
        }
    }
    Ok(())
}

#[test]
fn degrees_are_idempotent_and_replicated() -> Result<()> {
    let file = write_graph(TWO_TRIANGLES)?;
    let per_rank = run_loaded(
        3,
        &file,
        true,
        PartitionStrategy::Hdrf { lambda: 10.0 },
        EngineOptions::new(),
        |worker| {
            let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
            let first = in_degree(&engine)?;
            let second = in_degree(&engine)?;
            assert_eq!(first, second);
            let outs = out_degree(&engine)?;
            assert_eq!(outs.len(), worker.loaded.graph.vertex_count());
            Ok((first, outs))
        },
    )?;
    let mut ins = BTreeMap::new();
    for (first, outs) in &per_rank {
        ins.extend(first.iter().map(|(v, d)| (*v, *d)));
        for (v, d) in outs {
            assert_eq!(*d, if *v == 2 { 2 } else { 1 }, "out-degree of {v}");
        }
    }
    assert_eq!(ins, BTreeMap::from([(0, 1), (1, 1), (2, 1), (3, 2), (4, 1), (5, 1)]));
    Ok(())
}

#[test]
fn scatter_is_local_and_profiled() -> Result<()> {
    let file = write_graph(TWO_TRIANGLES)?;
    let per_rank = run_loaded(
        2,
        &file,
        true,
        PartitionStrategy::OneD,
        EngineOptions::new(),
        |worker| {
            let engine = GasEngine::new(&worker.loaded.graph, &worker.replicas, worker.comm);
            let active = worker.loaded.graph.vertices().clone();
            let next = engine.scatter(&active, &|graph: &Graph<u64>, active: &BTreeSet<u64>| {
                active
                    .iter()
                    .flat_map(|&v| graph.neighbors(v, Direction::Out))
                    .collect::<BTreeSet<u64>>()
            });
            let profiles = worker.comm.cluster_profile()?;
            Ok((next, profiles))
        },
    )?;
    let reached: BTreeSet<u64> = per_rank.iter().flat_map(|(next, _)| next.iter().copied()).collect();
    assert_eq!(reached, (0..6).collect());
    let (_, profiles) = &per_rank[0];
    assert_eq!(profiles.len(), 2);
    assert!(profiles.iter().any(|p| p.sent_bytes > 0));
    Ok(())
}
