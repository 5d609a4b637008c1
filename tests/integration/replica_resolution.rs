#![allow(missing_docs)]

mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::{init_tracing, run_loaded, vertex_set, write_graph, TWO_TRIANGLES};
use gas_engine::{
    load_edges, Communicator, Edge, EngineOptions, LocalCluster, PartitionStrategy, ReplicaMap,
    ResolverMode, Result,
};

struct Layout<V> {
    held: BTreeSet<V>,
    masters: BTreeMap<V, Vec<usize>>,
    slaves: BTreeMap<V, usize>,
}

fn layout_of<V: gas_engine::VertexId>(held: &BTreeSet<V>, replicas: &ReplicaMap<V>) -> Layout<V> {
    Layout {
        held: held.clone(),
        masters: replicas
            .masters()
            .map(|v| (v, replicas.slaves_of(v).unwrap_or_default().to_vec()))
            .collect(),
        slaves: replicas.slaves().collect(),
    }
}

fn assert_unique_masters<V: gas_engine::VertexId>(layouts: &[Layout<V>]) {
    let all: BTreeSet<V> = layouts.iter().flat_map(|l| l.held.iter().copied()).collect();
    for v in all {
        let holders: Vec<usize> = (0..layouts.len())
            .filter(|&r| layouts[r].held.contains(&v))
            .collect();
        let masters: Vec<usize> = (0..layouts.len())
            .filter(|&r| layouts[r].masters.contains_key(&v))
            .collect();
        assert_eq!(masters.len(), 1, "vertex {v} has masters {masters:?}");
        let master = masters[0];
        let expected_slaves: Vec<usize> = holders.iter().copied().filter(|&r| r != master).collect();
        assert_eq!(layouts[master].masters[&v], expected_slaves, "slaves of {v}");
        for &slave in &expected_slaves {
            assert_eq!(layouts[slave].slaves.get(&v), Some(&master));
            assert!(!layouts[slave].masters.contains_key(&v));
        }
        for (rank, layout) in layouts.iter().enumerate() {
            if !holders.contains(&rank) {
                assert!(!layout.slaves.contains_key(&v));
            }
        }
    }
}

fn resolve_loaded(mode: ResolverMode, strategy: PartitionStrategy) -> Result<Vec<Layout<u64>>> {
    let mut edges = TWO_TRIANGLES.to_vec();
    edges.extend([(0, 3), (1, 4), (2, 5), (8, 8)]);
    let file = write_graph(&edges)?;
    let layouts = run_loaded(
        3,
        &file,
        true,
        strategy,
        EngineOptions::new().resolver(mode),
        |worker| Ok(layout_of(worker.loaded.graph.vertices(), &worker.replicas)),
    )?;
    let held: BTreeSet<u64> = layouts.iter().flat_map(|l| l.held.iter().copied()).collect();
    assert_eq!(held, vertex_set(&edges));
    Ok(layouts)
}

#[test]
fn id_range_elects_exactly_one_master() -> Result<()> {
    for strategy in [
        PartitionStrategy::RandomVertexCut,
        PartitionStrategy::Grid,
        PartitionStrategy::Oblivious,
    ] {
        assert_unique_masters(&resolve_loaded(ResolverMode::IdRange, strategy)?);
    }
    Ok(())
}

#[test]
fn hash_exchange_elects_exactly_one_master() -> Result<()> {
    for strategy in [
        PartitionStrategy::RandomVertexCut,
        PartitionStrategy::Hybrid,
        PartitionStrategy::Hdrf { lambda: 50.0 },
    ] {
        assert_unique_masters(&resolve_loaded(ResolverMode::HashExchange, strategy)?);
    }
    Ok(())
}

#[test]
fn sole_holder_masters_with_no_slaves() -> Result<()> {
    let layouts = resolve_loaded(ResolverMode::IdRange, PartitionStrategy::OneD)?;
    for layout in &layouts {
        for (v, slaves) in &layout.masters {
            let holders = layouts.iter().filter(|l| l.held.contains(v)).count();
            if holders == 1 {
                assert!(slaves.is_empty());
            }
        }
    }
    Ok(())
}

#[test]
fn hash_exchange_covers_negative_ids() -> Result<()> {
    init_tracing();
    let layouts = LocalCluster::run(3, |transport| {
        let comm = Communicator::new(
            transport,
            EngineOptions::new().resolver(ResolverMode::HashExchange),
        )?;
        let edges: Vec<Edge<i64>> = if comm.rank() == 0 {
            [(-4, -1), (-1, 2), (2, -4), (5, -1)]
                .into_iter()
                .map(|(s, d)| Edge::new(-1, s, d))
                .collect()
        } else {
            Vec::new()
        };
        let loaded = load_edges(&comm, edges, true, PartitionStrategy::RandomVertexCut)?;
        let replicas = ReplicaMap::resolve(&comm, &loaded.graph)?;
        Ok(layout_of(loaded.graph.vertices(), &replicas))
    })?;
    assert_unique_masters(&layouts);
    let masters: BTreeSet<i64> = layouts.iter().flat_map(|l| l.masters.keys().copied()).collect();
    assert_eq!(masters, BTreeSet::from([-4, -1, 2, 5]));
    Ok(())
}

#[test]
fn id_range_hands_negative_ids_to_hash_exchange() -> Result<()> {
    init_tracing();
    let layouts = LocalCluster::run(2, |transport| {
        let comm = Communicator::new(transport, EngineOptions::new())?;
        let edges: Vec<Edge<i64>> = if comm.rank() == 1 {
            vec![Edge::new(-1, -3, 1), Edge::new(-1, 1, 2), Edge::new(-1, 2, -3)]
        } else {
            Vec::new()
        };
        let loaded = load_edges(&comm, edges, true, PartitionStrategy::OneD)?;
        let replicas = ReplicaMap::resolve(&comm, &loaded.graph)?;
        Ok(layout_of(loaded.graph.vertices(), &replicas))
    })?;
    assert_unique_masters(&layouts);
    let masters: BTreeSet<i64> = layouts.iter().flat_map(|l| l.masters.keys().copied()).collect();
    assert_eq!(masters, BTreeSet::from([-3, 1, 2]));
    Ok(())
}
