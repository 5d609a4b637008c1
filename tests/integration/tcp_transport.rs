#![allow(missing_docs)]

mod common;

use std::net::{SocketAddr, TcpListener};
use std::thread;

use common::{init_tracing, SQUARE_WITH_DIAGONAL};
use gas_engine::analytics::triangles;
use gas_engine::{
    load_edges, Communicator, Edge, EngineOptions, GasEngine, GasError, PartitionStrategy,
    ReplicaMap, Result, TcpTransport,
};

/// Runs `body` on `size` ranks connected over loopback TCP.
fn run_mesh<R, F>(size: usize, body: F) -> Result<Vec<R>>
where
    R: Send,
    F: Fn(Communicator<TcpTransport>) -> Result<R> + Sync,
{
    init_tracing();
    let listeners = (0..size)
        .map(|_| TcpListener::bind("127.0.0.1:0"))
        .collect::<std::io::Result<Vec<_>>>()?;
    let addrs = listeners
        .iter()
        .map(TcpListener::local_addr)
        .collect::<std::io::Result<Vec<SocketAddr>>>()?;
    let options = EngineOptions::new().connect_retries(100, 10);

    let (addrs, options, body) = (&addrs, &options, &body);
    thread::scope(|scope| {
        let handles: Vec<_> = listeners
            .into_iter()
            .enumerate()
            .map(|(rank, listener)| {
                scope.spawn(move || {
                    let transport = TcpTransport::from_listener(rank, listener, addrs, options)?;
                    body(Communicator::new(transport, options.clone())?)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .map_err(|_| GasError::Transport("worker thread panicked".into()))
                    .and_then(|outcome| outcome)
            })
            .collect()
    })
}

#[test]
fn collectives_and_exchange_over_loopback() -> Result<()> {
    let results = run_mesh(3, |comm| {
        let rank = comm.rank() as u32;
        let gathered = comm.all_gather(&rank)?;
        let total = comm.all_reduce_sum_u64(&[u64::from(rank) + 1])?[0];
        let outgoing: Vec<Vec<u32>> = (0..3).map(|dest| vec![rank * 10 + dest]).collect();
        let received = comm.exchange_vec_data(outgoing)?;
        comm.barrier()?;
        Ok((gathered, total, received))
    })?;
    for (rank, (gathered, total, received)) in results.into_iter().enumerate() {
        let rank = rank as u32;
        assert_eq!(gathered, vec![0, 1, 2]);
        assert_eq!(total, 6);
        assert_eq!(received, vec![rank, 10 + rank, 20 + rank]);
    }
    Ok(())
}

#[test]
fn triangles_over_loopback() -> Result<()> {
    let counts = run_mesh(3, |comm| {
        let edges: Vec<Edge<u64>> = if comm.rank() == 0 {
            SQUARE_WITH_DIAGONAL
                .iter()
                .map(|&(s, d)| Edge::new(-1, s, d))
                .collect()
        } else {
            Vec::new()
        };
        let loaded = load_edges(&comm, edges, false, PartitionStrategy::Grid)?;
        let replicas = ReplicaMap::resolve(&comm, &loaded.graph)?;
        let count = triangles(&GasEngine::new(&loaded.graph, &replicas, &comm))?;
        comm.barrier()?;
        Ok(count)
    })?;
    assert!(counts.iter().all(|c| (c - 2.0).abs() < 1e-9), "{counts:?}");
    Ok(())
}

#[test]
fn out_of_range_rank_is_rejected() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addrs = vec![listener.local_addr()?];
    let err = TcpTransport::from_listener(1, listener, &addrs, &EngineOptions::new()).unwrap_err();
    assert!(matches!(err, GasError::InvalidArgument(_)));
    Ok(())
}
