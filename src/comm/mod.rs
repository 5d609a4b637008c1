//! Communication engine: bounded non-blocking phases over a [`Transport`].
//!
//! Every phase follows the same loop. Outbound messages are issued while a send slot is
//! free, completed sends are reaped, and inbound messages are probed and received one at
//! a time. The loop ends when the locally computed send and receive counts are met and
//! every send has completed; a barrier then fences the phase so tags of consecutive
//! phases never interleave.

pub mod gas;
mod slots;

use std::thread;

use tracing::{debug, trace};

pub use gas::{GasEngine, LocalGather, LocalScatter, Scalar, ScalarOp, MERGE_OP_CODE};

use crate::codec::{from_bytes, to_bytes, Wire};
use crate::error::{GasError, Result};
use crate::options::EngineOptions;
use crate::profile::{DataDirection, ProfileKind, ProfileSnapshot, Profiler};
use crate::transport::{Tag, Transport};
use slots::SendSlots;

/// A transport plus the per-worker profiler and engine options.
pub struct Communicator<T> {
    transport: T,
    profiler: Profiler,
    options: EngineOptions,
}

impl<T: Transport> Communicator<T> {
    /// Wraps `transport`; rejects invalid options.
    pub fn new(transport: T, options: EngineOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            transport,
            profiler: Profiler::new(),
            options,
        })
    }

    /// This worker's rank.
    pub fn rank(&self) -> usize {
        self.transport.rank()
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.transport.size()
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Profiling counters for this worker.
    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// Engine options in effect.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Barrier, charged as wait time.
    pub fn barrier(&self) -> Result<()> {
        let timer = self.profiler.start();
        self.transport.barrier()?;
        self.profiler.stop(timer, ProfileKind::Wait);
        Ok(())
    }

    /// Gathers one value from every rank, in rank order.
    pub fn all_gather<W: Wire>(&self, value: &W) -> Result<Vec<W>> {
        let timer = self.profiler.start();
        let bytes = to_bytes(value);
        let sent = bytes.len();
        let gathered = self.transport.all_gather(bytes)?;
        let received: usize = gathered.iter().map(Vec::len).sum();
        self.profiler.record(timer, ProfileKind::SendRecv, DataDirection::Sent, sent);
        self.profiler.add_bytes(DataDirection::Received, received);
        gathered.iter().map(|b| from_bytes(b)).collect()
    }

    /// Element-wise sum across ranks.
    pub fn all_reduce_sum_u64(&self, values: &[u64]) -> Result<Vec<u64>> {
        let timer = self.profiler.start();
        let out = self.transport.all_reduce_sum_u64(values)?;
        self.profiler
            .record(timer, ProfileKind::SendRecv, DataDirection::Both, values.len() * 8);
        Ok(out)
    }

    /// Element-wise sum across ranks.
    pub fn all_reduce_sum_f64(&self, values: &[f64]) -> Result<Vec<f64>> {
        let timer = self.profiler.start();
        let out = self.transport.all_reduce_sum_f64(values)?;
        self.profiler
            .record(timer, ProfileKind::SendRecv, DataDirection::Both, values.len() * 8);
        Ok(out)
    }

    /// Element-wise maximum across ranks.
    pub fn all_reduce_max_i64(&self, values: &[i64]) -> Result<Vec<i64>> {
        let timer = self.profiler.start();
        let out = self.transport.all_reduce_max_i64(values)?;
        self.profiler
            .record(timer, ProfileKind::SendRecv, DataDirection::Both, values.len() * 8);
        Ok(out)
    }

    /// Cluster-wide sum of a local work-queue length; zero means every rank is idle.
    pub fn global_active_count(&self, local: usize) -> Result<u64> {
        Ok(self.all_reduce_sum_u64(&[local as u64])?[0])
    }

    /// All-to-all exchange of per-destination batches.
    ///
    /// `outgoing[i]` goes to rank `i`; the local batch is kept without touching the
    /// transport. Received batches are concatenated in source rank order.
    pub fn exchange_vec_data<M: Wire>(&self, mut outgoing: Vec<Vec<M>>) -> Result<Vec<M>> {
        let (rank, size) = (self.rank(), self.size());
        if outgoing.len() != size {
            return Err(GasError::InvalidArgument(format!(
                "exchange needs {size} batches, got {}",
                outgoing.len()
            )));
        }
        let mut by_source: Vec<Vec<M>> = (0..size).map(|_| Vec::new()).collect();
        by_source[rank] = std::mem::take(&mut outgoing[rank]);

        let will_send: Vec<u64> = outgoing
            .iter()
            .map(|batch| u64::from(!batch.is_empty()))
            .collect();
        let inbound = self.all_reduce_sum_u64(&will_send)?[rank] as usize;

        let messages: Vec<(usize, Vec<u8>)> = outgoing
            .iter()
            .enumerate()
            .filter(|(_, batch)| !batch.is_empty())
            .map(|(dest, batch)| (dest, to_bytes(batch)))
            .collect();
        self.run_phase(
            Tag::DataExchange,
            self.options.exchange_send_slots,
            messages,
            inbound,
            |source, bytes| {
                let batch: Vec<M> = from_bytes(&bytes)?;
                by_source[source].extend(batch);
                Ok(())
            },
        )?;
        Ok(by_source.into_iter().flatten().collect())
    }

    /// Every rank's profiling snapshot, in rank order.
    pub fn cluster_profile(&self) -> Result<Vec<ProfileSnapshot>> {
        let gathered = self
            .transport
            .all_gather(to_bytes(&self.profiler.snapshot()))?;
        gathered.iter().map(|b| from_bytes(b)).collect()
    }

    /// Drives one phase to completion. See the module docs for the loop shape.
    pub(crate) fn run_phase(
        &self,
        tag: Tag,
        slot_count: usize,
        outgoing: Vec<(usize, Vec<u8>)>,
        expected_recv: usize,
        mut on_recv: impl FnMut(usize, Vec<u8>) -> Result<()>,
    ) -> Result<()> {
        let rank = self.rank();
        let expected_send = outgoing.len();
        debug!(
            rank,
            tag = ?tag,
            expected_send,
            expected_recv,
            "comm.phase.start"
        );
        let timer = self.profiler.start();
        let mut slots = SendSlots::new(slot_count);
        let mut pending = outgoing.into_iter();
        let (mut sent, mut received) = (0usize, 0usize);
        let (mut sent_bytes, mut recv_bytes) = (0usize, 0usize);

        while sent < expected_send || received < expected_recv || slots.in_flight() > 0 {
            let mut progressed = slots.reap() > 0;

            while slots.has_free() {
                let Some((dest, payload)) = pending.next() else {
                    break;
                };
                sent_bytes += payload.len();
                let request = self.transport.isend(dest, tag, payload)?;
                slots.occupy(request);
                sent += 1;
                progressed = true;
            }

            if received < expected_recv {
                if let Some(probe) = self.transport.iprobe()? {
                    if probe.tag != tag as u8 {
                        return Err(GasError::protocol(tag, probe.tag, probe.source));
                    }
                    let payload = self.transport.recv(probe.source, tag)?;
                    trace!(rank, source = probe.source, len = probe.len, "comm.phase.recv");
                    recv_bytes += payload.len();
                    received += 1;
                    on_recv(probe.source, payload)?;
                    progressed = true;
                }
            }

            if !progressed {
                if let Some(peer) = self.transport.disconnected_peer() {
                    // Links close after their last message, so a second probe is conclusive.
                    if received >= expected_recv || self.transport.iprobe()?.is_none() {
                        return Err(GasError::Transport(format!(
                            "rank {peer} disconnected during the {tag:?} phase"
                        )));
                    }
                    continue;
                }
                thread::yield_now();
            }
        }

        self.profiler.stop(timer, ProfileKind::SendRecv);
        self.profiler.add_bytes(DataDirection::Sent, sent_bytes);
        self.profiler.add_bytes(DataDirection::Received, recv_bytes);
        debug!(rank, tag = ?tag, sent, received, "comm.phase.done");
        self.barrier()
    }
}
