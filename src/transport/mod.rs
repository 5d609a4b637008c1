//! Tag-addressed point-to-point messaging and the collectives built on top of it.
//!
//! Ordering guarantee: messages between one ordered pair of ranks on one tag arrive in
//! send order. Nothing is promised across tags or sources.

mod mailbox;
pub mod mem;
pub mod tcp;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use mem::{LocalCluster, MemTransport};
pub use tcp::TcpTransport;

use crate::codec::{from_bytes, to_bytes, Wire};
use crate::error::{GasError, Result};

/// Message tags. Phases only ever drain their own tag.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Master to slave value push.
    Apply = 2,
    /// Edge buckets moved by the loader.
    EdgeTransfer = 5,
    /// Slave to master partial values.
    Aggregate = 7,
    /// All-to-all vector exchange.
    DataExchange = 9,
    /// Reserved for collectives; never returned by [`Transport::iprobe`].
    Collective = 31,
}

impl Tag {
    /// Parses a raw tag byte.
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            2 => Some(Tag::Apply),
            5 => Some(Tag::EdgeTransfer),
            7 => Some(Tag::Aggregate),
            9 => Some(Tag::DataExchange),
            31 => Some(Tag::Collective),
            _ => None,
        }
    }
}

/// Completion handle of a non-blocking send.
#[derive(Clone, Debug)]
pub struct SendRequest {
    done: Arc<AtomicBool>,
}

impl SendRequest {
    pub(crate) fn pending() -> (Self, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (
            Self {
                done: Arc::clone(&flag),
            },
            flag,
        )
    }

    pub(crate) fn completed() -> Self {
        Self {
            done: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns true once the payload has left the sender's custody.
    pub fn test(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Spins until [`SendRequest::test`] succeeds.
    pub fn wait(&self) {
        while !self.test() {
            std::thread::yield_now();
        }
    }
}

/// Header of a message waiting to be received.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Probe {
    /// Sending rank.
    pub source: usize,
    /// Raw tag byte as sent.
    pub tag: u8,
    /// Payload length in bytes.
    pub len: usize,
}

/// Point-to-point transport between a fixed set of ranks.
pub trait Transport: Send + Sync {
    /// This worker's rank.
    fn rank(&self) -> usize;

    /// Number of workers.
    fn size(&self) -> usize;

    /// Starts a send; ownership of `payload` passes to the transport.
    fn isend(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<SendRequest>;

    /// Peeks at the oldest pending non-collective message without consuming it.
    fn iprobe(&self) -> Result<Option<Probe>>;

    /// Blocks until the oldest message from `source` on `tag` arrives and returns it.
    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>>;

    /// A peer whose link has closed, if any. Polling loops use it to stop waiting.
    fn disconnected_peer(&self) -> Option<usize> {
        None
    }

    /// Every rank contributes one buffer; every rank gets all of them in rank order.
    fn all_gather(&self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        let (rank, size) = (self.rank(), self.size());
        for dest in (0..size).filter(|d| *d != rank) {
            self.isend(dest, Tag::Collective, payload.clone())?;
        }
        let mut out = Vec::with_capacity(size);
        for source in 0..size {
            if source == rank {
                out.push(payload.clone());
            } else {
                out.push(self.recv(source, Tag::Collective)?);
            }
        }
        Ok(out)
    }

    /// Blocks until every rank has reached the barrier.
    fn barrier(&self) -> Result<()> {
        self.all_gather(Vec::new()).map(|_| ())
    }

    /// Root's payload is returned on every rank.
    fn broadcast(&self, root: usize, payload: Vec<u8>) -> Result<Vec<u8>> {
        if self.rank() == root {
            for dest in (0..self.size()).filter(|d| *d != root) {
                self.isend(dest, Tag::Collective, payload.clone())?;
            }
            Ok(payload)
        } else {
            self.recv(root, Tag::Collective)
        }
    }

    /// Root hands part `i` to rank `i`. Non-root ranks pass `None`.
    fn scatter(&self, root: usize, parts: Option<Vec<Vec<u8>>>) -> Result<Vec<u8>> {
        let rank = self.rank();
        if rank != root {
            return self.recv(root, Tag::Collective);
        }
        let parts = parts.ok_or_else(|| {
            GasError::InvalidArgument("scatter root must supply one part per rank".into())
        })?;
        if parts.len() != self.size() {
            return Err(GasError::InvalidArgument(format!(
                "scatter expects {} parts, got {}",
                self.size(),
                parts.len()
            )));
        }
        let mut mine = Vec::new();
        for (dest, part) in parts.into_iter().enumerate() {
            if dest == rank {
                mine = part;
            } else {
                self.isend(dest, Tag::Collective, part)?;
            }
        }
        Ok(mine)
    }

    /// Element-wise sum across ranks.
    fn all_reduce_sum_u64(&self, values: &[u64]) -> Result<Vec<u64>> {
        all_reduce(self, values, |acc, v| *acc += v)
    }

    /// Element-wise sum across ranks.
    fn all_reduce_sum_f64(&self, values: &[f64]) -> Result<Vec<f64>> {
        all_reduce(self, values, |acc, v| *acc += v)
    }

    /// Element-wise maximum across ranks.
    fn all_reduce_max_i64(&self, values: &[i64]) -> Result<Vec<i64>> {
        all_reduce(self, values, |acc, v| *acc = (*acc).max(v))
    }
}

fn all_reduce<T, W>(transport: &T, values: &[W], mut fold: impl FnMut(&mut W, W)) -> Result<Vec<W>>
where
    T: Transport + ?Sized,
    W: Wire + Copy,
{
    let gathered = transport.all_gather(to_bytes(&values.to_vec()))?;
    let mut acc: Option<Vec<W>> = None;
    for bytes in gathered {
        let part: Vec<W> = from_bytes(&bytes)?;
        match acc.as_mut() {
            None => acc = Some(part),
            Some(acc) => {
                if acc.len() != part.len() {
                    return Err(GasError::Codec(format!(
                        "all-reduce length mismatch: {} vs {}",
                        acc.len(),
                        part.len()
                    )));
                }
                for (slot, value) in acc.iter_mut().zip(part) {
                    fold(slot, value);
                }
            }
        }
    }
    Ok(acc.unwrap_or_default())
}
