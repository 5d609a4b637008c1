//! In-process transport: one mailbox per rank, one thread per worker.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::mailbox::{Envelope, Mailbox};
use super::{Probe, SendRequest, Tag, Transport};
use crate::error::{GasError, Result};

/// Endpoint of a [`LocalCluster`]. A send completes when the receiver dequeues it.
#[derive(Clone)]
pub struct MemTransport {
    rank: usize,
    mailboxes: Arc<[Mailbox]>,
}

impl Transport for MemTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.mailboxes.len()
    }

    fn isend(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<SendRequest> {
        let mailbox = self.mailboxes.get(dest).ok_or_else(|| {
            GasError::InvalidArgument(format!("destination rank {dest} out of range"))
        })?;
        let (request, flag) = SendRequest::pending();
        mailbox.push(Envelope {
            source: self.rank,
            tag: tag as u8,
            payload,
            delivered: Some(flag),
        });
        Ok(request)
    }

    fn iprobe(&self) -> Result<Option<Probe>> {
        Ok(self.mailboxes[self.rank].probe())
    }

    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        if source >= self.mailboxes.len() {
            return Err(GasError::InvalidArgument(format!(
                "source rank {source} out of range"
            )));
        }
        self.mailboxes[self.rank].take(source, tag)
    }

    fn disconnected_peer(&self) -> Option<usize> {
        self.mailboxes[self.rank].first_closed()
    }
}

/// A fixed-size group of in-process workers.
pub struct LocalCluster {
    mailboxes: Arc<[Mailbox]>,
}

impl LocalCluster {
    /// Creates mailboxes for `size` ranks.
    pub fn new(size: usize) -> Self {
        let mailboxes: Vec<Mailbox> = (0..size).map(|_| Mailbox::new()).collect();
        Self {
            mailboxes: mailboxes.into(),
        }
    }

    /// Transport endpoints in rank order.
    pub fn endpoints(&self) -> Vec<MemTransport> {
        (0..self.mailboxes.len())
            .map(|rank| MemTransport {
                rank,
                mailboxes: Arc::clone(&self.mailboxes),
            })
            .collect()
    }

    /// Runs `worker` once per rank on its own thread and collects results in rank order.
    ///
    /// A rank that exits closes its link to every peer, so peers blocked on it fail with
    /// [`GasError::Transport`] instead of waiting forever. When ranks fail, the error of the
    /// first rank to fail is returned and a worker panic is resumed on the caller.
    pub fn run<R, F>(size: usize, worker: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(MemTransport) -> Result<R> + Sync,
    {
        if size == 0 {
            return Err(GasError::InvalidArgument("cluster needs at least one rank".into()));
        }
        let cluster = Self::new(size);
        let first_failure: Mutex<Option<usize>> = Mutex::new(None);
        debug!(size, "transport.mem.cluster_start");
        let (worker, first_failure) = (&worker, &first_failure);
        let outcomes: Vec<thread::Result<Result<R>>> = thread::scope(|scope| {
            let handles: Vec<_> = cluster
                .endpoints()
                .into_iter()
                .map(|endpoint| {
                    scope.spawn(move || {
                        let mut guard = ExitGuard {
                            rank: endpoint.rank,
                            mailboxes: Arc::clone(&endpoint.mailboxes),
                            first_failure,
                            failed: true,
                        };
                        let result = worker(endpoint);
                        guard.failed = result.is_err();
                        result
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let failed_rank = *first_failure.lock();
        let mut results = Vec::with_capacity(size);
        let mut errors = Vec::with_capacity(size);
        for (rank, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(err)) => {
                    warn!(rank, error = %err, "transport.mem.worker_failed");
                    errors.push((rank, err));
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
            debug!(rank, "transport.mem.worker_done");
        }
        if errors.is_empty() {
            return Ok(results);
        }
        let root = errors
            .iter()
            .position(|(rank, _)| Some(*rank) == failed_rank)
            .unwrap_or(0);
        Err(errors.swap_remove(root).1)
    }
}

/// Closes a worker's links when its thread ends, however it ends.
struct ExitGuard<'a> {
    rank: usize,
    mailboxes: Arc<[Mailbox]>,
    first_failure: &'a Mutex<Option<usize>>,
    /// Cleared only when the worker returns `Ok`; a panic leaves it set.
    failed: bool,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        if self.failed {
            let mut first = self.first_failure.lock();
            if first.is_none() {
                *first = Some(self.rank);
            }
        }
        self.mailboxes[self.rank].retire();
        for (peer, mailbox) in self.mailboxes.iter().enumerate() {
            if peer != self.rank {
                mailbox.close(self.rank);
            }
        }
    }
}
