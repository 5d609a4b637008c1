//! Per-worker timing and traffic counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::codec::{Cursor, Wire};
use crate::error::Result;

/// Bucket an elapsed interval is charged to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProfileKind {
    /// Local computation.
    Local,
    /// Time spent sending.
    Send,
    /// Time spent receiving.
    Recv,
    /// Interleaved send and receive; split evenly between both.
    SendRecv,
    /// Blocked in a barrier or collective.
    Wait,
}

/// Direction of accounted bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataDirection {
    /// Bytes this worker sent.
    Sent,
    /// Bytes this worker received.
    Received,
    /// Counted on both sides, as for collectives.
    Both,
}

/// Point-in-time copy of a worker's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    /// Microseconds of local computation.
    pub local_us: u64,
    /// Microseconds sending.
    pub send_us: u64,
    /// Microseconds receiving.
    pub recv_us: u64,
    /// Microseconds waiting on peers.
    pub wait_us: u64,
    /// Bytes sent.
    pub sent_bytes: u64,
    /// Bytes received.
    pub recv_bytes: u64,
}

impl ProfileSnapshot {
    /// Field-wise sum, used for cluster totals.
    pub fn merged(self, other: ProfileSnapshot) -> ProfileSnapshot {
        ProfileSnapshot {
            local_us: self.local_us + other.local_us,
            send_us: self.send_us + other.send_us,
            recv_us: self.recv_us + other.recv_us,
            wait_us: self.wait_us + other.wait_us,
            sent_bytes: self.sent_bytes + other.sent_bytes,
            recv_bytes: self.recv_bytes + other.recv_bytes,
        }
    }

    /// JSON rendering for report writers.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Wire for ProfileSnapshot {
    fn encode(&self, out: &mut Vec<u8>) {
        for field in [
            self.local_us,
            self.send_us,
            self.recv_us,
            self.wait_us,
            self.sent_bytes,
            self.recv_bytes,
        ] {
            field.encode(out);
        }
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            local_us: u64::decode(cur)?,
            send_us: u64::decode(cur)?,
            recv_us: u64::decode(cur)?,
            wait_us: u64::decode(cur)?,
            sent_bytes: u64::decode(cur)?,
            recv_bytes: u64::decode(cur)?,
        })
    }
}

/// Start mark returned by [`Profiler::start`].
#[derive(Copy, Clone, Debug)]
pub struct ProfileTimer(Instant);

#[derive(Default)]
struct ProfileCounters {
    local_us: AtomicU64,
    send_us: AtomicU64,
    recv_us: AtomicU64,
    wait_us: AtomicU64,
    sent_bytes: AtomicU64,
    recv_bytes: AtomicU64,
}

/// Accumulates elapsed time and transferred bytes for one worker.
#[derive(Default)]
pub struct Profiler {
    counters: ProfileCounters,
}

impl Profiler {
    /// Creates a zeroed profiler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of an interval.
    pub fn start(&self) -> ProfileTimer {
        ProfileTimer(Instant::now())
    }

    /// Charges the time since `timer` to `kind`.
    pub fn stop(&self, timer: ProfileTimer, kind: ProfileKind) {
        let micros = timer.0.elapsed().as_micros() as u64;
        let c = &self.counters;
        match kind {
            ProfileKind::Local => c.local_us.fetch_add(micros, Ordering::Relaxed),
            ProfileKind::Send => c.send_us.fetch_add(micros, Ordering::Relaxed),
            ProfileKind::Recv => c.recv_us.fetch_add(micros, Ordering::Relaxed),
            ProfileKind::SendRecv => {
                c.send_us.fetch_add(micros / 2, Ordering::Relaxed);
                c.recv_us.fetch_add(micros / 2, Ordering::Relaxed)
            }
            ProfileKind::Wait => c.wait_us.fetch_add(micros, Ordering::Relaxed),
        };
    }

    /// Adds transferred bytes.
    pub fn add_bytes(&self, direction: DataDirection, bytes: usize) {
        let bytes = bytes as u64;
        let c = &self.counters;
        if matches!(direction, DataDirection::Sent | DataDirection::Both) {
            c.sent_bytes.fetch_add(bytes, Ordering::Relaxed);
        }
        if matches!(direction, DataDirection::Received | DataDirection::Both) {
            c.recv_bytes.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Stops the interval and accounts bytes in one call.
    pub fn record(
        &self,
        timer: ProfileTimer,
        kind: ProfileKind,
        direction: DataDirection,
        bytes: usize,
    ) {
        self.stop(timer, kind);
        self.add_bytes(direction, bytes);
    }

    /// Runs `f` and charges its duration to `kind`.
    pub fn time<R>(&self, kind: ProfileKind, f: impl FnOnce() -> R) -> R {
        let timer = self.start();
        let out = f();
        self.stop(timer, kind);
        out
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        let c = &self.counters;
        for counter in [
            &c.local_us,
            &c.send_us,
            &c.recv_us,
            &c.wait_us,
            &c.sent_bytes,
            &c.recv_bytes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Current counter values.
    pub fn snapshot(&self) -> ProfileSnapshot {
        let c = &self.counters;
        ProfileSnapshot {
            local_us: c.local_us.load(Ordering::Relaxed),
            send_us: c.send_us.load(Ordering::Relaxed),
            recv_us: c.recv_us.load(Ordering::Relaxed),
            wait_us: c.wait_us.load(Ordering::Relaxed),
            sent_bytes: c.sent_bytes.load(Ordering::Relaxed),
            recv_bytes: c.recv_bytes.load(Ordering::Relaxed),
        }
    }
}
