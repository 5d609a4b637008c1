use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::{Probe, Tag};
use crate::error::{GasError, Result};

pub(crate) struct Envelope {
    pub source: usize,
    pub tag: u8,
    pub payload: Vec<u8>,
    /// Raised when the receiver takes the message.
    pub delivered: Option<Arc<AtomicBool>>,
}

#[derive(Default)]
struct Inbox {
    queue: VecDeque<Envelope>,
    closed: Vec<usize>,
    retired: bool,
}

/// Per-rank arrival queue shared by the memory and TCP transports.
#[derive(Default)]
pub(crate) struct Mailbox {
    inbox: Mutex<Inbox>,
    arrived: Condvar,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, envelope: Envelope) {
        let mut inbox = self.inbox.lock();
        if inbox.retired {
            mark_delivered(&envelope);
            return;
        }
        inbox.queue.push_back(envelope);
        self.arrived.notify_all();
    }

    /// Marks `source` as gone; blocked receivers from it will fail.
    pub fn close(&self, source: usize) {
        let mut inbox = self.inbox.lock();
        if !inbox.closed.contains(&source) {
            inbox.closed.push(source);
        }
        self.arrived.notify_all();
    }

    /// Drops everything queued and everything pushed from now on, completing their sends.
    pub fn retire(&self) {
        let mut inbox = self.inbox.lock();
        inbox.retired = true;
        for envelope in inbox.queue.drain(..) {
            mark_delivered(&envelope);
        }
    }

    /// Lowest-numbered source whose link has closed.
    pub fn first_closed(&self) -> Option<usize> {
        self.inbox.lock().closed.iter().min().copied()
    }

    pub fn probe(&self) -> Option<Probe> {
        let inbox = self.inbox.lock();
        inbox
            .queue
            .iter()
            .find(|env| env.tag != Tag::Collective as u8)
            .map(|env| Probe {
                source: env.source,
                tag: env.tag,
                len: env.payload.len(),
            })
    }

    pub fn take(&self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        let mut inbox = self.inbox.lock();
        loop {
            let position = inbox
                .queue
                .iter()
                .position(|env| env.source == source && env.tag == tag as u8);
            if let Some(position) = position {
                if let Some(envelope) = inbox.queue.remove(position) {
                    mark_delivered(&envelope);
                    return Ok(envelope.payload);
                }
            }
            if inbox.closed.contains(&source) {
                return Err(GasError::Transport(format!(
                    "rank {source} disconnected while a {tag:?} message was expected"
                )));
            }
            self.arrived.wait(&mut inbox);
        }
    }
}

fn mark_delivered(envelope: &Envelope) {
    if let Some(flag) = &envelope.delivered {
        flag.store(true, Ordering::Release);
    }
}
