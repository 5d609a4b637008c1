use std::collections::VecDeque;

use crate::transport::SendRequest;

/// Fixed pool of in-flight send handles, recycled through a free list.
pub(crate) struct SendSlots {
    slots: Vec<Option<SendRequest>>,
    free: VecDeque<usize>,
}

impl SendSlots {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).collect(),
        }
    }

    pub fn has_free(&self) -> bool {
        !self.free.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Parks `request` in a free slot. Callers check [`SendSlots::has_free`] first.
    pub fn occupy(&mut self, request: SendRequest) -> bool {
        match self.free.pop_front() {
            Some(index) => {
                self.slots[index] = Some(request);
                true
            }
            None => false,
        }
    }

    /// Frees every slot whose send has completed; returns how many were freed.
    pub fn reap(&mut self) -> usize {
        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(SendRequest::test) {
                *slot = None;
                self.free.push_back(index);
                freed += 1;
            }
        }
        freed
    }
}
