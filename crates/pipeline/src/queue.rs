use std::collections::VecDeque;

/// FIFO of item indices still waiting for a worker.
///
/// Filled once at admission with every index of the batch, in order, and
/// only ever shrinks afterwards.
#[derive(Debug)]
pub struct WorkQueue {
    pending: VecDeque<usize>,
}

impl WorkQueue {
    pub fn new(total: usize) -> Self {
        Self {
            pending: (0..total).collect(),
        }
    }

    pub fn pop_front(&mut self) -> Option<usize> {
        self.pending.pop_front()
    }

    /// Remove and return every index that was never dequeued.
    pub fn drain_remaining(&mut self) -> Vec<usize> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
